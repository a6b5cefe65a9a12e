pub mod changes;
pub mod error;
pub mod events;
pub mod models;
pub mod project;
pub mod records;
pub mod resolve;
pub mod store;
pub mod testutil;
pub mod time;
pub mod traits;

pub use changes::ChangeDetector;
pub use error::AppError;
pub use records::SourceKind;
pub use resolve::Resolver;
pub use store::{MemoryLedger, MemoryStore};
pub use traits::{Clock, EntityStore, Fetcher, RunLedger, SystemClock};

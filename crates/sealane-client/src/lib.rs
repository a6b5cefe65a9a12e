pub mod endpoints;
pub mod fetcher;
pub mod ingest;
pub mod pages;

pub use fetcher::ReqwestFetcher;
pub use ingest::{IngestService, PageSource};

//! 文档获取与加载

pub mod fetcher;
pub mod loader;

pub use fetcher::{DocumentFetcher, HttpFetcher};
pub use loader::{LoaderOptions, LoaderStats, TranslationLoader};

pub mod blob_cache;
pub mod convert;

pub use blob_cache::BlobCache;

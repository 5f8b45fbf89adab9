pub mod documents;
pub mod kv;
pub mod limiter;
pub mod media;
pub mod utils;

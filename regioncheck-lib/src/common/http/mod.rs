pub mod client;
pub mod executor;

pub use client::*;
pub use executor::HttpBatchExecutor;

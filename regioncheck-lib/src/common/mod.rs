pub mod errors;
pub mod http;
pub mod timed_future;
pub mod tls;

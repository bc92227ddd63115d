pub mod def;
pub mod internal;

pub use def::LogLevel;
pub use internal::{InternalConfig, OutboundOpts};

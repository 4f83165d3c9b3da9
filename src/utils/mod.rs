//! Utility modules shared by the loader and its tools

pub mod env;
pub mod logging;
pub mod timeout;

// Re-export commonly used items
pub use env::{env_bool, env_int, env_opt};
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use timeout::{with_custom_timeout, with_timeout_opt};

//! Shared error type, configuration model, and logging bootstrap for
//! schedulerd.

pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use config::{ConfigRoot, DbConfig, HttpConfig, MqttConfig, SchedulerConfig};
pub use error::{Error, Result};
pub use shutdown::ShutdownController;

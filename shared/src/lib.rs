pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod health;
pub mod logger;
pub mod ports;
pub mod queue;
pub mod store;

pub use config::Settings;
pub use error::{DispatchError, Result};

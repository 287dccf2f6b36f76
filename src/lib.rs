//! Multi-server lifecycle coordinator library

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod servers;

pub use config::AppConfig;
pub use error::{AppError, ComponentError};
pub use lifecycle::{App, Component, Scope, ShutdownHandle};

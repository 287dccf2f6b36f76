//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events with component fields)
//!
//! Consumers:
//!     → stdout (text or JSON)
//! ```

pub mod logging;

pub use logging::init_logging;

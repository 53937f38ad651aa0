//! Tessera Telemetry - logging setup for the Tessera ledger.
//!
//! Every tessera crate logs through `tracing` with structured fields
//! (`chain`, `sequence_id`, `batch_id`, `attempt`). This crate installs the
//! subscriber that renders them.
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), tessera_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("tessera_remision=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!(chain = "acme/invoices", "Ledger opened");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};

//! Tessera Test - Shared test utilities for the Tessera workspace.
//!
//! Mock transports, clocks and ledger fixtures used by unit and integration
//! tests across the Tessera crates.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tessera-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use tessera_test::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_submission_retries() {
//!     let (storage, appender) = memory_ledger();
//!     let chain = test_chain("acme");
//!     append_invoices(&appender, &chain, 2);
//!
//!     let transport = MockTransport::new().with_response(MockResponse::status(503));
//!     // ... submit through a RemoteSubmissionClient built on `transport`
//!     assert_eq!(transport.call_count(), 2);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;

//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_test::prelude::*;` to import all helpers.

pub use crate::fixtures::*;
pub use crate::harness::*;
pub use crate::mocks::*;

//! CLI commands.

pub(crate) mod append;
pub(crate) mod config;
pub(crate) mod status;
pub(crate) mod submit;
pub(crate) mod verify;

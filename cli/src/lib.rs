//! autoprobe-cli library, exposing the command modules for unit tests.

pub mod commands;
pub mod context;
pub mod output;

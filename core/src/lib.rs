//! Automation execution engine: a job registry feeding a bounded worker pool,
//! a model-driven decision loop and multi-target device/browser sessions.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod inference;
pub mod model;
pub mod registry;
pub mod report;
pub mod selector;
pub mod session;
pub mod state;

//! Concrete inference, driver and storage implementations for `autoprobe-core`.

pub mod driver;
pub mod factory;
pub mod http;
pub mod inference;
pub mod store;

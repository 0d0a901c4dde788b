pub mod cli;
pub mod requests;
pub mod tasks;

//! Loading simulation inputs from files.

pub mod config;

pub use config::{StackConfig, read_config};

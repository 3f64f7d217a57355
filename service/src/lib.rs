//! Process-level infrastructure for the login CLI: configuration and logging.

pub mod config;
pub mod logging;

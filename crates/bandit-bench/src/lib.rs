pub mod analytics;
pub mod config;
pub mod experiment;
pub mod logging;

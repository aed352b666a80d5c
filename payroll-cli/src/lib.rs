pub mod app;
pub mod cli;
pub mod config;
pub mod csv_import;
pub mod logging;
pub mod report;

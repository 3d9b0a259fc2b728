pub mod alerts;
pub mod app;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod monitor;
pub mod notify;
pub mod process_guard;
pub mod session;
pub mod ui;
pub mod usage;
pub mod util;

//! Application layer - use cases and services

pub mod services;

pub use services::{ctrl_c_shutdown, run_notifier_loop, IngestionService, Shutdown, Ticker};

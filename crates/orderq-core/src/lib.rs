pub mod config;
pub mod error;
pub mod logging;

pub mod client;
pub mod engine;
pub mod oracle;
pub mod order_db;
pub mod retry;
pub mod scheduler;

//! CLI command handlers, one file per command.

mod add;
mod client;
mod dead_letters;
mod ingest;
mod run;
mod status;
mod tick;

pub use add::run_add;
pub use client::ClientArgs;
pub use dead_letters::run_dead_letters;
pub use ingest::run_ingest;
pub use run::run_scheduler;
pub use status::run_status;
pub use tick::run_tick;

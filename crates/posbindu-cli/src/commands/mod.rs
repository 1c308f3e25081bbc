pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod exam;
pub mod patient;
pub mod queue;
pub mod status;
pub mod sync;
pub mod watch;

pub mod app_state;
pub mod discovery;
pub mod errors;
pub mod file_watcher;
pub mod sse;
pub mod startup;

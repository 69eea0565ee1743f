pub mod app;
pub mod cli;
pub mod config;
pub mod dedupe;
pub mod errors;
pub mod extract;
pub mod gmail;
pub mod ingest;
pub mod naming;
pub mod types;

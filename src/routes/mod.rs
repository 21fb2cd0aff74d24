pub mod control;
pub mod ingest;
pub mod monitor;

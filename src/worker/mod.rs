pub mod ingest_worker;

pub use ingest_worker::run as run_ingest_worker;

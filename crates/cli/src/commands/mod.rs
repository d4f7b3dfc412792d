pub mod check;
pub mod ingest;
pub mod live;

mod subscriber;
mod worker;

pub use worker::{IngestWorker, IngestWorkerConfig};

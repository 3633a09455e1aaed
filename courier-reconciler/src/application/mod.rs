pub mod handlers;

pub use handlers::{BatchOutcome, BatchRecord, DeliveryBatchHandler, PartitionBatch};

//! 批次处理（编排层）

pub mod batch_handler;

pub use batch_handler::{BatchOutcome, BatchRecord, DeliveryBatchHandler, PartitionBatch};

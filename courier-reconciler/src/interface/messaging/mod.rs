pub mod consumer;
pub mod tail_retry;

pub use consumer::DeliveryReconcilerConsumer;
pub use tail_retry::{RewindPlan, TailRetryTracker};

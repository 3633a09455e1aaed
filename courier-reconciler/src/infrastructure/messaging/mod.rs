pub mod batch_control;

pub use batch_control::KafkaBatchControl;

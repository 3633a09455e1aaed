pub mod messaging;
pub mod persistence;

mod dispatch_coordinator;
mod saga;


pub use dispatch_coordinator::DispatchCoordinator;
pub use saga::DispatchSaga;

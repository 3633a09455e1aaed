mod delivery_reconciler;

pub use delivery_reconciler::{DeliveryReconciler, ReconcileOutcome};

pub mod fees;
pub mod lock;
pub mod reconciler;
pub mod retry;

pub use lock::{DistributedLock, Lock, LockOptions};
pub use reconciler::{ReconcileOutcome, ReconcilerSettings, SettlementReconciler};
pub use retry::{RetryOrchestrator, RetryOutcome, RetrySettings};

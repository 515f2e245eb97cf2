//! Background jobs. Each one owns a `watch` shutdown receiver and sleeps
//! between cycles; `run_cycle` is public so a cycle can be driven directly.

pub mod expiry_sweep;
pub mod paid_resume;
pub mod pending_recheck;

pub use expiry_sweep::{ExpirySweepConfig, ExpirySweepWorker, SweepStats};
pub use paid_resume::{PaidResumeConfig, PaidResumeWorker};
pub use pending_recheck::{PendingRecheckConfig, PendingRecheckWorker};

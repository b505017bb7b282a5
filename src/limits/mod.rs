//! Abuse controls shared by every write path: fixed-window quotas, the
//! per-user edit cooldown and the rendered-canvas cache that writes must
//! invalidate.

mod action;
pub mod clock;
mod edit_gate;
mod quota;
mod snapshot;

pub use action::{Action, Quota, Subject};
pub use clock::{Clock, ManualClock, SystemClock};
pub use edit_gate::{EditGate, Eligibility};
pub use quota::{QuotaCounter, QuotaLedger};
pub use snapshot::SnapshotCache;

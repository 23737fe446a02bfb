//! Classification gate — decides whether fetched content should be
//! processed at all, and how.

pub mod classify;
pub mod signals;

pub use classify::{classify, GateAction, GateReason, Verdict, MANUAL_MIN_WORDS};
pub use signals::{ContentKind, ContentSignals, DocumentProfile, TriggerKind};

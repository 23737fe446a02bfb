//! Capability selection and fallback across inference backends.

pub mod fallback;
pub mod ranking;

pub use fallback::{invoke_with_timeout, AvailabilityProbe, FallbackExecutor};
pub use ranking::{rank_candidates, CapabilityId, TaskKind};

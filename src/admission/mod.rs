//! Admission control — bounded per-category concurrency with single-flight
//! deduplication per resource key.

pub mod category;
pub mod controller;

pub use category::{CategoryStatus, OperationCategory};
pub use controller::AdmissionController;

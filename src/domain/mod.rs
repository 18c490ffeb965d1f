// Change notifications emitted by the store
pub mod events;

// KPI snapshot and time buckets
pub mod kpi;

// Port interfaces (listener, sink)
pub mod ports;

// Repository traits (guard, KPI reads)
pub mod repositories;

// Domain-specific error types
pub mod errors;

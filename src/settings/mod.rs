// Sink configuration: defaults, JSON file loading and env overrides.

pub mod store;
pub mod types;

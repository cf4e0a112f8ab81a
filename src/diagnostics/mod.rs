// Delivery diagnostics: counters and the debug FPS window.

pub mod stats;

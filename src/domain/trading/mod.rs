// Closed positions emitted by the verify stage
pub mod types;

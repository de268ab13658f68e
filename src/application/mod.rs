// Scheduled pipeline orchestration
pub mod pipeline;

// Pre-flight health checks
pub mod monitoring;

// Weekly/daily trigger loop
pub mod scheduler;

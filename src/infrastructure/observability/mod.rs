//! Push-based observability for autotune
//!
//! Observability through **outbound data only** - no HTTP server,
//! no incoming requests:
//!
//! 1. **Structured JSON Logs**: `METRICS_JSON:` lines on stdout after each job
//! 2. **Tracing**: console output and an optional daily-rolling JSON file
//!
//! **Security**: This system only SENDS data, it never accepts requests.

pub mod logging;
pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;

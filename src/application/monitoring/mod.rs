pub mod health_monitor;

pub use health_monitor::HealthMonitor;

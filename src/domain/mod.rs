// Core trading domain
pub mod trading;

// Performance tracking domain
pub mod performance;

// Acceptance constraints
pub mod validation;

// Optimization output
pub mod optimization;

// Pipeline runs and stage manifests
pub mod pipeline;

// Wall-clock triggers
pub mod schedule;

pub mod health;
pub mod notification;
pub mod propagation;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;

//! Metrics collection and export for concierge.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are exported in Prometheus format
//! through the gateway's `/metrics` endpoint.
//!
//! # Usage
//!
//! ```rust,ignore
//! use concierge_metrics::{counter, histogram, auto_reply, labels};
//!
//! counter!(auto_reply::MESSAGES_RECEIVED_TOTAL, labels::CHANNEL => "whatsapp").increment(1);
//! histogram!(auto_reply::PROCESSING_DURATION_SECONDS).record(0.123);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

pub mod admin;
pub mod api;
pub mod args;
pub mod config;
pub mod r#const;
pub mod control;
pub mod error;
pub mod listener;
pub mod mapping;
pub mod metrics;
pub mod persist;
pub mod registry;
pub mod relay;

pub use crate::metrics::METRICS;

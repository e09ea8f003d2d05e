pub mod builder;
pub mod config;
pub mod connection;
pub mod crds;
pub mod error;
pub mod flag;
pub mod reconciler;
pub mod telemetry;
pub mod template;

//! Infrastructure layer: storage, report rendering, background workers.
//!
//! ## Components
//!
//! - `catalog`: campaign + message detail storage (read-only here)
//! - `jobs`: report job storage, worker pool, dispatcher, worker, sweep, status
//! - `report`: CSV codec, artifact writer, on-demand reports
//! - `listing`: pagination gateway backing the campaign table
//! - `db`: Postgres connection, schema, SQLx error mapping
//! - `config`: environment-driven service configuration

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod listing;
pub mod report;

pub use config::{ConfigError, ServiceConfig};
pub use db::StoreError;
pub use error::ReportError;

//! HTTP API: routing, request validation, and error-to-response mapping.

pub mod app;

//! ROUNDCAST — Sports Round Prediction Pipeline
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod sources;
pub mod predictors;
pub mod ensemble;
pub mod engine;
pub mod storage;

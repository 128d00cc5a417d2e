//! Integration test harness.
//!
//! Wires hand-rolled source and predictor mocks into the full pipeline
//! so acquisition, caching, consensus, scoring, and artifact persistence
//! are exercised together without any network access.

mod mock_predictor;
mod mock_source;
mod pipeline;

//! Integration tests for flingdeck
//!
//! Tests are organized by component:
//! - api_test: icon fetcher, catalog client and poller against a mock server
//! - controller_test: row visibility, download registry and discovery refresh
//! - e2e_test: catalog -> poller -> controller -> icons -> selection

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs

//! Integration tests for dropmirror-storage
//!
//! Uses wiremock to simulate the Dropbox API and verifies token renewal,
//! error decoding, paginated listing and batch job polling end to end.

mod common;

mod test_auth;
mod test_batch;
mod test_errors;
mod test_listing;
mod test_operations;

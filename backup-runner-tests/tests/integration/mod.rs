//! Integration tests for backup-runner
//!
//! These tests require Docker and run the S3 backend against a MinIO container.
//! Run with: `cargo test -p backup-runner-tests --test integration -- --ignored`

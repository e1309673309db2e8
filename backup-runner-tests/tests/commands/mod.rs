//! Orchestrator and strategy tests for backup-runner
//!
//! These tests drive the orchestrator with mocked strategies and storage under
//! paused tokio time, and the command strategy against mocked and real shells.

mod command_strategy;
mod orchestrator;

//! Shared test utilities for shiptrack integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an in-memory store, scripted carriers and a
//!   recording notifier into one orchestrator
//! - Builders for vendor events and refresh settings

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordingNotifier, Reply, ScriptedSource, TestHarness};

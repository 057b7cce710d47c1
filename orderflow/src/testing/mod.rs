//! Testing utilities for orderflow pipelines.
//!
//! This module provides:
//! - In-memory collaborators that record what they were asked to do
//! - Recording log and progress sinks
//! - Scripted steps and ready-made step contexts

mod fakes;
mod fixtures;
mod recording;
mod steps;

pub use fakes::{
    FakeDatabase, FakeNotifier, FakeSpreadsheet, FakeStorage, FakeWriter, InMemoryConfigStore, SentNotification,
    WrittenSheet,
};
pub use fixtures::{
    fixture_classifier, fixture_now, order_row, step_context, FakeServices, StepContextBuilder,
};
pub use recording::{RecordingLogSink, RecordingProgressSink};
pub use steps::{Journal, ScriptedStep};

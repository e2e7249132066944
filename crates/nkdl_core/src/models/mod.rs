//! Shared enums used across planning, submission and configuration.

mod enums;

pub use enums::{OnJobComplete, RenderMode, SortPolicy, SubmissionMode};

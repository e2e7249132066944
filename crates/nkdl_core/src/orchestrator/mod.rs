//! Submission orchestration.
//!
//! [`SubmissionOrchestrator`] ties the pieces together for one invocation:
//!
//! ```text
//! SubmissionRequest ──► validate
//!                          │
//!                          ▼
//!              ScopedVariableResolver ──► one pass per combination
//!                          │
//!                          ▼
//!        OutputGraphAnalyzer + JobPlanBuilder ──► PassPlan
//!                          │
//!                          ▼
//!        Connection::submit, render order by render order
//!                          │
//!                          ▼
//!                    SubmittedJobs
//! ```
//!
//! Passes are independent: dependencies never cross from one variable
//! combination to another.

mod errors;
mod submitter;
mod types;

pub use errors::{SubmissionError, SubmissionResult};
pub use submitter::SubmissionOrchestrator;
pub use types::{PassPlan, SubmissionRequest, SubmittedJobs};

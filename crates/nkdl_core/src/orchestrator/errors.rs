//! Error types for submission.
//!
//! Errors carry context that chains through layers:
//! Submission → Pass → Transport detail

use thiserror::Error;

use super::types::SubmittedJobs;
use crate::analysis::AnalysisError;
use crate::farm::FarmError;
use crate::frames::FrameRangeError;
use crate::gsv::GsvError;
use crate::plan::PlanError;
use crate::project::ProjectError;

/// Top-level submission error.
#[derive(Error, Debug)]
pub enum SubmissionError {
    /// Incompatible options; raised before anything reaches the farm.
    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error(transparent)]
    Gsv(#[from] GsvError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Frames(#[from] FrameRangeError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    /// A farm call failed part way through a pass. `submitted` holds every
    /// job of the invocation that reached the farm before the failure.
    #[error(
        "Submission of {pass} failed after {} job(s): {source}",
        .submitted.job_count()
    )]
    PassFailed {
        pass: String,
        submitted: SubmittedJobs,
        #[source]
        source: FarmError,
    },
}

impl SubmissionError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a pass failed error.
    pub fn pass_failed(
        pass: impl Into<String>,
        submitted: SubmittedJobs,
        source: FarmError,
    ) -> Self {
        Self::PassFailed {
            pass: pass.into(),
            submitted,
            source,
        }
    }

    /// Jobs already on the farm when the invocation stopped.
    pub fn submitted_jobs(&self) -> Option<&SubmittedJobs> {
        match self {
            Self::PassFailed { submitted, .. } => Some(submitted),
            _ => None,
        }
    }

    /// Whether the farm may already hold jobs from this invocation.
    pub fn is_partial(&self) -> bool {
        self.submitted_jobs().is_some_and(|jobs| !jobs.is_empty())
    }
}

/// Result type for submission.
pub type SubmissionResult<T> = Result<T, SubmissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_failure_keeps_transport_message() {
        let mut submitted = SubmittedJobs::new();
        submitted.record(0, "id-1");
        submitted.record(1, "id-2");
        let err = SubmissionError::pass_failed(
            "pass shot=A",
            submitted,
            FarmError::rejected("Error: pool comp does not exist"),
        );
        let text = err.to_string();
        assert!(text.contains("pass shot=A"));
        assert!(text.contains("after 2 job(s)"));
        assert_eq!(err.submitted_jobs().unwrap().get(1), ["id-2"]);
        assert!(text.contains("pool comp does not exist"));
        assert!(err.is_partial());
        assert!(!SubmissionError::validation("x").is_partial());
        let nothing_yet =
            SubmissionError::pass_failed("p", SubmittedJobs::new(), FarmError::rejected("x"));
        assert!(!nothing_yet.is_partial());
    }
}

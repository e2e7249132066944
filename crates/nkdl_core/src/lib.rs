//! nkdl core - script analysis, job planning and farm submission
//!
//! This crate contains all submission logic with no CLI dependencies.
//! A submission flows from a [`project::ProjectModel`] through
//! [`orchestrator::SubmissionOrchestrator`] to a [`farm::Connection`].

pub mod analysis;
pub mod config;
pub mod farm;
pub mod frames;
pub mod gsv;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod plan;
pub mod project;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}

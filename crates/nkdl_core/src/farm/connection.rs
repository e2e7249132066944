//! Connection trait and transport-independent helpers.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use thiserror::Error;

/// Job or plugin record as sent to the farm.
pub type Records = BTreeMap<String, String>;

/// Errors raised by farm transports.
#[derive(Error, Debug)]
pub enum FarmError {
    /// The command-line client could not be located.
    #[error("Could not find {0}. Set farm.command_path or DEADLINE_PATH")]
    CommandNotFound(String),

    /// An external command failed.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Web service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The farm answered but refused the request.
    #[error("Farm rejected the request: {0}")]
    Rejected(String),

    #[error("No job ID found in farm response: {0}")]
    MissingJobId(String),
}

impl FarmError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

pub type FarmResult<T> = Result<T, FarmError>;

/// A live handle to the render farm.
///
/// Implementations are not assumed reentrant; wrap one in
/// [`SharedConnection`] to use it from several threads.
pub trait Connection {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Submit one job and return the id the farm assigned to it.
    fn submit(&mut self, job_info: &Records, plugin_info: &Records) -> FarmResult<String>;

    /// Worker groups known to the farm.
    fn groups(&mut self) -> FarmResult<Vec<String>> {
        Ok(Vec::new())
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn submit(&mut self, job_info: &Records, plugin_info: &Records) -> FarmResult<String> {
        (**self).submit(job_info, plugin_info)
    }

    fn groups(&mut self) -> FarmResult<Vec<String>> {
        (**self).groups()
    }
}

/// A connection shared between threads. Every transport call holds the lock,
/// so calls are serialised.
pub struct SharedConnection<C> {
    inner: Arc<Mutex<C>>,
}

impl<C> Clone for SharedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> SharedConnection<C> {
    pub fn new(connection: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(connection)),
        }
    }

    /// Exclusive access to the wrapped connection.
    pub fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.lock()
    }
}

impl<C: Connection> Connection for SharedConnection<C> {
    fn name(&self) -> &'static str {
        self.inner.lock().name()
    }

    fn submit(&mut self, job_info: &Records, plugin_info: &Records) -> FarmResult<String> {
        self.inner.lock().submit(job_info, plugin_info)
    }

    fn groups(&mut self) -> FarmResult<Vec<String>> {
        self.inner.lock().groups()
    }
}

/// A job captured by [`DryRunConnection`].
#[derive(Debug, Clone, Serialize)]
pub struct RecordedJob {
    pub id: String,
    pub submitted_at: DateTime<Utc>,
    pub job_info: Records,
    pub plugin_info: Records,
}

/// Accepts every job without contacting a farm.
///
/// Ids are `dry-run-1`, `dry-run-2`, ... so dependency wiring can be
/// inspected in the recorded records.
#[derive(Debug, Default)]
pub struct DryRunConnection {
    jobs: Vec<RecordedJob>,
}

impl DryRunConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[RecordedJob] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<RecordedJob> {
        self.jobs
    }
}

impl Connection for DryRunConnection {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn submit(&mut self, job_info: &Records, plugin_info: &Records) -> FarmResult<String> {
        let id = format!("dry-run-{}", self.jobs.len() + 1);
        self.jobs.push(RecordedJob {
            id: id.clone(),
            submitted_at: Utc::now(),
            job_info: job_info.clone(),
            plugin_info: plugin_info.clone(),
        });
        Ok(id)
    }
}

/// Fill `UserName` with the current login when the record has none.
pub(crate) fn with_user_name(job_info: &Records) -> Records {
    let mut records = job_info.clone();
    records
        .entry("UserName".to_string())
        .or_insert_with(whoami::username);
    records
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every submit call and answers with scripted results.
    #[derive(Debug, Default)]
    pub struct MockConnection {
        pub calls: Vec<(Records, Records)>,
        /// Submit call index (0-based) that fails.
        pub fail_at: Option<usize>,
    }

    impl MockConnection {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_at(index: usize) -> Self {
            Self {
                fail_at: Some(index),
                ..Self::default()
            }
        }

        pub fn job_names(&self) -> Vec<String> {
            self.calls
                .iter()
                .map(|(job, _)| job.get("Name").cloned().unwrap_or_default())
                .collect()
        }
    }

    impl Connection for MockConnection {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn submit(&mut self, job_info: &Records, plugin_info: &Records) -> FarmResult<String> {
            let index = self.calls.len();
            self.calls.push((job_info.clone(), plugin_info.clone()));
            if self.fail_at == Some(index) {
                return Err(FarmError::rejected("Error: repository offline"));
            }
            Ok(format!("job-{}", index + 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockConnection;
    use super::*;
    use std::thread;

    fn record(name: &str) -> Records {
        let mut records = Records::new();
        records.insert("Name".to_string(), name.to_string());
        records
    }

    #[test]
    fn dry_run_numbers_jobs() {
        let mut connection = DryRunConnection::new();
        let first = connection.submit(&record("a"), &Records::new()).unwrap();
        let second = connection.submit(&record("b"), &Records::new()).unwrap();
        assert_eq!(first, "dry-run-1");
        assert_eq!(second, "dry-run-2");
        assert_eq!(connection.jobs()[1].job_info["Name"], "b");
    }

    #[test]
    fn boxed_connection_delegates() {
        let mut boxed: Box<dyn Connection> = Box::new(DryRunConnection::new());
        assert_eq!(boxed.name(), "dry-run");
        assert_eq!(boxed.submit(&record("a"), &Records::new()).unwrap(), "dry-run-1");
    }

    #[test]
    fn shared_connection_serialises_calls() {
        let shared = SharedConnection::new(MockConnection::new());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let mut connection = shared.clone();
                thread::spawn(move || {
                    connection
                        .submit(&record(&format!("job {}", i)), &Records::new())
                        .unwrap()
                })
            })
            .collect();
        let mut ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();

        assert_eq!(ids, vec!["job-1", "job-2", "job-3", "job-4"]);
        assert_eq!(shared.lock().calls.len(), 4);
    }

    #[test]
    fn user_name_is_kept_when_present() {
        let mut records = record("a");
        records.insert("UserName".to_string(), "render".to_string());
        assert_eq!(with_user_name(&records)["UserName"], "render");
        assert!(with_user_name(&record("a")).contains_key("UserName"));
    }
}

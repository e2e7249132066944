//! Farm job-info record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::PlanError;
use crate::models::OnJobComplete;

/// Workers a job may or may not run on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineList {
    Allow(Vec<String>),
    Deny(Vec<String>),
}

impl MachineList {
    /// Parse `allow:a,b` / `deny:a,b`. A bare list is an allow list.
    pub fn parse(text: &str) -> Option<Self> {
        let (kind, list) = match text.split_once(':') {
            Some((kind, list)) => (kind.trim().to_ascii_lowercase(), list),
            None => ("allow".to_string(), text),
        };
        let machines: Vec<String> = split_list(list);
        if machines.is_empty() {
            return None;
        }
        match kind.as_str() {
            "allow" | "whitelist" => Some(MachineList::Allow(machines)),
            "deny" | "blacklist" => Some(MachineList::Deny(machines)),
            _ => None,
        }
    }
}

/// Split a comma and/or whitespace separated list.
pub(crate) fn split_list(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Job-level fields understood by the farm.
///
/// Free-form additions go in `extra`, emitted as `ExtraInfoKeyValue<N>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub batch_name: Option<String>,
    pub plugin: String,
    pub frames: String,
    pub chunk_size: u32,
    pub concurrent_tasks: u32,
    pub limit_tasks_to_cpus: bool,
    pub pool: String,
    pub secondary_pool: Option<String>,
    pub group: String,
    pub priority: u32,
    pub department: String,
    pub comment: String,
    pub user_name: Option<String>,
    /// 0 means no limit.
    pub machine_limit: u32,
    pub machine_list: Option<MachineList>,
    pub limit_groups: Vec<String>,
    /// 0 means no timeout.
    pub task_timeout_minutes: u32,
    pub enable_auto_timeout: bool,
    pub on_job_complete: OnJobComplete,
    pub suspended: bool,
    /// Job ids this job waits for.
    pub dependencies: Vec<String>,
    /// `ExtraInfo0` .. `ExtraInfo9`.
    pub extra_info: Vec<String>,
    pub output_filenames: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

impl Default for JobInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            batch_name: None,
            plugin: "Nuke".to_string(),
            frames: String::new(),
            chunk_size: 1,
            concurrent_tasks: 1,
            limit_tasks_to_cpus: false,
            pool: "none".to_string(),
            secondary_pool: None,
            group: "none".to_string(),
            priority: 50,
            department: String::new(),
            comment: String::new(),
            user_name: None,
            machine_limit: 0,
            machine_list: None,
            limit_groups: Vec::new(),
            task_timeout_minutes: 0,
            enable_auto_timeout: false,
            on_job_complete: OnJobComplete::Nothing,
            suspended: false,
            dependencies: Vec::new(),
            extra_info: Vec::new(),
            output_filenames: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Farm cap on `ExtraInfo<N>` slots.
pub const MAX_EXTRA_INFO: usize = 10;

impl JobInfo {
    /// Set a field by its farm key name, e.g. `Priority` or `Pool`.
    ///
    /// Keys are matched case-insensitively. Unknown keys are rejected so a
    /// typo never silently reaches the farm; use [`JobInfo::set_extra`] for
    /// free-form data. `Name`, `BatchName` and `Frames` are rejected too:
    /// the planner writes them for every job.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<(), PlanError> {
        let to_u32 = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| PlanError::invalid_value(key, value))
        };
        let to_bool = |value: &str| {
            parse_bool(value).ok_or_else(|| PlanError::invalid_value(key, value))
        };

        match key.to_ascii_lowercase().as_str() {
            "name" | "batchname" | "frames" => {
                return Err(PlanError::PlannedField(key.to_string()))
            }
            "plugin" => self.plugin = value.to_string(),
            "chunksize" => self.chunk_size = to_u32(value)?.max(1),
            "concurrenttasks" => self.concurrent_tasks = to_u32(value)?.max(1),
            "limitconcurrenttaskstonumberofcpus" => self.limit_tasks_to_cpus = to_bool(value)?,
            "pool" => self.pool = value.to_string(),
            "secondarypool" => {
                self.secondary_pool = Some(value.to_string()).filter(|v| !v.is_empty())
            }
            "group" => self.group = value.to_string(),
            "priority" => self.priority = to_u32(value)?,
            "department" => self.department = value.to_string(),
            "comment" => self.comment = value.to_string(),
            "username" => self.user_name = Some(value.to_string()).filter(|v| !v.is_empty()),
            "machinelimit" => self.machine_limit = to_u32(value)?,
            "whitelist" | "allowlist" => {
                self.machine_list = Some(MachineList::Allow(split_list(value)))
            }
            "blacklist" | "denylist" => {
                self.machine_list = Some(MachineList::Deny(split_list(value)))
            }
            "limitgroups" => self.limit_groups = split_list(value),
            "tasktimeoutminutes" => self.task_timeout_minutes = to_u32(value)?,
            "enableautotimeout" => self.enable_auto_timeout = to_bool(value)?,
            "onjobcomplete" => {
                self.on_job_complete = value
                    .parse()
                    .map_err(|_| PlanError::invalid_value(key, value))?
            }
            "initialstatus" => self.suspended = value.eq_ignore_ascii_case("suspended"),
            _ => return Err(PlanError::UnknownField(key.to_string())),
        }
        Ok(())
    }

    /// Attach a free-form key/value pair.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Flatten into the farm's `Key=Value` record.
    pub fn to_records(&self) -> BTreeMap<String, String> {
        let mut records = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            records.insert(key.to_string(), value);
        };

        put("Name", self.name.clone());
        put("Plugin", self.plugin.clone());
        put("Frames", self.frames.clone());
        put("ChunkSize", self.chunk_size.to_string());
        put("ConcurrentTasks", self.concurrent_tasks.to_string());
        put("Pool", self.pool.clone());
        put("Group", self.group.clone());
        put("Priority", self.priority.to_string());
        put("OnJobComplete", self.on_job_complete.to_string());

        if let Some(batch) = &self.batch_name {
            put("BatchName", batch.clone());
        }
        if let Some(pool) = &self.secondary_pool {
            put("SecondaryPool", pool.clone());
        }
        if !self.department.is_empty() {
            put("Department", self.department.clone());
        }
        if !self.comment.is_empty() {
            put("Comment", self.comment.clone());
        }
        if let Some(user) = &self.user_name {
            put("UserName", user.clone());
        }
        if self.limit_tasks_to_cpus {
            put("LimitConcurrentTasksToNumberOfCpus", bool_text(true));
        }
        if self.machine_limit > 0 {
            put("MachineLimit", self.machine_limit.to_string());
        }
        match &self.machine_list {
            Some(MachineList::Allow(list)) => put("Whitelist", list.join(",")),
            Some(MachineList::Deny(list)) => put("Blacklist", list.join(",")),
            None => {}
        }
        if !self.limit_groups.is_empty() {
            put("LimitGroups", self.limit_groups.join(","));
        }
        if self.task_timeout_minutes > 0 {
            put("TaskTimeoutMinutes", self.task_timeout_minutes.to_string());
        }
        if self.enable_auto_timeout {
            put("EnableAutoTimeout", bool_text(true));
        }
        if self.suspended {
            put("InitialStatus", "Suspended".to_string());
        }
        for (index, dependency) in self.dependencies.iter().enumerate() {
            put(&format!("JobDependency{}", index), dependency.clone());
        }
        for (index, info) in self.extra_info.iter().take(MAX_EXTRA_INFO).enumerate() {
            if !info.is_empty() {
                put(&format!("ExtraInfo{}", index), info.clone());
            }
        }
        for (index, file) in self.output_filenames.iter().enumerate() {
            put(&format!("OutputFilename{}", index), file.clone());
        }
        for (index, (key, value)) in self.extra.iter().enumerate() {
            put(&format!("ExtraInfoKeyValue{}", index), format!("{}={}", key, value));
        }

        records
    }
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.frames)
    }
}

pub(crate) fn bool_text(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_include_required_fields() {
        let info = JobInfo {
            name: "comp / WriteA".to_string(),
            frames: "1-10".to_string(),
            ..Default::default()
        };
        let records = info.to_records();
        assert_eq!(records["Name"], "comp / WriteA");
        assert_eq!(records["Plugin"], "Nuke");
        assert_eq!(records["Frames"], "1-10");
        assert_eq!(records["Priority"], "50");
        assert!(!records.contains_key("BatchName"));
        assert!(!records.contains_key("MachineLimit"));
    }

    #[test]
    fn numbered_fields() {
        let mut info = JobInfo {
            dependencies: vec!["a".to_string(), "b".to_string()],
            extra_info: vec!["x".to_string(), String::new(), "z".to_string()],
            output_filenames: vec!["/out/a.####.exr".to_string()],
            ..Default::default()
        };
        info.set_extra("shot", "sh010");

        let records = info.to_records();
        assert_eq!(records["JobDependency0"], "a");
        assert_eq!(records["JobDependency1"], "b");
        assert_eq!(records["ExtraInfo0"], "x");
        assert!(!records.contains_key("ExtraInfo1"));
        assert_eq!(records["ExtraInfo2"], "z");
        assert_eq!(records["OutputFilename0"], "/out/a.####.exr");
        assert_eq!(records["ExtraInfoKeyValue0"], "shot=sh010");
    }

    #[test]
    fn set_field_rejects_unknown_keys() {
        let mut info = JobInfo::default();
        info.set_field("Priority", "80").unwrap();
        info.set_field("pool", "comp").unwrap();
        info.set_field("InitialStatus", "Suspended").unwrap();
        assert_eq!(info.priority, 80);
        assert_eq!(info.pool, "comp");
        assert!(info.suspended);

        assert_eq!(
            info.set_field("Priorty", "80"),
            Err(PlanError::UnknownField("Priorty".to_string()))
        );
        assert!(matches!(
            info.set_field("Priority", "high"),
            Err(PlanError::InvalidValue { .. })
        ));
    }

    #[test]
    fn set_field_rejects_planned_fields() {
        let mut info = JobInfo::default();
        for key in ["Name", "batchname", "Frames"] {
            assert_eq!(
                info.set_field(key, "x"),
                Err(PlanError::PlannedField(key.to_string()))
            );
        }
        assert!(info.name.is_empty());
        assert!(info.frames.is_empty());
    }

    #[test]
    fn machine_lists() {
        assert_eq!(
            MachineList::parse("deny:render01, render02"),
            Some(MachineList::Deny(vec![
                "render01".to_string(),
                "render02".to_string()
            ]))
        );
        assert_eq!(
            MachineList::parse("render01"),
            Some(MachineList::Allow(vec!["render01".to_string()]))
        );
        assert_eq!(MachineList::parse("maybe:render01"), None);
        assert_eq!(MachineList::parse("allow:"), None);

        let info = JobInfo {
            machine_list: MachineList::parse("allow:a,b"),
            ..Default::default()
        };
        assert_eq!(info.to_records()["Whitelist"], "a,b");
    }
}

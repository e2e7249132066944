//! Web-service transport over the farm's REST API.

use std::fs;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};

use super::connection::{with_user_name, Connection, FarmError, FarmResult, Records};
use crate::config::FarmSettings;

pub struct WebServiceConnection {
    client: Client,
    base_url: String,
}

impl WebServiceConnection {
    /// Build a client from farm settings. No request is made yet.
    pub fn new(settings: &FarmSettings) -> FarmResult<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(settings.timeout_secs));

        if settings.ssl {
            if let Some(cert_path) = settings.ssl_cert.as_deref() {
                let pem = fs::read(cert_path)
                    .map_err(|e| FarmError::io(format!("reading certificate {}", cert_path), e))?;
                builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
            }
        }

        Ok(Self {
            client: builder.build()?,
            base_url: settings.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check the service answers.
    pub fn connect(&mut self) -> FarmResult<()> {
        let groups = self.groups()?;
        tracing::info!(
            "Connected to farm web service at {} ({} groups)",
            self.base_url,
            groups.len()
        );
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Extract the job id from a submission response.
///
/// The service answers with the job document (`_id` at the top level or
/// under `Props`) or, with `IdOnly`, a bare id string.
pub fn parse_job_response(body: &str) -> FarmResult<String> {
    let trimmed = body.trim();
    if trimmed.starts_with("Error") {
        return Err(FarmError::rejected(trimmed));
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) if !trimmed.is_empty() && !trimmed.contains(char::is_whitespace) => {
            return Ok(trimmed.to_string());
        }
        Err(_) => return Err(FarmError::MissingJobId(trimmed.to_string())),
    };

    let id = match &value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Object(_) => value
            .get("_id")
            .or_else(|| value.pointer("/Props/_id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    match id {
        Some(id) if id.starts_with("Error") => Err(FarmError::rejected(id)),
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(FarmError::MissingJobId(trimmed.to_string())),
    }
}

impl Connection for WebServiceConnection {
    fn name(&self) -> &'static str {
        "web service"
    }

    fn submit(&mut self, job_info: &Records, plugin_info: &Records) -> FarmResult<String> {
        let payload = json!({
            "JobInfo": with_user_name(job_info),
            "PluginInfo": plugin_info,
            "AuxFiles": [],
            "IdOnly": true,
        });
        tracing::debug!("Submitting job payload: {}", payload);

        let response = self.client.post(self.url("/api/jobs")).json(&payload).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(FarmError::rejected(format!("HTTP {}: {}", status, body.trim())));
        }

        let id = parse_job_response(&body)?;
        tracing::info!("Submitted job {}", id);
        Ok(id)
    }

    fn groups(&mut self) -> FarmResult<Vec<String>> {
        let groups = self
            .client
            .get(self.url("/api/groups"))
            .send()?
            .error_for_status()?
            .json::<Vec<String>>()?;
        Ok(groups)
    }
}

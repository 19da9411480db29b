//! Job and converter-module records.
//!
//! These are the rows the manager reads and writes through the store traits.
//! A job is created `requested`, moved to `started` by exactly one dispatch
//! call, and always ends in one of the terminal states. `errors`, `warnings`
//! and `log` are append-only ordered lists.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Requested,
    Started,
    Success,
    Warnings,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Requested => "requested",
            JobStatus::Started => "started",
            JobStatus::Success => "success",
            JobStatus::Warnings => "warnings",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A self/list/create hyperlink attached to job records and listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub rel: String,
    pub method: String,
}

/// One requested conversion task tracked through its status lifecycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxJob {
    pub job_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub input_format: String,
    #[serde(default)]
    pub output_format: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub cdn_bucket: String,
    #[serde(default)]
    pub cdn_file: String,
    #[serde(default)]
    pub convert_module: String,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default)]
    pub links: Option<Link>,
}

impl TxJob {
    pub fn log_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(job_id = %self.job_id, "{message}");
        self.log.push(message);
    }

    pub fn error_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(job_id = %self.job_id, "{message}");
        self.errors.push(message);
    }

    pub fn warning_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(job_id = %self.job_id, "{message}");
        self.warnings.push(message);
    }
}

/// A registered converter capability, matched against a job's
/// `(resource_type, input_format, output_format)` triple by exact set
/// membership, first registration wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxModule {
    pub name: String,
    #[serde(rename = "type", default)]
    pub module_type: String,
    #[serde(default)]
    pub input_format: Vec<String>,
    #[serde(default)]
    pub output_format: Vec<String>,
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub public_links: Vec<String>,
    #[serde(default)]
    pub private_links: Vec<String>,
    #[serde(default = "default_module_version")]
    pub version: String,
}

fn default_module_version() -> String {
    "1".to_string()
}

//! Job lifecycle manager: creates job records, matches converter modules,
//! dispatches execution to the external async executor and reconciles the
//! result into a terminal job state.
//!
//! Job creation and job execution are decoupled; an external trigger calls
//! [`TxManager::start_job`] after [`TxManager::setup_job`] has inserted the
//! record. Start is safe to invoke more than once for the same id: the only
//! re-entrancy guard is the started timestamp, an optimistic check, so two
//! racing starts can both pass it. That race is accepted and documented, not
//! guaranteed against; a compare-and-swap guard would belong in the
//! [`JobStore`] implementation.
//!
//! Once a job record exists the manager commits to producing a terminal
//! state and firing the callback: every fault after the start transition is
//! captured into the job's error list instead of propagating.

use std::fmt;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::contract::{
    InvokeResponse, Invoker, JobQuery, JobStore, ModuleStore, StoreError, UserClient,
};
use crate::models::{JobStatus, Link, TxJob, TxModule, TIMESTAMP_FORMAT};

/// Configuration errors raised during job setup, before any record exists.
#[derive(Debug)]
pub enum ManagerError {
    MissingField(&'static str),
    InvalidUserToken,
    NoConverter {
        resource_type: String,
        input_format: String,
        output_format: String,
    },
    Store(StoreError),
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::MissingField(field) => write!(f, "\"{field}\" not given."),
            ManagerError::InvalidUserToken => write!(f, "Invalid user_token. User not found."),
            ManagerError::NoConverter {
                resource_type,
                input_format,
                output_format,
            } => write!(
                f,
                "No converter was found to convert {resource_type} from {input_format} to {output_format}"
            ),
            ManagerError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for ManagerError {}

impl From<StoreError> for ManagerError {
    fn from(e: StoreError) -> Self {
        ManagerError::Store(e)
    }
}

/// Incoming request to create a conversion job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub user_token: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub input_format: String,
    #[serde(default)]
    pub output_format: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub cdn_bucket: Option<String>,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
}

/// A created job plus the listing/creation links returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct JobCreation {
    pub job: TxJob,
    pub links: Vec<Link>,
}

pub struct TxManager<'a> {
    config: &'a AppConfig,
    jobs: &'a dyn JobStore,
    modules: &'a dyn ModuleStore,
    users: &'a dyn UserClient,
    invoker: &'a dyn Invoker,
}

impl<'a> TxManager<'a> {
    pub fn new(
        config: &'a AppConfig,
        jobs: &'a dyn JobStore,
        modules: &'a dyn ModuleStore,
        users: &'a dyn UserClient,
        invoker: &'a dyn Invoker,
    ) -> Self {
        Self {
            config,
            jobs,
            modules,
            users,
            invoker,
        }
    }

    /// First registered module whose capability sets contain the job's
    /// triple. No scoring; registration order decides ties.
    async fn converter_module(&self, job: &TxJob) -> Result<Option<TxModule>, StoreError> {
        let modules = self.modules.list().await?;
        Ok(modules.into_iter().find(|module| {
            module.resource_types.contains(&job.resource_type)
                && module.input_format.contains(&job.input_format)
                && module.output_format.contains(&job.output_format)
        }))
    }

    /// Validates a job request, selects a converter and inserts the record
    /// in state `requested`. All failures here surface to the caller; the
    /// job table is untouched on error.
    pub async fn setup_job(&self, request: JobRequest) -> Result<JobCreation, ManagerError> {
        if request.user_token.is_empty() {
            return Err(ManagerError::MissingField("user_token"));
        }
        let user = self
            .users
            .get_user(&request.user_token)
            .await?
            .filter(|u| !u.username.is_empty())
            .ok_or(ManagerError::InvalidUserToken)?;

        let cdn_bucket = match request.cdn_bucket.filter(|b| !b.is_empty()) {
            Some(bucket) => bucket,
            None if !self.config.cdn_bucket.is_empty() => self.config.cdn_bucket.clone(),
            None => return Err(ManagerError::MissingField("cdn_bucket")),
        };
        if request.source.is_empty() {
            return Err(ManagerError::MissingField("source"));
        }
        if request.resource_type.is_empty() {
            return Err(ManagerError::MissingField("resource_type"));
        }
        if request.input_format.is_empty() {
            return Err(ManagerError::MissingField("input_format"));
        }
        if request.output_format.is_empty() {
            return Err(ManagerError::MissingField("output_format"));
        }

        let mut job = TxJob {
            user: user.username.clone(),
            identifier: request.identifier,
            resource_type: request.resource_type,
            input_format: request.input_format,
            output_format: request.output_format,
            source: request.source,
            cdn_bucket,
            callback: request.callback,
            ..TxJob::default()
        };

        let module = self
            .converter_module(&job)
            .await?
            .ok_or_else(|| ManagerError::NoConverter {
                resource_type: job.resource_type.clone(),
                input_format: job.input_format.clone(),
                output_format: job.output_format.clone(),
            })?;
        job.convert_module = module.name;

        let created_at = Utc::now();
        job.created_at = Some(created_at.format(TIMESTAMP_FORMAT).to_string());
        job.expires_at = Some((created_at + Duration::days(1)).format(TIMESTAMP_FORMAT).to_string());
        job.eta = Some(
            (created_at + Duration::seconds(20))
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        );
        job.status = JobStatus::Requested;
        job.message = "Conversion requested...".to_string();
        // Unique per creation event: the seed carries microseconds.
        job.job_id = {
            let mut hasher = Sha256::new();
            hasher.update(
                format!(
                    "{}-{}-{}",
                    user.username,
                    user.email,
                    created_at.format("%Y-%m-%dT%H:%M:%S%.6fZ")
                )
                .as_bytes(),
            );
            format!("{:x}", hasher.finalize())
        };

        // All conversions result in a ZIP of the converted file(s).
        let output_file = format!("tx/job/{}.zip", job.job_id);
        job.output = format!("https://{}/{}", job.cdn_bucket, output_file);
        job.cdn_file = output_file;
        job.links = Some(Link {
            href: format!("{}/tx/job/{}", self.config.api_url, job.job_id),
            rel: "self".to_string(),
            method: "GET".to_string(),
        });

        info!(job_id = %job.job_id, module = %job.convert_module, "Job requested");
        self.jobs.insert(&job).await?;

        Ok(JobCreation {
            job,
            links: vec![
                Link {
                    href: format!("{}/tx/job", self.config.api_url),
                    rel: "list".to_string(),
                    method: "GET".to_string(),
                },
                Link {
                    href: format!("{}/tx/job", self.config.api_url),
                    rel: "create".to_string(),
                    method: "POST".to_string(),
                },
            ],
        })
    }

    /// Drives one job from `requested` to a terminal state and fires the
    /// callback. Unknown ids return a stub record; an already-started job is
    /// returned unchanged (idempotent no-op).
    pub async fn start_job(&self, job_id: &str) -> Result<TxJob, ManagerError> {
        let Some(mut job) = self.jobs.get(job_id).await? else {
            return Ok(TxJob {
                job_id: job_id.to_string(),
                success: false,
                message: format!("No job with ID {job_id} has been requested"),
                ..TxJob::default()
            });
        };

        // Only start when the status is 'requested' and no start timestamp
        // has been set.
        if job.status != JobStatus::Requested || job.started_at.is_some() {
            debug!(job_id, status = %job.status, "Job already started, returning record unchanged");
            return Ok(job);
        }

        let started_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        job.started_at = Some(started_at.clone());
        job.status = JobStatus::Started;
        job.message = "Conversion started...".to_string();
        job.log_message(format!("Started job {job_id} at {started_at}"));
        let mut success = false;

        if let Err(e) = self.dispatch(&mut job, &mut success).await {
            job.error_message(format!("Failed with message: {e}"));
        }

        let ended_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        job.ended_at = Some(ended_at.clone());

        let message = if !success || !job.errors.is_empty() {
            job.success = false;
            job.status = JobStatus::Failed;
            debug!(success, errors = ?job.errors, "Conversion failed");
            "Conversion failed"
        } else if !job.warnings.is_empty() {
            job.success = true;
            job.status = JobStatus::Warnings;
            "Conversion successful with warnings"
        } else {
            job.success = true;
            job.status = JobStatus::Success;
            "Conversion successful"
        };

        job.message = message.to_string();
        job.log_message(message);
        job.log_message(format!("Finished job {} at {ended_at}", job.job_id));

        if let Err(e) = self.jobs.update(&job, Vec::new()).await {
            error!(error = ?e, job_id = %job.job_id, "Failed to persist terminal job state");
        }

        if let Some(callback) = job.callback.clone().filter(|c| !c.is_empty()) {
            self.do_callback(&callback, &job).await;
        }

        Ok(job)
    }

    /// The converter round-trip. Every error returned here is converted into
    /// a job error by the caller, never propagated further.
    async fn dispatch(&self, job: &mut TxJob, success: &mut bool) -> Result<(), StoreError> {
        self.jobs
            .update(
                job,
                vec![
                    "started_at".to_string(),
                    "status".to_string(),
                    "message".to_string(),
                    "log".to_string(),
                ],
            )
            .await?;

        let module = self.converter_module(job).await?.ok_or_else(|| {
            StoreError::from(format!(
                "No converter was found to convert {} from {} to {}",
                job.resource_type, job.input_format, job.output_format
            ))
        })?;
        job.convert_module = module.name.clone();
        self.jobs
            .update(job, vec!["convert_module".to_string()])
            .await?;

        let payload = json!({
            "data": { "job": &job },
            "vars": { "prefix": self.config.prefix },
        });
        let converter_function = format!("{}tx_convert_{}", self.config.prefix, module.name);
        job.log_message(format!(
            "Telling module {converter_function} to convert {} and put at {}",
            job.source, job.output
        ));
        debug!(function = %converter_function, payload = %payload, "Payload to converter");

        let response = self.invoker.invoke(&converter_function, payload).await?;
        debug!(function = %converter_function, "Converter invocation finished");

        // Re-fetch: the converter's webhook may have appended warnings while
        // we were blocked on the invocation.
        if let Some(fresh) = self.jobs.get(&job.job_id).await? {
            *job = fresh;
        }

        match response {
            InvokeResponse::ErrorEnvelope { error_message } => {
                let error = error_message
                    .strip_prefix("Bad Request: ")
                    .unwrap_or(&error_message)
                    .to_string();
                debug!(function = %converter_function, error = %error, "Received error message from converter");
                job.error_message(error);
            }
            InvokeResponse::Payload(result) => {
                debug!(function = %converter_function, ?result, "Payload from converter");
                *success = result.success;
                let returned_errors = !result.errors.is_empty();
                let returned_warnings = !result.warnings.is_empty();
                for message in result.info {
                    if !message.is_empty() {
                        job.log_message(message);
                    }
                }
                for message in result.errors {
                    if !message.is_empty() {
                        job.error_message(message);
                    }
                }
                for message in result.warnings {
                    if !message.is_empty() {
                        job.warning_message(message);
                    }
                }
                if returned_errors {
                    job.log_message(format!("{} function returned with errors.", module.name));
                } else if returned_warnings {
                    job.log_message(format!("{} function returned with warnings.", module.name));
                } else {
                    job.log_message(format!("{} function returned successfully.", module.name));
                }
            }
            InvokeResponse::Other(_) => {
                job.error_message("Conversion failed for unknown reason.");
            }
        }
        Ok(())
    }

    /// Fire-and-forget terminal-state callback. Failures are logged, never
    /// retried and never affect the job record.
    async fn do_callback(&self, url: &str, job: &TxJob) {
        if !url.starts_with("http") {
            return;
        }
        debug!(url, "Making callback");
        let client = reqwest::Client::new();
        match client.post(url).json(job).send().await {
            Ok(response) => debug!(url, status = %response.status(), "Callback finished"),
            Err(e) => error!(error = ?e, url, "Callback failed"),
        }
    }

    /// Registers a converter module after validating its required fields.
    pub async fn register_module(&self, mut module: TxModule) -> Result<TxModule, ManagerError> {
        if module.name.is_empty() {
            return Err(ManagerError::MissingField("name"));
        }
        if module.module_type.is_empty() {
            return Err(ManagerError::MissingField("type"));
        }
        if module.input_format.is_empty() {
            return Err(ManagerError::MissingField("input_format"));
        }
        if module.output_format.is_empty() {
            return Err(ManagerError::MissingField("output_format"));
        }
        if module.resource_types.is_empty() {
            return Err(ManagerError::MissingField("resource_types"));
        }
        module
            .public_links
            .push(format!("{}/tx/convert/{}", self.config.api_url, module.name));
        info!(module = %module.name, "Registering converter module");
        self.modules.insert(&module).await?;
        Ok(module)
    }

    /// Lists jobs, scoped to the requesting user when authentication is
    /// required. The filter language itself lives in the store.
    pub async fn list_jobs(
        &self,
        user_token: Option<&str>,
        must_be_authenticated: bool,
    ) -> Result<Vec<TxJob>, ManagerError> {
        let mut filter = JobQuery::default();
        if must_be_authenticated {
            let token = user_token.ok_or(ManagerError::MissingField("user_token"))?;
            let user = self
                .users
                .get_user(token)
                .await?
                .ok_or(ManagerError::InvalidUserToken)?;
            filter.user = Some(user.username);
        }
        Ok(self.jobs.query(filter).await?)
    }

    pub async fn job_count(&self) -> Result<u64, ManagerError> {
        Ok(self.jobs.count().await?)
    }
}

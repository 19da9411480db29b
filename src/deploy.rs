//! Deployment assembler: merges a revision's converted output with the page
//! template and publishes it to the public website bucket.
//!
//! The deployer reads from the project's user dir in the CDN bucket and
//! applies the site template to the raw HTML files. It does no normalization
//! itself; the preprocessor's manifest/book-list output upstream decides
//! whether a build arrives whole, as a multi-part merge, or one part at a
//! time.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::contract::{BlobStore, Invoker, StoreError, TemplateIndex, Templater};
use crate::file_utils::{
    copy_file, copy_if_missing, sorted_file_names, sorted_files_with_ext, write_file,
};

#[derive(Debug)]
pub enum DeployError {
    Io(io::Error),
    Json(serde_json::Error),
    Store(StoreError),
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployError::Io(e) => write!(f, "io error: {e}"),
            DeployError::Json(e) => write!(f, "json error: {e}"),
            DeployError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for DeployError {}

impl From<io::Error> for DeployError {
    fn from(e: io::Error) -> Self {
        DeployError::Io(e)
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(e: serde_json::Error) -> Self {
        DeployError::Json(e)
    }
}

impl From<StoreError> for DeployError {
    fn from(e: StoreError) -> Self {
        DeployError::Store(e)
    }
}

/// The build log a conversion leaves next to its output. Extra fields are
/// carried through untouched; the deployer republishes the whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLog {
    #[serde(default)]
    pub commit_id: String,
    #[serde(default)]
    pub repo_owner: String,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub part: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub struct ProjectDeployer<'a> {
    config: &'a AppConfig,
    cdn: &'a dyn BlobStore,
    door43: &'a dyn BlobStore,
    templater: &'a dyn Templater,
}

impl<'a> ProjectDeployer<'a> {
    pub fn new(
        config: &'a AppConfig,
        cdn: &'a dyn BlobStore,
        door43: &'a dyn BlobStore,
        templater: &'a dyn Templater,
    ) -> Self {
        Self {
            config,
            cdn,
            door43,
            templater,
        }
    }

    /// Deploys a single revision of a project to the public bucket. Returns
    /// false when the build log is missing/incomplete or a partial build is
    /// not ready yet.
    pub async fn deploy_revision(&self, build_log_key: &str) -> Result<bool, DeployError> {
        let build_log_value = match self.cdn.get_json(build_log_key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = ?e, key = build_log_key, "Failed to fetch build log");
                None
            }
        };
        let Some(build_log_value) = build_log_value else {
            return Ok(false);
        };
        let Ok(build_log) = serde_json::from_value::<BuildLog>(build_log_value.clone()) else {
            return Ok(false);
        };
        if build_log.commit_id.is_empty()
            || build_log.repo_owner.is_empty()
            || build_log.repo_name.is_empty()
        {
            return Ok(false);
        }

        let start = Instant::now();
        debug!(build_log = %build_log_value, "Deploying");

        let user = &build_log.repo_owner;
        let repo_name = &build_log.repo_name;
        let commit_id: String = build_log.commit_id.chars().take(10).collect();

        let s3_commit_key = format!("u/{user}/{repo_name}/{commit_id}");
        let s3_repo_key = format!("u/{user}/{repo_name}");
        let mut download_key = s3_commit_key.clone();

        let multi_merge = build_log.multiple;
        let mut partial = false;
        if multi_merge {
            debug!("found multi-part merge");
        } else if let Some(part) = &build_log.part {
            download_key = format!("{download_key}/{part}");
            partial = true;
            debug!(part = %part, "found partial");
            if !self
                .cdn
                .key_exists(&format!("{download_key}/finished"))
                .await?
            {
                debug!("Not ready to process partial");
                return Ok(false);
            }
        }

        let temp_dir = tempfile::Builder::new().prefix("deployer_").tempdir()?;
        let source_root = tempfile::Builder::new()
            .prefix("source_")
            .tempdir_in(temp_dir.path())?;
        let output_root = tempfile::Builder::new()
            .prefix("output_")
            .tempdir_in(temp_dir.path())?;
        let template_root = tempfile::Builder::new()
            .prefix("template_")
            .tempdir_in(temp_dir.path())?;
        let output_dir = output_root.path();

        let template_key = "templates/project-page.html";
        let template_file = template_root.path().join("project-page.html");
        debug!(key = template_key, file = %template_file.display(), "Downloading template");
        self.door43.download_file(template_key, &template_file).await?;

        let source_dir: PathBuf;
        if !multi_merge {
            self.cdn
                .download_dir(&format!("{download_key}/"), source_root.path())
                .await?;
            source_dir = source_root.path().join(&download_key);
            debug!(
                elapsed_seconds = start.elapsed().as_secs(),
                "deploy download completed"
            );

            let html_files = sorted_files_with_ext(&source_dir, "html");
            if html_files.is_empty() {
                // Nothing converted yet: publish a placeholder page carrying
                // the build's errors or its current message.
                write_file(
                    &source_dir.join("index.html"),
                    &placeholder_page(repo_name, &build_log),
                )?;
            }

            let template_result =
                self.templater
                    .apply(&source_dir, output_dir, &template_file, None)?;

            // Merge this pass into the stored index of templated files.
            let mut index = self.templater_index(&s3_commit_key, "index.json").await;
            index.titles.extend(template_result.titles);
            index.chapters.extend(template_result.chapters);
            index.book_codes.extend(template_result.book_codes);
            let out_file = output_dir.join("index.json");
            write_file(&out_file, &serde_json::to_string(&index)?)?;
            self.cdn
                .upload_file(&out_file, &format!("{s3_commit_key}/index.json"))
                .await?;
        } else {
            // Multi-part merge: fetch the previously templated files from
            // the public bucket and re-template only what is new, seeded
            // with the index from previous passes.
            self.door43
                .download_dir(&format!("{download_key}/"), source_root.path())
                .await?;
            source_dir = source_root.path().join(&download_key);
            for name in sorted_file_names(&source_dir) {
                debug!(file = %name, "Downloaded");
            }

            let stale_index = source_dir.join("index.html");
            if stale_index.is_file() {
                fs::remove_file(&stale_index)?;
            }
            debug!(
                elapsed_seconds = start.elapsed().as_secs(),
                "deploy download completed"
            );

            let seed = self.templater_index(&s3_commit_key, "index.json").await;
            self.templater
                .apply(&source_dir, output_dir, &template_file, Some(seed))?;
        }

        // The first HTML file stands in for index.html when none exists.
        let html_files = sorted_files_with_ext(output_dir, "html");
        if !partial && !html_files.is_empty() {
            let index_file = output_dir.join("index.html");
            if !index_file.is_file() {
                copy_file(&output_dir.join(&html_files[0]), &index_file)?;
            }
        }

        // Support files (css etc.) ride along no-clobber. Partial builds
        // also move their content files to the common area.
        for name in sorted_file_names(&source_dir) {
            let file_path = source_dir.join(&name);
            copy_if_missing(&file_path, &output_dir.join(&name))?;

            if partial
                && !name.contains("finished")
                && !name.contains("build_log")
                && !name.contains("index.html")
            {
                debug!(file = %name, "Moving to common area");
                self.cdn
                    .upload_file(&file_path, &format!("{s3_commit_key}/{name}"))
                    .await?;
                self.cdn
                    .delete_file(&format!("{download_key}/{name}"))
                    .await?;
            }
        }

        // Master build log travels with the published revision.
        write_file(
            &output_dir.join("build_log.json"),
            &serde_json::to_string(&build_log)?,
        )?;
        debug!(build_log = ?build_log, "Final build_log.json");

        // Publish the whole output tree.
        let mut files = Vec::new();
        collect_files(output_dir, &mut files)?;
        files.sort();
        let keyed: Vec<(PathBuf, String)> = files
            .into_iter()
            .map(|path| {
                let relative = path
                    .strip_prefix(output_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                let key = format!("{s3_commit_key}/{relative}");
                debug!(path = %path.display(), key = %key, "Uploading");
                (path, key)
            })
            .collect();
        let uploads = keyed
            .iter()
            .map(|(path, key)| self.door43.upload_file(path, key));
        futures::future::try_join_all(uploads).await?;

        if !partial {
            // Repo-level json documents and redirects; failures here are
            // tolerated, the revision itself is already published.
            let project_json = temp_dir.path().join("project.json");
            if self
                .cdn
                .download_file(&format!("{s3_repo_key}/project.json"), &project_json)
                .await
                .is_ok()
            {
                if let Err(e) = self
                    .door43
                    .upload_file(&project_json, &format!("{s3_repo_key}/project.json"))
                    .await
                {
                    warn!(error = ?e, "Failed to publish project.json");
                }
            }
            if let Err(e) = self
                .door43
                .copy(
                    &format!("{s3_commit_key}/manifest.json"),
                    &format!("{s3_repo_key}/manifest.json"),
                )
                .await
            {
                warn!(error = ?e, "Failed to publish manifest.json");
            }
            if let Err(e) = self
                .door43
                .redirect(&s3_repo_key, &format!("/{s3_commit_key}"))
                .await
            {
                warn!(error = ?e, "Failed to set repo redirect");
            }
            if let Err(e) = self
                .door43
                .redirect(
                    &format!("{s3_repo_key}/index.html"),
                    &format!("/{s3_commit_key}"),
                )
                .await
            {
                warn!(error = ?e, "Failed to set index redirect");
            }
        } else if self
            .cdn
            .key_exists(&format!("{s3_commit_key}/final_build_log.json"))
            .await?
        {
            debug!("conversions all finished, trigger final merge");
            self.cdn
                .copy(
                    &format!("{s3_commit_key}/final_build_log.json"),
                    &format!("{s3_commit_key}/build_log.json"),
                )
                .await?;
        }

        debug!(
            elapsed_seconds = start.elapsed().as_secs(),
            "deploy completed"
        );
        Ok(true)
    }

    /// Stored templating index for a revision; missing reads as empty.
    async fn templater_index(&self, s3_commit_key: &str, filename: &str) -> TemplateIndex {
        match self.cdn.get_json(&format!("{s3_commit_key}/{filename}")).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            _ => TemplateIndex::default(),
        }
    }

    /// Re-triggers deployment of every project whose build log went stale:
    /// one executor invocation per build log older than a day.
    pub async fn redeploy_all_projects(
        &self,
        invoker: &dyn Invoker,
        deploy_function: &str,
    ) -> Result<bool, DeployError> {
        let one_day_ago = Utc::now() - Duration::hours(24);
        for object in self.cdn.list_objects("u/", "build_log.json").await? {
            if one_day_ago <= object.last_modified {
                continue;
            }
            invoker
                .invoke(
                    deploy_function,
                    json!({
                        "prefix": self.config.prefix,
                        "build_log_key": object.key,
                    }),
                )
                .await?;
        }
        Ok(true)
    }
}

fn placeholder_page(repo_name: &str, build_log: &BuildLog) -> String {
    let content = if !build_log.errors.is_empty() {
        format!(
            concat!(
                "<div style=\"text-align:center;margin-bottom:20px\">",
                "<i class=\"fa fa-times-circle-o\" style=\"font-size: 250px;font-weight: 300;color: red\"></i>",
                "<br/><h2>Critical!</h2><h3>Here is what went wrong with this build:</h3></div>",
                "<div><ul><li>{}</li></ul></div>"
            ),
            build_log.errors.join("</li><li>")
        )
    } else {
        format!(
            "<h1 class=\"conversion-requested\">{}</h1><p><i>No content is available to show for {} yet.</i></p>",
            build_log.message, repo_name
        )
    };
    format!(
        concat!(
            "<html lang=\"en\"><head><title>{0}</title></head>",
            "<body><div id=\"content\">{1}</div></body></html>"
        ),
        repo_name, content
    )
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

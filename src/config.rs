use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Process-wide configuration, built once per run and passed by reference
/// into each component. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the public job API, used in record links.
    pub api_url: String,
    /// Bucket converted artifacts land in.
    pub cdn_bucket: String,
    /// Public website bucket the deployer publishes to.
    pub door43_bucket: String,
    /// Base URL of the git service repositories live on.
    pub gogs_url: String,
    /// Deployment prefix ("dev-" or empty) prepended to function names.
    #[serde(default)]
    pub prefix: String,
}

impl AppConfig {
    pub fn trace_loaded(&self) {
        info!(
            api_url = %self.api_url,
            cdn_bucket = %self.cdn_bucket,
            door43_bucket = %self.door43_bucket,
            prefix = %self.prefix,
            "Loaded AppConfig"
        );
        debug!(?self, "AppConfig loaded (full debug)");
    }
}

use serde::{Deserialize, Serialize};
use url::Url;

/// WebDAV server flavor; decides how the DAV root hangs off the server URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Nextcloud,
    Owncloud,
    #[default]
    Generic,
}

/// WebDAV endpoint configuration
#[derive(Debug, Clone)]
pub struct DavConfig {
    pub server_url: String,
    pub username: String,
    pub server_type: ServerType,
    pub timeout_seconds: u64,
}

impl DavConfig {
    pub fn new(server_url: String, username: String, server_type: ServerType) -> Self {
        Self {
            server_url,
            username,
            server_type,
            timeout_seconds: 30,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_url.is_empty() {
            return Err(anyhow::anyhow!("Server URL cannot be empty"));
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(anyhow::anyhow!("Server URL must start with http:// or https://"));
        }

        if Url::parse(&self.server_url).is_err() {
            return Err(anyhow::anyhow!("Server URL is not a valid URL: {}", self.server_url));
        }

        if self.server_type == ServerType::Nextcloud && self.username.is_empty() {
            return Err(anyhow::anyhow!(
                "Username cannot be empty for Nextcloud servers (it is part of the DAV root)"
            ));
        }

        Ok(())
    }

    /// Returns the base URL that all relative paths hang off.
    pub fn webdav_url(&self) -> String {
        let mut url = self.server_url.trim_end_matches('/').to_string();

        match self.server_type {
            ServerType::Nextcloud => {
                if !url.contains("/remote.php/dav/files/") {
                    url.push_str(&format!("/remote.php/dav/files/{}", self.username));
                }
            }
            ServerType::Owncloud => {
                if !url.contains("/remote.php/webdav") {
                    url.push_str("/remote.php/webdav");
                }
            }
            ServerType::Generic => {
                // Use the URL exactly as provided.
            }
        }

        url
    }

    /// The URL path prefix multistatus hrefs carry for this server; stripped
    /// when rebasing parsed entries onto relative paths.
    pub fn dav_root_path(&self) -> String {
        match self.server_type {
            ServerType::Nextcloud => format!("/remote.php/dav/files/{}", self.username),
            ServerType::Owncloud => "/remote.php/webdav".to_string(),
            ServerType::Generic => Url::parse(&self.server_url)
                .map(|u| u.path().trim_end_matches('/').to_string())
                .unwrap_or_default(),
        }
    }

    /// Gets the timeout duration
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

/// Concurrency bound for the operation queue.
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    pub max_concurrent_transfers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 4,
        }
    }
}

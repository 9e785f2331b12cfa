use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TransferError, TransferResult};

/// A slash-separated path relative to the configured WebDAV base URL.
///
/// Always stored percent-decoded and normalized: leading `/`, no trailing
/// `/` except for the root itself. Percent encoding happens only at
/// request-construction time, per segment, so a path is never
/// double-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePath(String);

impl RemotePath {
    /// Builds a path from a decoded, caller-supplied string.
    ///
    /// Rejects control characters and `.`/`..` segments: those either break
    /// the wire protocol or resolve outside the configured base URL.
    pub fn new(raw: &str) -> TransferResult<Self> {
        if let Err(reason) = validate(raw) {
            return Err(TransferError::InvalidPath {
                path: raw.to_string(),
                reason,
            });
        }
        Ok(Self(normalize(raw)))
    }

    /// Builds a path from a percent-encoded href as found in a multistatus
    /// body. Decode or validation failures are the server's fault here, so
    /// they surface as `MalformedResponse`.
    pub fn from_encoded(href: &str) -> TransferResult<Self> {
        let decoded = urlencoding::decode(href)
            .map_err(|e| TransferError::MalformedResponse(format!("undecodable href '{href}': {e}")))?;
        if let Err(reason) = validate(&decoded) {
            return Err(TransferError::MalformedResponse(format!(
                "invalid href '{href}': {reason}"
            )));
        }
        Ok(Self(normalize(&decoded)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Percent-encodes the path segment by segment, preserving the slashes.
    pub fn encoded(&self) -> String {
        self.0
            .split('/')
            .map(|segment| urlencoding::encode(segment))
            .collect::<Vec<Cow<'_, str>>>()
            .join("/")
    }

    /// Final path segment, or the empty string for the root.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Strips a server-specific root prefix, turning a full server href
    /// into a path relative to the DAV base. Paths outside the prefix are
    /// returned unchanged, matching how hrefs from foreign roots are left
    /// alone.
    pub fn relative_to(&self, prefix: &str) -> RemotePath {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return self.clone();
        }
        match self.0.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() => RemotePath("/".to_string()),
            Some(rest) if rest.starts_with('/') => RemotePath(normalize(rest)),
            _ => self.clone(),
        }
    }

    /// Internal constructor for strings this crate already produced or
    /// normalized; skips caller-input validation.
    pub(crate) fn from_normalized(s: String) -> Self {
        Self(normalize(&s))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote location of chunk `index` of a `chunk_count`-piece upload to
/// `destination`. Deterministic in its inputs, so a resumed attempt targets
/// the exact same chunk locations.
pub fn chunk_remote_path(destination: &RemotePath, chunk_count: usize, index: usize) -> RemotePath {
    RemotePath::from_normalized(format!(
        "{}-chunking-{}-{}",
        destination.as_str(),
        chunk_count,
        index
    ))
}

fn validate(path: &str) -> Result<(), String> {
    if let Some(c) = path.chars().find(|c| c.is_control()) {
        return Err(format!("contains control character {:?}", c));
    }
    if path
        .split('/')
        .any(|segment| segment == "." || segment == "..")
    {
        return Err("resolves outside the base URL".to_string());
    }
    Ok(())
}

/// Leading slash, no trailing slash except for the root.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

//! Artifact persistence.
//!
//! Artifacts are written under a content-addressed path, so storing the same
//! rendered bytes for the same request twice lands on the same object.

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use crate::error::PipelineError;
use crate::models::Locator;
use crate::report::Artifact;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &str;

    /// Persist `artifact` for `request_id` and return where it can be fetched.
    async fn store(&self, request_id: &str, artifact: &Artifact) -> Result<Locator, PipelineError>;
}

/// `{request_id}/{kind}-{sha256[..16]}.{ext}`
pub fn object_path(request_id: &str, artifact: &Artifact) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&artifact.bytes);
    let digest = hex::encode(hasher.finalize());

    format!(
        "{}/{}-{}.{}",
        sanitize_segment(request_id),
        artifact.kind.slug(),
        &digest[..16],
        artifact.extension()
    )
}

/// Keeps a request id usable as a single path segment.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

pub(crate) fn storage_error(artifact: &Artifact, message: impl Into<String>) -> PipelineError {
    PipelineError::Storage {
        kind: artifact.kind.slug(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ArtifactKind;

    fn artifact(bytes: &[u8]) -> Artifact {
        Artifact {
            kind: ArtifactKind::Narrative,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_object_path_is_content_addressed() {
        let first = object_path("req-1", &artifact(b"# Report"));
        let again = object_path("req-1", &artifact(b"# Report"));
        let changed = object_path("req-1", &artifact(b"# Report v2"));

        assert_eq!(first, again);
        assert_ne!(first, changed);
        assert!(first.starts_with("req-1/narrative-"));
        assert!(first.ends_with(".md"));
        // req-1/ + narrative- + 16 hex chars + .md
        assert_eq!(first.len(), "req-1/narrative-".len() + 16 + ".md".len());
    }

    #[test]
    fn test_request_id_cannot_escape_directory() {
        let path = object_path("../etc/passwd", &artifact(b"x"));
        assert!(path.starts_with("---etc-passwd/"));
        assert!(object_path("   ", &artifact(b"x")).starts_with("unnamed/"));
    }
}

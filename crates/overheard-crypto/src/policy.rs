use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Shown when the policy file is missing, so the consent gate still works.
const FALLBACK_POLICY: &str = "*Privacy policy and anonymity guarantee*\n\n\
The policy file was not found next to the service\\.\n\
Ask the operator to provide it and restart\\.";

/// The consent policy in force for this process.
///
/// `hash` is the SHA-256 of the exact text. Any edit to the document changes
/// the hash and therefore invalidates every consent recorded against the old
/// text, without a manual version bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub text: String,
    pub hash: String,
}

impl Policy {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self { text, hash }
    }

    /// Load the policy document; a missing file yields the built-in fallback.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Policy file {} not found, using fallback text", path.display());
            return Ok(Self::from_text(FALLBACK_POLICY));
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?;
        let policy = Self::from_text(text);
        info!("Policy loaded from {} (hash {})", path.display(), &policy.hash[..12]);
        Ok(policy)
    }
}

/// Lowercase hex SHA-256 of a UTF-8 string.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn any_edit_changes_the_hash() {
        let v1 = Policy::from_text("We never log who you are.");
        let v2 = Policy::from_text("We never log who you are!");
        assert_ne!(v1.hash, v2.hash);
        assert_eq!(v1, Policy::from_text("We never log who you are."));
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy::load(&dir.path().join("absent.md")).unwrap();
        assert_eq!(policy.text, FALLBACK_POLICY);
        assert_eq!(policy.hash, content_hash(FALLBACK_POLICY));
    }

    #[test]
    fn file_contents_are_hashed_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.md");
        std::fs::write(&path, "Rules\n").unwrap();
        let policy = Policy::load(&path).unwrap();
        assert_eq!(policy.text, "Rules\n");
        assert_eq!(policy.hash, content_hash("Rules\n"));
    }
}

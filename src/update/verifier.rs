//! Integrity verifier - SHA-256 over the full artifact content

use super::error::{Result, UpdateError};
use super::release::LocalArtifact;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

/// How much the verification result can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assurance {
    /// Digest matched the hash published with the release
    Full,
    /// No hash was published; only size bounds were enforced
    Reduced,
}

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub computed: String,
    pub assurance: Assurance,
}

/// Calculate SHA256 checksum of a file, reading it to the end
pub async fn compute_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive hex comparison
pub fn digests_match(computed: &str, expected: &str) -> bool {
    computed.trim().eq_ignore_ascii_case(expected.trim())
}

/// Returns true iff the file's digest equals `expected_hex`
pub async fn verify_digest(path: &Path, expected_hex: &str) -> Result<bool> {
    let computed = compute_digest(path).await?;
    Ok(digests_match(&computed, expected_hex))
}

/// Verify a downloaded artifact against the published hash.
///
/// A mismatch is an [`UpdateError::Integrity`] error. A missing expected
/// hash is accepted with [`Assurance::Reduced`].
pub async fn verify(artifact: &LocalArtifact, expected_hash: Option<&str>) -> Result<Verification> {
    info!(path = %artifact.temp_path().display(), size = artifact.size(), "Verifying artifact");

    let computed = compute_digest(artifact.temp_path()).await?;

    match expected_hash {
        Some(expected) if digests_match(&computed, expected) => {
            info!(sha256 = %computed, "Checksum verified");
            Ok(Verification {
                computed,
                assurance: Assurance::Full,
            })
        }
        Some(expected) => {
            error!(expected = %expected, actual = %computed, "Checksum mismatch");
            Err(UpdateError::Integrity {
                expected: expected.to_ascii_lowercase(),
                actual: computed,
            })
        }
        None => {
            warn!(
                sha256 = %computed,
                "Release has no published checksum; accepting with reduced assurance"
            );
            Ok(Verification {
                computed,
                assurance: Assurance::Reduced,
            })
        }
    }
}

//! Journal record

use chrono::{DateTime, Utc};
use otad_types::{PackageDescriptor, UpdateStage};
use serde::{Deserialize, Serialize};

/// Crash-durable record of an update attempt.
///
/// Invariants maintained by the engine:
/// - `bytes_downloaded <= size_bytes`
/// - `md5_verified` implies `verified_at` is set
/// - in `toInstall`/`installing` the staging file exists with length
///   `bytes_downloaded == size_bytes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    pub version: String,
    pub url: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub md5_hex: String,
    pub bytes_downloaded: u64,
    pub md5_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub stage: UpdateStage,
    pub last_update: DateTime<Utc>,
}

impl PersistentState {
    /// Fresh record for a newly accepted download
    #[must_use]
    pub fn for_download(pkg: &PackageDescriptor, now: DateTime<Utc>) -> Self {
        Self {
            version: pkg.version.clone(),
            url: pkg.url.clone(),
            file_name: pkg.file_name.clone(),
            size_bytes: pkg.size_bytes,
            md5_hex: pkg.md5_hex.clone(),
            bytes_downloaded: 0,
            md5_verified: false,
            verified_at: None,
            stage: UpdateStage::Downloading,
            last_update: now,
        }
    }

    /// Descriptor view of the journaled package
    #[must_use]
    pub fn descriptor(&self) -> PackageDescriptor {
        PackageDescriptor {
            version: self.version.clone(),
            url: self.url.clone(),
            file_name: self.file_name.clone(),
            size_bytes: self.size_bytes,
            md5_hex: self.md5_hex.clone(),
        }
    }

    /// Whether a new request for `pkg` continues this record's download
    #[must_use]
    pub fn matches_package(&self, pkg: &PackageDescriptor) -> bool {
        self.url == pkg.url
    }

    /// Record a byte count advance; counts never move backwards within an
    /// attempt.
    pub fn advance_bytes(&mut self, bytes: u64, now: DateTime<Utc>) {
        self.bytes_downloaded = self.bytes_downloaded.max(bytes).min(self.size_bytes);
        self.last_update = now;
    }

    /// Mark the package verified and parked for install
    pub fn mark_verified(&mut self, now: DateTime<Utc>) {
        self.md5_verified = true;
        self.verified_at = Some(now);
        self.stage = UpdateStage::ToInstall;
        self.last_update = now;
    }

    /// Age of the verification, if verified
    #[must_use]
    pub fn verified_age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.verified_at
            .map(|at| now.signed_duration_since(at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg() -> PackageDescriptor {
        PackageDescriptor {
            version: "1.0.0".into(),
            url: "http://packages.example/app.zip".into(),
            file_name: "app.zip".into(),
            size_bytes: 1000,
            md5_hex: "600aff0f78265dd25bb6907828f916dd".into(),
        }
    }

    #[test]
    fn bytes_are_monotonic_and_capped() {
        let mut state = PersistentState::for_download(&pkg(), Utc::now());
        state.advance_bytes(400, Utc::now());
        assert_eq!(state.bytes_downloaded, 400);
        // A stale lower count never regresses the record.
        state.advance_bytes(300, Utc::now());
        assert_eq!(state.bytes_downloaded, 400);
        // And the total size is the ceiling.
        state.advance_bytes(5000, Utc::now());
        assert_eq!(state.bytes_downloaded, 1000);
    }

    #[test]
    fn verification_sets_timestamp() {
        let mut state = PersistentState::for_download(&pkg(), Utc::now());
        assert!(state.verified_age_secs(Utc::now()).is_none());
        let now = Utc::now();
        state.mark_verified(now);
        assert!(state.md5_verified);
        assert_eq!(state.stage, UpdateStage::ToInstall);
        assert_eq!(state.verified_at, Some(now));
    }

    #[test]
    fn package_identity_is_the_url() {
        let state = PersistentState::for_download(&pkg(), Utc::now());
        assert!(state.matches_package(&pkg()));
        let mut other = pkg();
        other.url = "http://packages.example/other.zip".into();
        assert!(!state.matches_package(&other));
    }
}

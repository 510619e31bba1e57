//! Package descriptor from the download trigger

use otad_errors::{Error, PackageError};
use serde::{Deserialize, Serialize};

/// Immutable description of a package to download, as supplied by the
/// download trigger request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub version: String,
    pub url: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub md5_hex: String,
}

impl PackageDescriptor {
    /// Validate the descriptor at the request boundary.
    ///
    /// # Errors
    ///
    /// Returns `PackageError::InvalidRequest` naming the offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.version.trim().is_empty() {
            return Err(invalid("version must not be empty"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid("package_url must be an http(s) URL"));
        }
        if self.file_name.is_empty() || self.file_name.contains('/') {
            return Err(invalid("package_name must be a bare file name"));
        }
        if self.md5_hex.len() != 32 || !self.md5_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("package_md5 must be 32 hex characters"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> Error {
    PackageError::InvalidRequest {
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> PackageDescriptor {
        PackageDescriptor {
            version: "1.0.0".into(),
            url: "http://packages.example/app-1.0.0.zip".into(),
            file_name: "app-1.0.0.zip".into(),
            size_bytes: 468,
            md5_hex: "600aff0f78265dd25bb6907828f916dd".into(),
        }
    }

    #[test]
    fn valid_descriptor_passes() {
        descriptor().validate().unwrap();
    }

    #[test]
    fn bad_md5_rejected() {
        let mut d = descriptor();
        d.md5_hex = "not-hex".into();
        assert!(d.validate().is_err());

        let mut d = descriptor();
        d.md5_hex = "600aff0f78265dd25bb6907828f916d".into(); // 31 chars
        assert!(d.validate().is_err());
    }

    #[test]
    fn path_in_file_name_rejected() {
        let mut d = descriptor();
        d.file_name = "../evil.zip".into();
        assert!(d.validate().is_err());
    }

    #[test]
    fn non_http_url_rejected() {
        let mut d = descriptor();
        d.url = "ftp://packages.example/app.zip".into();
        assert!(d.validate().is_err());
    }
}

//! Manifest validation rules

use crate::invalid_manifest;
use otad_errors::{Error, PackageError};
use otad_types::Manifest;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Validate the parsed manifest against the expected version, the archive
/// contents, and the permitted destination roots.
pub(crate) fn validate_manifest(
    manifest: &Manifest,
    expected_version: &str,
    entry_names: &[String],
    install_root: &Path,
    allowed_dst_roots: &[PathBuf],
) -> Result<(), Error> {
    if manifest.version != expected_version {
        return Err(invalid_manifest(format!(
            "manifest version {} does not match requested {expected_version}",
            manifest.version
        )));
    }
    if manifest.modules.is_empty() {
        return Err(invalid_manifest("manifest declares no modules"));
    }

    let mut seen = HashSet::new();
    for module in &manifest.modules {
        if module.name.is_empty() || module.name.contains('/') {
            return Err(invalid_manifest(format!(
                "module name {:?} is not a plain directory name",
                module.name
            )));
        }
        if !seen.insert(module.name.as_str()) {
            return Err(invalid_manifest(format!(
                "duplicate module name {}",
                module.name
            )));
        }
        validate_src(&module.src, entry_names)?;
        validate_dst(&module.dst, install_root, allowed_dst_roots)?;
    }
    Ok(())
}

fn validate_src(src: &str, entry_names: &[String]) -> Result<(), Error> {
    if src.is_empty() || src.starts_with('/') || src.split('/').any(|c| c == "..") {
        return Err(invalid_manifest(format!(
            "module src {src:?} must be a relative archive path"
        )));
    }
    let dir_prefix = format!("{}/", src.trim_end_matches('/'));
    let present = entry_names
        .iter()
        .any(|name| name == src || name.starts_with(&dir_prefix));
    if present {
        Ok(())
    } else {
        Err(PackageError::MissingSource {
            src: src.to_string(),
        }
        .into())
    }
}

fn validate_dst(dst: &Path, install_root: &Path, allowed_dst_roots: &[PathBuf]) -> Result<(), Error> {
    if !dst.is_absolute() {
        return Err(invalid_manifest(format!(
            "module dst {} must be absolute",
            dst.display()
        )));
    }
    let Some(normalized) = normalize(dst) else {
        return Err(PackageError::PathTraversal {
            path: dst.display().to_string(),
        }
        .into());
    };
    let permitted = normalized.starts_with(install_root)
        || allowed_dst_roots
            .iter()
            .any(|root| normalized.starts_with(root));
    if permitted {
        Ok(())
    } else {
        Err(PackageError::PathTraversal {
            path: dst.display().to_string(),
        }
        .into())
    }
}

/// Strip `.` components; any `..` makes the path unusable.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => return None,
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otad_errors::Error;
    use otad_types::ModuleEntry;

    fn manifest(modules: Vec<ModuleEntry>) -> Manifest {
        Manifest {
            version: "1.0.0".into(),
            modules,
        }
    }

    fn module(name: &str, src: &str, dst: &str) -> ModuleEntry {
        ModuleEntry {
            name: name.into(),
            src: src.into(),
            dst: dst.into(),
        }
    }

    fn entries() -> Vec<String> {
        vec![
            "manifest.json".to_string(),
            "app/".to_string(),
            "app/bin/run".to_string(),
        ]
    }

    fn check(m: &Manifest) -> Result<(), Error> {
        validate_manifest(
            m,
            "1.0.0",
            &entries(),
            Path::new("/opt/device"),
            &[PathBuf::from("/etc/device")],
        )
    }

    #[test]
    fn accepts_well_formed_manifest() {
        let m = manifest(vec![module("app", "app", "/opt/device/app")]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut m = manifest(vec![module("app", "app", "/opt/device/app")]);
        m.version = "2.0.0".into();
        assert!(matches!(
            check(&m),
            Err(Error::Package(PackageError::InvalidManifest { .. }))
        ));
    }

    #[test]
    fn rejects_empty_module_list() {
        let m = manifest(vec![]);
        assert!(matches!(
            check(&m),
            Err(Error::Package(PackageError::InvalidManifest { .. }))
        ));
    }

    #[test]
    fn rejects_missing_src() {
        let m = manifest(vec![module("web", "web", "/opt/device/web")]);
        assert!(matches!(
            check(&m),
            Err(Error::Package(PackageError::MissingSource { .. }))
        ));
    }

    #[test]
    fn rejects_parent_dir_in_dst() {
        let m = manifest(vec![module("app", "app", "/opt/device/../../etc/passwd")]);
        assert!(matches!(
            check(&m),
            Err(Error::Package(PackageError::PathTraversal { .. }))
        ));
    }

    #[test]
    fn rejects_dst_outside_permitted_roots() {
        let m = manifest(vec![module("app", "app", "/usr/lib/anything")]);
        assert!(matches!(
            check(&m),
            Err(Error::Package(PackageError::PathTraversal { .. }))
        ));
    }

    #[test]
    fn accepts_whitelisted_system_dst() {
        let m = manifest(vec![module("app", "app", "/etc/device/app.conf.d")]);
        check(&m).unwrap();
    }

    #[test]
    fn rejects_relative_dst() {
        let m = manifest(vec![module("app", "app", "opt/device/app")]);
        assert!(matches!(
            check(&m),
            Err(Error::Package(PackageError::InvalidManifest { .. }))
        ));
    }

    #[test]
    fn rejects_duplicate_module_names() {
        let m = manifest(vec![
            module("app", "app", "/opt/device/app"),
            module("app", "app", "/opt/device/app2"),
        ]);
        assert!(matches!(
            check(&m),
            Err(Error::Package(PackageError::InvalidManifest { .. }))
        ));
    }
}

//! Result path resolution.

use std::path::{Component, Path, PathBuf};

use vproc_models::OutputTarget;

use crate::error::{ServiceError, ServiceResult};

/// Sub-directory that holds every logically named result.
pub const RESULT_SUBDIR: &str = "camera";

/// Maps logical result names to files under the result directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPaths {
    root: PathBuf,
}

impl ResultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory results are written to.
    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULT_SUBDIR)
    }

    /// `<root>/camera/<name>`, creating the directory when missing.
    pub fn resolve(&self, name: &str) -> ServiceResult<PathBuf> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::invalid_request("result name is empty"));
        }

        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ServiceError::invalid_request(format!(
                "result name '{}' must stay inside the result directory",
                name
            )));
        }

        let dir = self.results_dir();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ServiceError::invalid_request(format!(
                "result directory {} is not writable: {}",
                dir.display(),
                e
            ))
        })?;

        Ok(dir.join(relative))
    }

    /// Resolve a builder output to a writable file path.
    pub fn resolve_target(&self, target: &OutputTarget) -> ServiceResult<PathBuf> {
        match target {
            OutputTarget::ResultName(name) => self.resolve(name),
            OutputTarget::Path(path) => check_output_path(path).map(|_| path.clone()),
        }
    }
}

/// An explicit output must name a file whose parent directory exists.
fn check_output_path(path: &Path) -> ServiceResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ServiceError::invalid_request("output path is empty"));
    }
    if path.is_dir() {
        return Err(ServiceError::invalid_request(format!(
            "output {} is a directory",
            path.display()
        )));
    }

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(ServiceError::invalid_request(format!(
                "output directory {} does not exist",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_under_camera_dir() {
        let root = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(root.path());

        let resolved = paths.resolve("clip.mp4").unwrap();
        assert_eq!(resolved, root.path().join("camera").join("clip.mp4"));
        assert!(root.path().join("camera").is_dir());
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let root = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(root.path());

        assert!(paths.resolve("../secret.mp4").is_err());
        assert!(paths.resolve("/etc/passwd").is_err());
        assert!(paths.resolve("  ").is_err());
    }

    #[test]
    fn test_explicit_output_checks() {
        let root = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(root.path());

        let ok = OutputTarget::Path(root.path().join("out.mp4"));
        assert_eq!(paths.resolve_target(&ok).unwrap(), root.path().join("out.mp4"));

        // Relative file in the working directory
        assert!(paths.resolve_target(&OutputTarget::from("out.mp4")).is_ok());

        let missing_parent = OutputTarget::Path(root.path().join("nope").join("out.mp4"));
        assert!(matches!(
            paths.resolve_target(&missing_parent),
            Err(ServiceError::InvalidRequest(_))
        ));

        let dir = OutputTarget::Path(root.path().to_path_buf());
        assert!(paths.resolve_target(&dir).is_err());
        assert!(paths.resolve_target(&OutputTarget::from("")).is_err());
    }
}

use crate::{config::tmp_dir, error::Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::{Builder, TempDir};
use tracing::{debug, warn};

/// Isolated working directory owned by one pipeline run.
///
/// Removed recursively when released or dropped, whichever comes first.
/// Removal failures are logged and never surface as errors.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    pub fn acquire() -> Result<Self> {
        match tmp_dir() {
            Some(base) => Self::acquire_in(base),
            None => Self::from_tempdir(Builder::new().prefix("sm_").tempdir()?),
        }
    }

    pub fn acquire_in<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref();
        fs::create_dir_all(base)?;
        Self::from_tempdir(Builder::new().prefix("sm_").tempdir_in(base)?)
    }

    fn from_tempdir(dir: TempDir) -> Result<Self> {
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "workspace created");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn release(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!(path = %self.path.display(), "workspace removed"),
                Err(e) => warn!(
                    path = %self.path.display(),
                    error = %e,
                    "workspace cleanup failed"
                ),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_removes_directory_and_contents() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire_in(base.path()).unwrap();
        let path = ws.path().to_path_buf();
        fs::create_dir_all(path.join("nested")).unwrap();
        fs::write(path.join("nested/a.wav"), b"x").unwrap();

        ws.release();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let base = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::acquire_in(base.path()).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_workspaces_are_disjoint() {
        let base = tempfile::tempdir().unwrap();
        let a = Workspace::acquire_in(base.path()).unwrap();
        let b = Workspace::acquire_in(base.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with("sm_"));
    }

    #[test]
    fn release_tolerates_already_removed_directory() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire_in(base.path()).unwrap();
        fs::remove_dir_all(ws.path()).unwrap();
        ws.release();
    }
}

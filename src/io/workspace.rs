//! Workspace and overwrite-policy context.
//!
//! The workspace scopes every relative input/output name of one analysis
//! run. Both the workspace and the overwrite policy are explicit values
//! threaded through the pipeline; `Workspace::enter` additionally swaps the
//! process working directory for the duration of a scope and is guaranteed
//! to restore the prior directory when the scope ends, even on panic.

use crate::types::{FloodError, FloodResult};
use std::path::{Path, PathBuf};

/// Whether writing over an existing output name is permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    Allow,
    Forbid,
}

/// Directory that scopes all relative input/output names of one run
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    overwrite: OverwritePolicy,
}

impl Workspace {
    /// Open a workspace rooted at an existing directory
    pub fn new(root: impl Into<PathBuf>, overwrite: OverwritePolicy) -> FloodResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FloodError::NotFound(format!(
                "workspace directory {} does not exist",
                root.display()
            )));
        }
        Ok(Self { root, overwrite })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn overwrite(&self) -> OverwritePolicy {
        self.overwrite
    }

    /// Resolve a dataset name against the workspace root.
    ///
    /// Absolute names pass through untouched.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Resolve an input name, failing if nothing exists there
    pub fn resolve_existing(&self, name: &str) -> FloodResult<PathBuf> {
        let path = self.resolve(name);
        if !path.exists() {
            return Err(FloodError::NotFound(format!(
                "{} not found in workspace {}",
                name,
                self.root.display()
            )));
        }
        Ok(path)
    }

    /// Enforce the overwrite policy for an output name and return the path
    /// it should be written to.
    ///
    /// Under [`OverwritePolicy::Forbid`] an existing output is an error.
    /// Under [`OverwritePolicy::Allow`] the prior output is destroyed here,
    /// before the caller recomputes: a failure later in the run leaves no
    /// prior output to fall back to.
    pub fn prepare_output(&self, name: &str) -> FloodResult<PathBuf> {
        let path = self.resolve(name);
        if path.exists() {
            match self.overwrite {
                OverwritePolicy::Forbid => {
                    return Err(FloodError::AlreadyExists(format!(
                        "{} (enable overwrite to replace it)",
                        path.display()
                    )));
                }
                OverwritePolicy::Allow => {
                    log::info!("Overwriting existing output {}", path.display());
                    remove_output(&path)?;
                }
            }
        }
        Ok(path)
    }

    /// Make this workspace the process working directory until the returned
    /// guard drops
    pub fn enter(&self) -> FloodResult<WorkspaceGuard> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(&self.root)?;
        log::debug!("Workspace set to {}", self.root.display());
        Ok(WorkspaceGuard { previous })
    }
}

/// Restores the prior working directory on drop
#[derive(Debug)]
pub struct WorkspaceGuard {
    previous: PathBuf,
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            log::warn!(
                "failed to restore working directory to {}: {}",
                self.previous.display(),
                e
            );
        }
    }
}

/// Delete an output dataset, including shapefile sidecar files
fn remove_output(path: &Path) -> FloodResult<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
        return Ok(());
    }
    std::fs::remove_file(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("shp") {
        for ext in ["shx", "dbf", "prj", "cpg", "qix"] {
            let sidecar = path.with_extension(ext);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_workspace_is_not_found() {
        let result = Workspace::new("/no/such/directory", OverwritePolicy::Allow);
        assert!(matches!(result, Err(FloodError::NotFound(_))));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), OverwritePolicy::Allow).unwrap();
        assert_eq!(ws.resolve("floods.shp"), dir.path().join("floods.shp"));
        assert_eq!(ws.resolve("/tmp/abs.shp"), PathBuf::from("/tmp/abs.shp"));
    }

    #[test]
    fn test_prepare_output_collision_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("floods.geojson"), b"{}").unwrap();

        let ws = Workspace::new(dir.path(), OverwritePolicy::Forbid).unwrap();
        let result = ws.prepare_output("floods.geojson");
        assert!(matches!(result, Err(FloodError::AlreadyExists(_))));

        // the prior output is untouched after the failure
        assert!(dir.path().join("floods.geojson").exists());
    }

    #[test]
    fn test_prepare_output_overwrite_destroys_prior() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("floods.shp"), b"x").unwrap();
        std::fs::write(dir.path().join("floods.dbf"), b"x").unwrap();

        let ws = Workspace::new(dir.path(), OverwritePolicy::Allow).unwrap();
        let path = ws.prepare_output("floods.shp").unwrap();
        assert_eq!(path, dir.path().join("floods.shp"));
        assert!(!dir.path().join("floods.shp").exists());
        assert!(!dir.path().join("floods.dbf").exists());
    }

    // one test so the process working directory is only touched from a
    // single test thread
    #[test]
    fn test_guard_restores_working_directory() {
        let before = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), OverwritePolicy::Allow).unwrap();

        // normal exit
        {
            let _guard = ws.enter().unwrap();
            assert_eq!(
                std::env::current_dir().unwrap().canonicalize().unwrap(),
                dir.path().canonicalize().unwrap()
            );
        }
        assert_eq!(std::env::current_dir().unwrap(), before);

        // exit by panic
        let result = std::panic::catch_unwind(|| {
            let _guard = ws.enter().unwrap();
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}

//! Per-invocation scratch directories.
//!
//! A [`Workspace`] is created for exactly one compiled invocation and
//! removed when it is dropped, on every exit path: success, build failure,
//! timeout, or an early return with `?`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SandboxError;

/// Uniquely-named directory owned by a single invocation.
#[derive(Debug)]
pub struct Workspace {
    run_id: Uuid,
    dir: PathBuf,
}

impl Workspace {
    /// Create `<root>/<uuid>` (and `root` itself if missing).
    pub fn create(root: &Path) -> Result<Self, SandboxError> {
        let run_id = Uuid::now_v7();
        let dir = root.join(run_id.to_string());

        fs::create_dir_all(&dir).map_err(|source| SandboxError::Workspace {
            path: dir.clone(),
            source,
        })?;

        debug!(workspace = %dir.display(), "workspace created");
        Ok(Self { run_id, dir })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write `contents` to `relative` inside the workspace, creating parent
    /// directories. Absolute paths and `..` are rejected.
    pub fn write_file(&self, relative: &str, contents: &str) -> Result<PathBuf, SandboxError> {
        let rel = Path::new(relative);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(SandboxError::InvalidPath(relative.to_string()));
        }

        let path = self.dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SandboxError::WriteFile {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, contents).map_err(|source| SandboxError::WriteFile {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(workspace = %self.dir.display(), "workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(workspace = %self.dir.display(), error = %e, "failed to remove workspace"),
        }
    }
}

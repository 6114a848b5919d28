use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// The directory a test server keeps all of its state in.
///
/// A temporary workspace is removed when dropped unless it was created with `keep`.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl Workspace {
    /// Create a fresh temporary workspace.
    pub fn temporary(keep: bool) -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("devpi-").tempdir()?;
        if keep {
            let path = temp.keep();
            debug!("Keeping workspace at `{}`", path.display());
            Ok(Self { path, temp: None })
        } else {
            Ok(Self {
                path: temp.path().to_path_buf(),
                temp: Some(temp),
            })
        }
    }

    /// Use an existing directory as the workspace, creating it if needed. It is never removed.
    pub fn persistent(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        fs_err::create_dir_all(&path)?;
        Ok(Self { path, temp: None })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the path of a child of the workspace, creating it as a directory.
    pub fn create_child(&self, name: &str) -> io::Result<PathBuf> {
        let child = self.path.join(name);
        fs_err::create_dir_all(&child)?;
        Ok(child)
    }

    /// Whether the workspace is removed on drop.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

//! Scoped ownership of run outputs.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Directory,
    File,
}

/// A path owned by one run and removed when the run lets go of it.
///
/// [`release`](Self::release) removes the path and reports failures as a
/// warning. If the guard is dropped without being released (an early return,
/// a cancelled future, a panic) the path is still removed in `Drop`.
#[derive(Debug)]
pub struct ScopedPath {
    path: PathBuf,
    kind: Kind,
    keep: bool,
    released: bool,
}

impl ScopedPath {
    /// Guard an output directory; `keep` preserves it past the run.
    pub fn directory(path: impl Into<PathBuf>, keep: bool) -> Self {
        Self {
            path: path.into(),
            kind: Kind::Directory,
            keep,
            released: false,
        }
    }

    /// Guard a packaged artifact. Artifacts are always removed.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: Kind::File,
            keep: false,
            released: false,
        }
    }

    /// Guarded path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the path survives the run.
    pub fn is_kept(&self) -> bool {
        self.keep
    }

    /// Remove the path unless kept. Returns a warning when removal fails.
    pub fn release(mut self) -> Option<String> {
        self.cleanup()
    }

    fn cleanup(&mut self) -> Option<String> {
        if self.released {
            return None;
        }
        self.released = true;

        if self.keep {
            tracing::debug!(path = %self.path.display(), "Keeping collection directory");
            return None;
        }

        let result = match self.kind {
            Kind::Directory => std::fs::remove_dir_all(&self.path),
            Kind::File => std::fs::remove_file(&self.path),
        };
        match result {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Wiped run output");
                None
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Didn't wipe run output");
                Some(format!("cannot remove '{}': {}", self.path.display(), e))
            }
        }
    }
}

impl Drop for ScopedPath {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

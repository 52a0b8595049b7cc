//! Filesystem mutations for a sync run.
//!
//! Every write the engine performs goes through [`Workspace`], which logs it
//! and turns it into a no-op under `--dry-run`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::formatting::render_skill;
use crate::skill::{Frontmatter, Platform, CANONICAL_SKILLS_DIR};

#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub dry_run: bool,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    pub fn canonical_dir(&self) -> PathBuf {
        self.root.join(CANONICAL_SKILLS_DIR)
    }

    pub fn platform_dir(&self, platform: &Platform) -> PathBuf {
        self.root.join(&platform.skills_dir)
    }

    /// Convert a path to a display-friendly relative path.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|rel| rel.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }

    /// Render and write a SKILL.md. Returns whether the content changed.
    pub fn write_skill(&self, path: &Path, frontmatter: &Frontmatter, body: &str) -> Result<bool> {
        let content = render_skill(frontmatter, body).map_err(|source| SyncError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_file(path, content.as_bytes())
    }

    /// Write bytes, creating parent directories. Unchanged content is left alone.
    pub fn write_file(&self, path: &Path, content: &[u8]) -> Result<bool> {
        if fs::read(path).is_ok_and(|existing| existing == content) {
            debug!(path = %self.display_path(path), "unchanged");
            return Ok(false);
        }
        if self.dry_run {
            info!(path = %self.display_path(path), "would write");
            return Ok(true);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| SyncError::io(parent, err))?;
        }
        fs::write(path, content).map_err(|err| SyncError::io(path, err))?;
        info!(path = %self.display_path(path), "wrote");
        Ok(true)
    }

    pub fn copy_file(&self, from: &Path, to: &Path) -> Result<bool> {
        let content = fs::read(from).map_err(|err| SyncError::io(from, err))?;
        self.write_file(to, &content)
    }

    pub fn create_dir(&self, path: &Path) -> Result<()> {
        if self.dry_run {
            info!(path = %self.display_path(path), "would create directory");
            return Ok(());
        }
        fs::create_dir_all(path).map_err(|err| SyncError::io(path, err))
    }

    /// Best-effort removal of a consolidated file and any directories it
    /// leaves empty, up to (not including) `stop_at`.
    pub fn remove_file(&self, path: &Path, stop_at: &Path) {
        if self.dry_run {
            info!(path = %self.display_path(path), "would remove");
            return;
        }
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %self.display_path(path), error = %err, "failed to remove file");
            return;
        }
        info!(path = %self.display_path(path), "removed");
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, stop_at);
        }
    }

    /// Remove `dir` and its ancestors while they are empty, stopping at `stop_at`.
    pub fn prune_empty_dirs(&self, dir: &Path, stop_at: &Path) {
        if self.dry_run {
            return;
        }
        let mut current = Some(dir);
        while let Some(dir) = current {
            if dir == stop_at || !dir.starts_with(stop_at) {
                break;
            }
            let is_empty = fs::read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                break;
            }
            if let Err(err) = fs::remove_dir(dir) {
                warn!(path = %self.display_path(dir), error = %err, "failed to prune directory");
                break;
            }
            debug!(path = %self.display_path(dir), "pruned empty directory");
            current = dir.parent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dry_run_touches_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let workspace = Workspace::new(dir.path(), true);
        let path = dir.path().join("a").join("SKILL.md");
        assert!(workspace.write_file(&path, b"x").expect("write"));
        assert!(!path.exists());
    }

    #[test]
    fn write_reports_unchanged_content() {
        let dir = TempDir::new().expect("temp dir");
        let workspace = Workspace::new(dir.path(), false);
        let path = dir.path().join("a").join("SKILL.md");
        assert!(workspace.write_file(&path, b"x").expect("write"));
        assert!(!workspace.write_file(&path, b"x").expect("write"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "x");
    }

    #[test]
    fn remove_prunes_empty_directories() {
        let dir = TempDir::new().expect("temp dir");
        let skill_dir = dir.path().join("skill");
        let nested = skill_dir.join("scripts").join("deep");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("run.sh"), "echo").expect("write");
        fs::write(skill_dir.join("SKILL.md"), "x").expect("write");

        let workspace = Workspace::new(dir.path(), false);
        workspace.remove_file(&nested.join("run.sh"), &skill_dir);

        assert!(!skill_dir.join("scripts").exists());
        assert!(skill_dir.join("SKILL.md").exists());
    }
}

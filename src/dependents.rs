//! Consolidation of dependent files (scripts, docs, assets) into canonical storage.
//!
//! Platform copies of a consolidated path are deleted once the canonical copy
//! is written and its hash verified; the platform directory keeps only the
//! reference. Skipped paths stay where they are.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::discovery::{dependent_files, DependentFile};
use crate::error::Result;
use crate::hash::{hash_bytes, hash_matches};
use crate::resolve::{ResolutionAction, ResolutionOption};
use crate::workspace::Workspace;

/// Conflicting versions of one dependent file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentConflict {
    pub skill_name: String,
    pub rel_path: String,
    pub canonical_hash: Option<String>,
    /// Hash recorded in canonical's `metadata.sync.files`.
    pub stored_hash: Option<String>,
    /// One entry per distinct platform version: `(platform, hash)`.
    pub candidates: Vec<(String, String)>,
}

impl DependentConflict {
    pub fn options(&self) -> Vec<ResolutionOption> {
        let mut options = Vec::new();
        if self.canonical_hash.is_some() {
            options.push(ResolutionOption::new(
                ResolutionAction::UseCommon,
                "Keep canonical copy",
            ));
        }
        for (platform, _) in &self.candidates {
            options.push(ResolutionOption::new(
                ResolutionAction::UsePlatform(platform.clone()),
                format!("Use {platform} copy"),
            ));
        }
        options.push(ResolutionOption::skip());
        options.push(ResolutionOption::abort());
        options
    }

    pub fn describe(&self) -> String {
        let mut text = format!(
            "Dependent file '{}' of skill '{}' has conflicting versions:",
            self.rel_path, self.skill_name
        );
        if let Some(hash) = &self.canonical_hash {
            text.push_str(&format!("\n  canonical: {hash}"));
            if self.stored_hash.as_ref().is_some_and(|stored| stored != hash) {
                text.push_str(" (edited since last sync)");
            }
        }
        for (platform, hash) in &self.candidates {
            text.push_str(&format!("\n  {platform}: {hash}"));
        }
        text
    }
}

/// Where the accepted version of a path comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Canonical { hash: String },
    Platform { platform: String, path: PathBuf, hash: String },
}

impl Source {
    fn hash(&self) -> &str {
        match self {
            Self::Canonical { hash } | Self::Platform { hash, .. } => hash,
        }
    }
}

/// What consolidation will do for one skill.
#[derive(Debug, Clone)]
pub struct ConsolidationPlan {
    pub skill_name: String,
    pub canonical_dir: PathBuf,
    pub accepted: BTreeMap<String, Source>,
    pub conflicts: Vec<DependentConflict>,
    pub skipped: BTreeSet<String>,
    stored: BTreeMap<String, String>,
    platform_files: BTreeMap<String, Vec<DependentFile>>,
}

/// Decide, per relative path, which version goes into canonical.
///
/// `platform_files` maps platform name to that platform's dependent files for
/// the skill; `stored` is canonical's recorded `metadata.sync.files`.
pub fn plan(
    skill_name: &str,
    platform_files: BTreeMap<String, Vec<DependentFile>>,
    canonical_dir: &Path,
    stored: &BTreeMap<String, String>,
) -> ConsolidationPlan {
    let canonical_files: BTreeMap<String, DependentFile> = dependent_files(canonical_dir)
        .into_iter()
        .map(|file| (file.rel_path.clone(), file))
        .collect();

    let paths: BTreeSet<&String> = platform_files
        .values()
        .flatten()
        .map(|file| &file.rel_path)
        .chain(canonical_files.keys())
        .collect();

    let mut accepted = BTreeMap::new();
    let mut conflicts = Vec::new();

    for rel_path in paths {
        let copies: Vec<(&String, &DependentFile)> = platform_files
            .iter()
            .filter_map(|(platform, files)| {
                files
                    .iter()
                    .find(|file| &file.rel_path == rel_path)
                    .map(|file| (platform, file))
            })
            .collect();
        let canonical = canonical_files.get(rel_path);

        let mut candidates: Vec<(String, String)> = Vec::new();
        for (platform, file) in &copies {
            let agrees_with_canonical =
                canonical.is_some_and(|c| hash_matches(&c.hash, &file.hash));
            if !agrees_with_canonical && !candidates.iter().any(|(_, hash)| hash == &file.hash) {
                candidates.push(((*platform).clone(), file.hash.clone()));
            }
        }

        match (canonical, candidates.len()) {
            (Some(file), 0) => {
                accepted.insert(rel_path.clone(), Source::Canonical { hash: file.hash.clone() });
            }
            (None, 1) => {
                let (platform, file) = copies[0];
                accepted.insert(
                    rel_path.clone(),
                    Source::Platform {
                        platform: platform.clone(),
                        path: file.abs_path.clone(),
                        hash: file.hash.clone(),
                    },
                );
            }
            (canonical, _) => {
                debug!(skill = skill_name, path = %rel_path, "dependent file conflict");
                conflicts.push(DependentConflict {
                    skill_name: skill_name.to_string(),
                    rel_path: rel_path.clone(),
                    canonical_hash: canonical.map(|file| file.hash.clone()),
                    stored_hash: stored.get(rel_path).cloned(),
                    candidates,
                });
            }
        }
    }

    ConsolidationPlan {
        skill_name: skill_name.to_string(),
        canonical_dir: canonical_dir.to_path_buf(),
        accepted,
        conflicts,
        skipped: BTreeSet::new(),
        stored: stored.clone(),
        platform_files,
    }
}

impl ConsolidationPlan {
    /// Record the decision for one conflict.
    pub fn resolve(&mut self, conflict: &DependentConflict, action: &ResolutionAction) {
        let rel_path = conflict.rel_path.clone();
        match action {
            ResolutionAction::UseCommon => {
                if let Some(hash) = &conflict.canonical_hash {
                    self.accepted
                        .insert(rel_path, Source::Canonical { hash: hash.clone() });
                }
            }
            ResolutionAction::UsePlatform(platform) => {
                let file = self
                    .platform_files
                    .get(platform)
                    .and_then(|files| files.iter().find(|file| file.rel_path == rel_path));
                if let Some(file) = file {
                    self.accepted.insert(
                        rel_path,
                        Source::Platform {
                            platform: platform.clone(),
                            path: file.abs_path.clone(),
                            hash: file.hash.clone(),
                        },
                    );
                }
            }
            ResolutionAction::Skip
            | ResolutionAction::Abort
            | ResolutionAction::UseA
            | ResolutionAction::UseB => {
                self.skipped.insert(rel_path);
            }
        }
    }

    /// Write accepted versions into canonical, prune consolidated platform
    /// copies and return the file hashes to record in `metadata.sync.files`.
    ///
    /// `platform_dirs` maps platform name to the skill directory on that platform.
    pub fn apply(
        &self,
        workspace: &Workspace,
        platform_dirs: &BTreeMap<String, PathBuf>,
    ) -> Result<BTreeMap<String, String>> {
        let mut fingerprints = BTreeMap::new();

        for (rel_path, source) in &self.accepted {
            let target = self.canonical_dir.join(rel_path);
            if let Source::Platform { path, .. } = source {
                workspace.copy_file(path, &target)?;
            }
            fingerprints.insert(rel_path.clone(), source.hash().to_string());

            if !workspace.dry_run && !verify(&target, source.hash()) {
                warn!(
                    path = %workspace.display_path(&target),
                    "canonical copy failed verification; keeping platform copies"
                );
                continue;
            }
            for (platform, files) in &self.platform_files {
                let Some(file) = files.iter().find(|file| &file.rel_path == rel_path) else {
                    continue;
                };
                let Some(skill_dir) = platform_dirs.get(platform) else {
                    continue;
                };
                workspace.remove_file(&file.abs_path, skill_dir);
            }
        }

        for rel_path in &self.skipped {
            if let Some(hash) = self.stored.get(rel_path) {
                fingerprints.insert(rel_path.clone(), hash.clone());
            }
        }

        Ok(fingerprints)
    }
}

fn verify(path: &Path, expected: &str) -> bool {
    match fs::read(path) {
        Ok(bytes) => hash_matches(&hash_bytes(&bytes), expected),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to verify canonical copy");
            false
        }
    }
}

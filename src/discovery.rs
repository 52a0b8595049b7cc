//! Skill discovery.
//!
//! This module walks each platform's skills directory and the canonical store,
//! producing the inventory every sync phase works from. The inventory is
//! re-derived after each mutating phase rather than patched in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::formatting::parse_frontmatter;
use crate::hash::hash_bytes;
use crate::skill::{
    Platform, SkillOccurrence, CANONICAL_PLATFORM, CANONICAL_SKILLS_DIR, SKILL_FILE,
};

/// Every occurrence found in one scan.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub platforms: BTreeMap<String, Vec<SkillOccurrence>>,
    pub canonical: Vec<SkillOccurrence>,
}

impl Inventory {
    pub fn platform(&self, name: &str) -> &[SkillOccurrence] {
        self.platforms.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn canonical_for(&self, key: &str) -> Option<&SkillOccurrence> {
        self.canonical.iter().find(|occ| occ.key() == key)
    }

    /// Platform occurrences of one skill, in `order`.
    pub fn occurrences_of<'a>(&'a self, key: &str, order: &[Platform]) -> Vec<&'a SkillOccurrence> {
        order
            .iter()
            .flat_map(|platform| self.platform(&platform.name))
            .filter(|occ| occ.key() == key)
            .collect()
    }

    /// Keys of every skill seen anywhere.
    pub fn skill_keys(&self) -> BTreeSet<String> {
        self.platforms
            .values()
            .flatten()
            .chain(self.canonical.iter())
            .map(SkillOccurrence::key)
            .collect()
    }
}

/// A non-definition file stored alongside a skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentFile {
    /// `/`-separated path relative to the skill directory.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
}

/// Scan every platform and the canonical store under `root`.
pub fn scan(root: &Path, platforms: &[Platform]) -> Inventory {
    let mut inventory = Inventory::default();
    for platform in platforms {
        let dir = root.join(&platform.skills_dir);
        let found = scan_dir(&dir, &platform.name);
        debug!(platform = %platform.name, count = found.len(), "scanned platform");
        inventory.platforms.insert(platform.name.clone(), found);
    }
    inventory.canonical = scan_dir(&root.join(CANONICAL_SKILLS_DIR), CANONICAL_PLATFORM);
    debug!(count = inventory.canonical.len(), "scanned canonical store");
    inventory
}

/// Discover skill occurrences under one skills directory.
///
/// A missing directory yields no occurrences. Files that fail to parse are
/// logged and skipped.
pub fn scan_dir(dir: &Path, platform: &str) -> Vec<SkillOccurrence> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut map: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(2).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if file_name == SKILL_FILE {
            let path = entry.into_path();
            map.insert(path.parent().unwrap_or(dir).to_path_buf(), path);
        } else if file_name == "skill.md" {
            let path = entry.into_path();
            map.entry(path.parent().unwrap_or(dir).to_path_buf())
                .or_insert(path);
        }
    }

    map.into_iter()
        .filter_map(|(skill_dir, file)| load_occurrence(platform, &skill_dir, file))
        .collect()
}

fn load_occurrence(platform: &str, skill_dir: &Path, file: PathBuf) -> Option<SkillOccurrence> {
    let content = match fs::read_to_string(&file) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %file.display(), error = %err, "failed to read skill");
            return None;
        }
    };
    let (frontmatter, body) = match parse_frontmatter(&content) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(path = %file.display(), error = %err, "skipping unparseable skill");
            return None;
        }
    };
    let skill_name = get_dir_name(skill_dir);
    Some(SkillOccurrence::new(platform, &skill_name, file, frontmatter, body))
}

/// List the dependent files of a skill directory, sorted by relative path.
///
/// Nested directories that hold their own SKILL.md are separate skills and
/// are not descended into. Files that cannot be read are logged and skipped.
pub fn dependent_files(skill_dir: &Path) -> Vec<DependentFile> {
    if !skill_dir.is_dir() {
        return Vec::new();
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(skill_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir() && entry.path().join(SKILL_FILE).exists())
        });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(skill_dir) else {
            continue;
        };
        let rel_path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if rel_path.eq_ignore_ascii_case(SKILL_FILE) {
            continue;
        }
        match fs::read(entry.path()) {
            Ok(bytes) => files.push(DependentFile {
                rel_path,
                abs_path: entry.path().to_path_buf(),
                hash: hash_bytes(&bytes),
            }),
            Err(err) => {
                warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "failed to hash dependent file"
                );
            }
        }
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

/// Extract the directory name from a path.
pub fn get_dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    #[test]
    fn scan_tolerates_missing_platform_dir() {
        let dir = TempDir::new().expect("temp dir");
        let platforms = vec![Platform::new("claude", ".claude/skills")];
        let inventory = scan(dir.path(), &platforms);
        assert!(inventory.platform("claude").is_empty());
        assert!(inventory.canonical.is_empty());
    }

    #[test]
    fn scan_finds_platform_and_canonical_skills() {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path();
        write(&root.join(".claude/skills/alpha/SKILL.md"), "# Alpha\n");
        write(&root.join(".claude/skills/alpha/docs/notes.md"), "notes\n");
        write(&root.join(".claude/skills/group/beta/SKILL.md"), "---\nname: beta\n---\nBeta\n");
        write(
            &root.join(".agents-common/skills/alpha/SKILL.md"),
            "---\nname: alpha\n---\n# Alpha\n",
        );

        let platforms = vec![Platform::new("claude", ".claude/skills")];
        let inventory = scan(root, &platforms);

        let names: Vec<_> = inventory
            .platform("claude")
            .iter()
            .map(|occ| occ.skill_name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(inventory.canonical.len(), 1);
        assert!(inventory.canonical[0].is_canonical());
        assert!(inventory.canonical_for("alpha").is_some());
    }

    #[test]
    fn scan_skips_unparseable_skills() {
        let dir = TempDir::new().expect("temp dir");
        write(&dir.path().join("skills/bad/SKILL.md"), "---\nname: [oops\n---\n");
        write(&dir.path().join("skills/good/SKILL.md"), "Body\n");
        let found = scan_dir(&dir.path().join("skills"), "claude");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].skill_name, "good");
    }

    #[test]
    fn dependent_files_excludes_definition_and_nested_skills() {
        let dir = TempDir::new().expect("temp dir");
        let skill = dir.path().join("alpha");
        write(&skill.join("SKILL.md"), "Body\n");
        write(&skill.join("util.txt"), "a");
        write(&skill.join("scripts/run.sh"), "echo");
        write(&skill.join("nested/SKILL.md"), "Other\n");
        write(&skill.join("nested/inner.txt"), "x");

        let files = dependent_files(&skill);
        let paths: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["scripts/run.sh", "util.txt"]);
        assert_eq!(files[1].hash, hash_bytes(b"a"));
    }
}

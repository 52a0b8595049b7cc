//! Core skill types and constants.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use unicode_normalization::UnicodeNormalization;

/// File name of a skill definition.
pub const SKILL_FILE: &str = "SKILL.md";

/// Reserved platform tag for the canonical store.
pub const CANONICAL_PLATFORM: &str = "common";

/// Canonical skills directory, relative to the project root.
pub const CANONICAL_SKILLS_DIR: &str = ".agents-common/skills";

/// Current schema version of `metadata.sync`.
pub const SYNC_VERSION: u64 = 2;

/// Frontmatter fields that make up a skill's synchronized identity.
pub const CORE_FIELDS: [&str; 6] = [
    "name",
    "description",
    "license",
    "compatibility",
    "metadata",
    "allowed-tools",
];

/// Order in which fields are written in formatted output.
pub const FIELD_ORDER: [&str; 6] = [
    "name",
    "description",
    "license",
    "compatibility",
    "allowed-tools",
    "metadata",
];

pub type Frontmatter = BTreeMap<String, Value>;

/// A participating assistant directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub name: String,
    /// Skills directory relative to the project root.
    pub skills_dir: PathBuf,
}

impl Platform {
    pub fn new(name: impl Into<String>, skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            skills_dir: skills_dir.into(),
        }
    }

    /// The assistant's own root, e.g. `.claude` for `.claude/skills`.
    pub fn config_root(&self) -> &Path {
        self.skills_dir
            .components()
            .next()
            .map(|c| Path::new(c.as_os_str()))
            .unwrap_or(&self.skills_dir)
    }
}

/// Platforms known out of the box.
pub fn builtin_platforms() -> Vec<Platform> {
    vec![
        Platform::new("claude", ".claude/skills"),
        Platform::new("codex", ".codex/skills"),
        Platform::new("cursor", ".cursor/skills"),
        Platform::new("gemini", ".gemini/skills"),
        Platform::new("copilot", ".github/skills"),
    ]
}

/// A concrete SKILL.md on one platform or in the canonical store.
#[derive(Debug, Clone)]
pub struct SkillOccurrence {
    pub platform: String,
    pub skill_name: String,
    /// Path to the SKILL.md file itself.
    pub path: PathBuf,
    pub frontmatter: Frontmatter,
    pub body: String,
    pub is_reference: bool,
}

impl SkillOccurrence {
    pub fn new(
        platform: &str,
        skill_name: &str,
        path: PathBuf,
        frontmatter: Frontmatter,
        body: String,
    ) -> Self {
        let is_reference = reference_target(&body).is_some();
        Self {
            platform: platform.to_string(),
            skill_name: skill_name.to_string(),
            path,
            frontmatter,
            body,
            is_reference,
        }
    }

    /// Directory holding the SKILL.md and its dependent files.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    pub fn is_canonical(&self) -> bool {
        self.platform == CANONICAL_PLATFORM
    }

    /// Target of the reference body, if this is a reference.
    pub fn reference_target(&self) -> Option<&str> {
        reference_target(&self.body)
    }

    /// Name used to match occurrences of the same skill.
    pub fn key(&self) -> String {
        skill_key(&self.skill_name)
    }
}

/// Normalize a skill directory name so NFC and NFD spellings match.
pub fn skill_key(name: &str) -> String {
    name.trim().nfkc().collect()
}

/// Path of a skill's canonical directory, relative to the project root.
pub fn canonical_rel_dir(skill_name: &str) -> String {
    format!("{CANONICAL_SKILLS_DIR}/{skill_name}")
}

/// The body written into a platform reference.
pub fn reference_string(skill_name: &str) -> String {
    format!("@{}/{SKILL_FILE}", canonical_rel_dir(skill_name))
}

/// Return the referenced path when `body` is solely an `@path` pointer.
pub fn reference_target(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    let target = trimmed.strip_prefix('@')?;
    if target.is_empty() || target.chars().any(char::is_whitespace) {
        return None;
    }
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reference_detection() {
        assert_eq!(
            reference_target("@.agents-common/skills/a/SKILL.md\n"),
            Some(".agents-common/skills/a/SKILL.md")
        );
        assert_eq!(reference_target("  @x/SKILL.md  "), Some("x/SKILL.md"));
        assert_eq!(reference_target("# Title\n@x/SKILL.md"), None);
        assert_eq!(reference_target("@two words"), None);
        assert_eq!(reference_target("@"), None);
    }

    #[test]
    fn reference_string_points_at_canonical() {
        assert_eq!(reference_string("alpha"), "@.agents-common/skills/alpha/SKILL.md");
    }

    #[test]
    fn skill_key_merges_normalization_forms() {
        assert_eq!(skill_key("caf\u{00e9}"), skill_key("cafe\u{0301}"));
    }

    #[test]
    fn config_root_is_first_component() {
        let platform = Platform::new("claude", ".claude/skills");
        assert_eq!(platform.config_root(), Path::new(".claude"));
    }
}

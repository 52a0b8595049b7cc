//! Promotion of platform-local skills into the canonical store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use crate::error::Result;
use crate::metadata::{canonical_json, core_frontmatter};
use crate::resolve::{current_hash, stamp_as_reference, write_canonical};
use crate::skill::{SkillOccurrence, CANONICAL_PLATFORM, SKILL_FILE};
use crate::workspace::Workspace;

/// Promote a literal platform occurrence into canonical and turn it into a reference.
///
/// Returns `None` when the occurrence already is a reference. Canonical is
/// written first; the platform reference is the last write, so an
/// interruption never leaves a reference without its target.
pub fn promote(workspace: &Workspace, occurrence: &SkillOccurrence) -> Result<Option<PathBuf>> {
    if occurrence.is_reference {
        return Ok(None);
    }

    let canonical_path = workspace
        .canonical_dir()
        .join(&occurrence.skill_name)
        .join(SKILL_FILE);
    let core = core_frontmatter(&occurrence.frontmatter);
    let canonical = SkillOccurrence::new(
        CANONICAL_PLATFORM,
        &occurrence.skill_name,
        canonical_path.clone(),
        core.clone(),
        occurrence.body.clone(),
    );

    let hash = write_canonical(workspace, &canonical, &core, &occurrence.body, &BTreeMap::new())?;
    stamp_as_reference(workspace, occurrence, &occurrence.skill_name, &core, &hash)?;

    info!(
        skill = %occurrence.skill_name,
        platform = %occurrence.platform,
        canonical = %workspace.display_path(&canonical_path),
        "promoted skill"
    );
    Ok(Some(canonical_path))
}

/// Whether a literal occurrence already says exactly what canonical says.
pub fn matches_canonical(occurrence: &SkillOccurrence, canonical: &SkillOccurrence) -> bool {
    !occurrence.is_reference
        && occurrence.body == canonical.body
        && canonical_json(&core_frontmatter(&occurrence.frontmatter))
            == canonical_json(&core_frontmatter(&canonical.frontmatter))
}

/// Turn a literal occurrence identical to canonical into a reference.
///
/// Returns `false` (and writes nothing) when the contents differ; those are
/// left for out-of-sync resolution.
pub fn link_to_canonical(
    workspace: &Workspace,
    occurrence: &SkillOccurrence,
    canonical: &SkillOccurrence,
) -> Result<bool> {
    if !matches_canonical(occurrence, canonical) {
        return Ok(false);
    }
    stamp_as_reference(
        workspace,
        occurrence,
        &canonical.skill_name,
        &core_frontmatter(&canonical.frontmatter),
        &current_hash(canonical),
    )?;
    info!(skill = %occurrence.skill_name, platform = %occurrence.platform, "linked to canonical");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::scan;
    use crate::metadata::{stored_hash, SyncMetadata};
    use crate::skill::{reference_string, Platform};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn setup(content: &str) -> (TempDir, Vec<Platform>) {
        let dir = TempDir::new().expect("temp dir");
        let skill_dir = dir.path().join(".claude/skills/alpha");
        fs::create_dir_all(&skill_dir).expect("mkdir");
        fs::write(skill_dir.join("SKILL.md"), content).expect("write");
        (dir, vec![Platform::new("claude", ".claude/skills")])
    }

    #[test]
    fn promote_writes_canonical_and_reference() {
        let (dir, platforms) =
            setup("---\nname: alpha\nmodel: opus\ndescription: A\n---\n# Alpha\n");
        let workspace = Workspace::new(dir.path(), false);
        let inventory = scan(dir.path(), &platforms);
        let occurrence = &inventory.platform("claude")[0];

        let path = promote(&workspace, occurrence).expect("promote").expect("promoted");
        assert!(path.ends_with(".agents-common/skills/alpha/SKILL.md"));

        let inventory = scan(dir.path(), &platforms);
        let canonical = inventory.canonical_for("alpha").expect("canonical");
        let platform = &inventory.platform("claude")[0];

        assert_eq!(canonical.body, "# Alpha");
        assert!(!canonical.frontmatter.contains_key("model"));
        let sync = SyncMetadata::read(&canonical.frontmatter);
        assert_eq!(sync.version, Some(2));
        assert!(sync.files.is_empty());

        assert!(platform.is_reference);
        assert_eq!(platform.body, reference_string("alpha"));
        assert!(platform.frontmatter.contains_key("model"));
        assert_eq!(stored_hash(&platform.frontmatter), sync.hash);
        assert_eq!(sync.hash.as_deref(), Some(current_hash(canonical).as_str()));
    }

    #[test]
    fn promote_skips_references() {
        let (dir, platforms) = setup("@.agents-common/skills/alpha/SKILL.md\n");
        let workspace = Workspace::new(dir.path(), false);
        let inventory = scan(dir.path(), &platforms);
        assert_eq!(promote(&workspace, &inventory.platform("claude")[0]).expect("promote"), None);
        assert!(!workspace.canonical_dir().exists());
    }

    #[test]
    fn link_requires_identical_content() {
        let (dir, platforms) = setup("# Alpha\n");
        let workspace = Workspace::new(dir.path(), false);
        let inventory = scan(dir.path(), &platforms);
        promote(&workspace, &inventory.platform("claude")[0]).expect("promote");

        let other = dir.path().join(".codex/skills/alpha");
        fs::create_dir_all(&other).expect("mkdir");
        fs::write(other.join("SKILL.md"), "# Alpha\n").expect("write");
        let platforms = vec![
            Platform::new("claude", ".claude/skills"),
            Platform::new("codex", ".codex/skills"),
        ];
        let inventory = scan(dir.path(), &platforms);
        let canonical = inventory.canonical_for("alpha").expect("canonical");
        let codex = &inventory.platform("codex")[0];
        assert!(link_to_canonical(&workspace, codex, canonical).expect("link"));

        let inventory = scan(dir.path(), &platforms);
        assert!(inventory.platform("codex")[0].is_reference);
    }
}

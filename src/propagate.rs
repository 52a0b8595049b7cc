//! Fan canonical content out to platform references.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::metadata::core_frontmatter;
use crate::resolve::{restamp_canonical, stamp_as_reference, Resolver};
use crate::skill::{Frontmatter, Platform, SkillOccurrence, SKILL_FILE};
use crate::workspace::Workspace;

/// Restamp `canonical` and bring every reference among `occurrences` up to date.
///
/// Literal occurrences are left alone. Returns the number of references rewritten.
pub fn propagate(
    workspace: &Workspace,
    canonical: &SkillOccurrence,
    occurrences: &[&SkillOccurrence],
) -> Result<usize> {
    let hash = restamp_canonical(workspace, canonical)?;
    let core = core_frontmatter(&canonical.frontmatter);

    let mut updated = 0;
    for occurrence in occurrences.iter().filter(|occ| occ.is_reference) {
        if stamp_as_reference(workspace, occurrence, &canonical.skill_name, &core, &hash)? {
            info!(
                skill = %canonical.skill_name,
                platform = %occurrence.platform,
                "updated reference"
            );
            updated += 1;
        }
    }
    Ok(updated)
}

/// Creates missing references for canonical skills.
///
/// A platform whose skills directory already exists gets its reference
/// without asking. Creating the directory is confirmed once per platform.
pub struct ReferenceCreator<'a> {
    workspace: &'a Workspace,
    approved: BTreeMap<String, bool>,
}

impl<'a> ReferenceCreator<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self {
            workspace,
            approved: BTreeMap::new(),
        }
    }

    /// Create a reference to `canonical` on `platform`. Returns whether one was written.
    pub fn ensure(
        &mut self,
        resolver: &mut Resolver,
        platform: &Platform,
        canonical: &SkillOccurrence,
        hash: &str,
    ) -> Result<bool> {
        let skills_dir = self.workspace.platform_dir(platform);
        if !self.allowed(resolver, platform, &skills_dir)? {
            return Ok(false);
        }

        let path = skills_dir.join(&canonical.skill_name).join(SKILL_FILE);
        let placeholder = SkillOccurrence::new(
            &platform.name,
            &canonical.skill_name,
            path,
            Frontmatter::new(),
            String::new(),
        );
        let written = stamp_as_reference(
            self.workspace,
            &placeholder,
            &canonical.skill_name,
            &core_frontmatter(&canonical.frontmatter),
            hash,
        )?;
        if written {
            info!(skill = %canonical.skill_name, platform = %platform.name, "created reference");
        }
        Ok(written)
    }

    fn allowed(
        &mut self,
        resolver: &mut Resolver,
        platform: &Platform,
        skills_dir: &Path,
    ) -> Result<bool> {
        if skills_dir.is_dir() {
            return Ok(true);
        }
        if let Some(answer) = self.approved.get(&platform.name) {
            return Ok(*answer);
        }
        let answer = resolver.confirm(
            &format!(
                "Create {} for platform {}?",
                self.workspace.display_path(skills_dir),
                platform.name
            ),
            false,
        )?;
        if answer {
            self.workspace.create_dir(skills_dir)?;
        }
        self.approved.insert(platform.name.clone(), answer);
        Ok(answer)
    }
}

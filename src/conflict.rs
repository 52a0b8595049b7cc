//! Pairwise conflicts between two platforms' copies of a skill.
//!
//! Occurrences are compared on their normalized form: core frontmatter with
//! the tool-owned sync block removed and keys sorted, plus the body. Key order
//! and sync metadata therefore never produce a conflict.

use std::collections::BTreeMap;

use similar::TextDiff;
use tracing::{info, warn};

use crate::error::Result;
use crate::formatting::render_skill;
use crate::hash::{fingerprint, hash_matches};
use crate::metadata::{
    compose_frontmatter, core_frontmatter, platform_fields, stored_hash, SyncMetadata,
};
use crate::resolve::{current_hash, stamp_as_reference, ResolutionAction, ResolutionOption};
use crate::skill::{Frontmatter, SkillOccurrence};
use crate::workspace::Workspace;

/// Lines of diff kept for display.
pub const DIFF_LINE_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides reference the same canonical skill; only metadata differs.
    Frontmatter,
    /// Bodies (or reference targets) differ.
    Content,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub skill_name: String,
    pub kind: ConflictKind,
    pub a: SkillOccurrence,
    pub b: SkillOccurrence,
    pub a_fingerprint: String,
    pub b_fingerprint: String,
    /// Whether A's recorded hash lags canonical. Only set when both sides are references.
    pub a_stale: Option<bool>,
    pub b_stale: Option<bool>,
    pub diff: String,
}

impl Conflict {
    /// Legal resolutions. A stale side is never offered as the replacement
    /// for a current one.
    pub fn options(&self, has_canonical: bool) -> Vec<ResolutionOption> {
        let a_stale_only = self.a_stale == Some(true) && self.b_stale == Some(false);
        let b_stale_only = self.b_stale == Some(true) && self.a_stale == Some(false);

        let mut options = Vec::new();
        if !a_stale_only {
            options.push(ResolutionOption::new(
                ResolutionAction::UseA,
                format!("Use {} version (overwrite {})", self.a.platform, self.b.platform),
            ));
        }
        if !b_stale_only {
            options.push(ResolutionOption::new(
                ResolutionAction::UseB,
                format!("Use {} version (overwrite {})", self.b.platform, self.a.platform),
            ));
        }
        if has_canonical {
            options.push(ResolutionOption::new(
                ResolutionAction::UseCommon,
                "Use canonical version for every platform",
            ));
        }
        options.push(ResolutionOption::skip());
        options.push(ResolutionOption::abort());
        options
    }

    pub fn describe(&self) -> String {
        let kind = match self.kind {
            ConflictKind::Frontmatter => "frontmatter",
            ConflictKind::Content => "content",
        };
        format!(
            "Skill '{}' differs between {} and {} ({kind}):\n{}",
            self.skill_name, self.a.platform, self.b.platform, self.diff
        )
    }
}

/// Fingerprint of the normalized form used for comparison.
pub fn comparison_fingerprint(occurrence: &SkillOccurrence) -> String {
    fingerprint(
        &core_frontmatter(&occurrence.frontmatter),
        &occurrence.body,
        &BTreeMap::new(),
    )
}

/// Compare same-named skills across two platforms.
pub fn detect_conflicts(
    a: &[SkillOccurrence],
    b: &[SkillOccurrence],
    canonical: &[SkillOccurrence],
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for occ_a in a {
        let key = occ_a.key();
        let Some(occ_b) = b.iter().find(|occ| occ.key() == key) else {
            continue;
        };

        let both_references = occ_a.is_reference && occ_b.is_reference;
        let same_target =
            both_references && occ_a.reference_target() == occ_b.reference_target();
        let current = canonical
            .iter()
            .find(|occ| occ.key() == key)
            .map(current_hash);
        // With canonical present, literal copies and wrong targets are
        // measured against canonical by the out-of-sync detector.
        if current.is_some() && !same_target {
            continue;
        }

        let a_fingerprint = comparison_fingerprint(occ_a);
        let b_fingerprint = comparison_fingerprint(occ_b);
        if hash_matches(&a_fingerprint, &b_fingerprint) {
            continue;
        }

        let kind = if same_target {
            ConflictKind::Frontmatter
        } else {
            ConflictKind::Content
        };

        let (a_stale, b_stale) = match (&current, both_references) {
            (Some(current), true) => (
                Some(is_stale(occ_a, current)),
                Some(is_stale(occ_b, current)),
            ),
            _ => (None, None),
        };

        conflicts.push(Conflict {
            skill_name: occ_a.skill_name.clone(),
            kind,
            a: occ_a.clone(),
            b: occ_b.clone(),
            a_fingerprint,
            b_fingerprint,
            a_stale,
            b_stale,
            diff: bounded_diff(&display_form(occ_a), &display_form(occ_b), DIFF_LINE_LIMIT),
        });
    }

    conflicts
}

fn is_stale(occurrence: &SkillOccurrence, current: &str) -> bool {
    stored_hash(&occurrence.frontmatter).is_none_or(|hash| !hash_matches(&hash, current))
}

fn display_form(occurrence: &SkillOccurrence) -> String {
    render_skill(&core_frontmatter(&occurrence.frontmatter), &occurrence.body)
        .unwrap_or_else(|_| occurrence.body.clone())
}

/// Unified line diff, cut to the first `limit` lines.
pub fn bounded_diff(old: &str, new: &str, limit: usize) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();
    for hunk in diff.unified_diff().context_radius(2).iter_hunks() {
        output.push_str(&format!("{hunk}"));
    }
    let mut lines: Vec<&str> = output.lines().take(limit + 1).collect();
    if lines.len() > limit {
        lines.truncate(limit);
        lines.push("...");
    }
    lines.join("\n")
}

/// Apply a decision to a conflict.
///
/// `siblings` are every platform occurrence of the skill, used by `UseCommon`.
pub fn apply(
    workspace: &Workspace,
    conflict: &Conflict,
    action: &ResolutionAction,
    canonical: Option<&SkillOccurrence>,
    siblings: &[&SkillOccurrence],
) -> Result<()> {
    match action {
        ResolutionAction::UseA => replace_with(workspace, &conflict.a, &conflict.b),
        ResolutionAction::UseB => replace_with(workspace, &conflict.b, &conflict.a),
        ResolutionAction::UseCommon => {
            let Some(canonical) = canonical else {
                warn!(skill = %conflict.skill_name, "canonical skill vanished; skipping");
                return Ok(());
            };
            let core = core_frontmatter(&canonical.frontmatter);
            let hash = current_hash(canonical);
            for occurrence in siblings {
                stamp_as_reference(workspace, occurrence, &canonical.skill_name, &core, &hash)?;
            }
            info!(skill = %conflict.skill_name, "restored canonical version");
            Ok(())
        }
        ResolutionAction::UsePlatform(_) | ResolutionAction::Skip | ResolutionAction::Abort => {
            Ok(())
        }
    }
}

/// Overwrite `target` with `source`'s core frontmatter and body, keeping
/// `target`'s platform-local fields.
fn replace_with(
    workspace: &Workspace,
    source: &SkillOccurrence,
    target: &SkillOccurrence,
) -> Result<()> {
    let core = core_frontmatter(&source.frontmatter);
    let local = platform_fields(&target.frontmatter);
    let frontmatter = match stored_hash(&source.frontmatter).filter(|_| source.is_reference) {
        Some(hash) => compose_frontmatter(&core, &local, SyncMetadata::reference(&hash)),
        None => {
            let mut frontmatter: Frontmatter = local;
            frontmatter.extend(core);
            frontmatter
        }
    };
    workspace.write_skill(&target.path, &frontmatter, &source.body)?;
    info!(
        skill = %target.skill_name,
        from = %source.platform,
        to = %target.platform,
        "replaced platform copy"
    );
    Ok(())
}

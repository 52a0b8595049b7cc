//! Drift between a platform occurrence and the canonical skill.
//!
//! A platform copy is out of sync when it is literal content although
//! canonical exists, when its reference points somewhere else, or when the
//! hash it recorded at its last stamp no longer matches canonical.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::conflict::{bounded_diff, DIFF_LINE_LIMIT};
use crate::error::Result;
use crate::formatting::render_skill;
use crate::hash::{fingerprint, hash_matches};
use crate::metadata::{canonical_json, core_frontmatter, stored_hash, SyncMetadata};
use crate::resolve::{
    current_hash, stamp_as_reference, write_canonical, ResolutionAction, ResolutionOption,
};
use crate::skill::{reference_string, reference_target, SkillOccurrence};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchType {
    Body,
    Frontmatter,
    Both,
}

impl std::fmt::Display for MismatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Body => "body",
            Self::Frontmatter => "frontmatter",
            Self::Both => "body and frontmatter",
        })
    }
}

#[derive(Debug, Clone)]
pub struct OutOfSyncRecord {
    pub skill_name: String,
    pub platform: String,
    pub occurrence: SkillOccurrence,
    pub mismatch: MismatchType,
    /// The occurrence is a reference pointing at the wrong path.
    pub target_mismatch: bool,
    /// The platform side carries edits worth promoting into canonical.
    pub authored: bool,
    pub stored_hash: Option<String>,
    pub canonical_hash: String,
}

/// Classification of one occurrence against canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub mismatch: Option<MismatchType>,
    pub target_mismatch: bool,
    pub authored: bool,
}

/// Compare a platform occurrence with canonical. `mismatch` is `None` when in sync.
pub fn classify(occurrence: &SkillOccurrence, canonical: &SkillOccurrence) -> Classification {
    let platform_core = core_frontmatter(&occurrence.frontmatter);
    let frontmatter_differs =
        canonical_json(&platform_core) != canonical_json(&core_frontmatter(&canonical.frontmatter));

    let (body_differs, target_mismatch, authored) = if occurrence.is_reference {
        let expected = reference_string(&canonical.skill_name);
        let target_mismatch = occurrence.reference_target() != reference_target(&expected);

        let files = SyncMetadata::read(&canonical.frontmatter).files;
        let stored = stored_hash(&occurrence.frontmatter);
        let current = current_hash(canonical);
        let hash_ok = stored.as_deref().is_some_and(|hash| hash_matches(hash, &current));
        // The recorded hash is what canonical looked like with this
        // platform's frontmatter: only canonical's frontmatter moved since.
        let explained = stored.as_deref().is_some_and(|hash| {
            hash_matches(hash, &fingerprint(&platform_core, &canonical.body, &files))
        });

        let body_differs = target_mismatch || (!hash_ok && !explained);
        let authored = !target_mismatch && frontmatter_differs && !explained;
        (body_differs, target_mismatch, authored)
    } else {
        (occurrence.body != canonical.body, false, true)
    };

    let mismatch = match (frontmatter_differs, body_differs) {
        (false, false) => None,
        (true, false) => Some(MismatchType::Frontmatter),
        (false, true) => Some(MismatchType::Body),
        (true, true) => Some(MismatchType::Both),
    };

    Classification {
        mismatch,
        target_mismatch,
        authored: authored && mismatch.is_some(),
    }
}

/// Find every occurrence on `platform` that drifted from its canonical skill.
pub fn detect_out_of_sync(
    occurrences: &[SkillOccurrence],
    canonical: &[SkillOccurrence],
    platform: &str,
) -> Vec<OutOfSyncRecord> {
    occurrences
        .iter()
        .filter(|occ| occ.platform == platform)
        .filter_map(|occ| {
            let key = occ.key();
            let canonical = canonical.iter().find(|can| can.key() == key)?;
            let classification = classify(occ, canonical);
            let mismatch = classification.mismatch?;
            Some(OutOfSyncRecord {
                skill_name: canonical.skill_name.clone(),
                platform: platform.to_string(),
                occurrence: occ.clone(),
                mismatch,
                target_mismatch: classification.target_mismatch,
                authored: classification.authored,
                stored_hash: stored_hash(&occ.frontmatter),
                canonical_hash: current_hash(canonical),
            })
        })
        .collect()
}

/// Every out-of-sync record of one skill, resolved with a single decision.
#[derive(Debug, Clone)]
pub struct OutOfSyncGroup {
    pub skill_name: String,
    pub records: Vec<OutOfSyncRecord>,
}

impl OutOfSyncGroup {
    /// One option per platform whose version can be promoted, then the
    /// canonical version, skip and abort.
    pub fn options(&self) -> Vec<ResolutionOption> {
        let mut options: Vec<ResolutionOption> = self
            .records
            .iter()
            .filter(|record| record.authored)
            .map(|record| {
                ResolutionOption::new(
                    ResolutionAction::UsePlatform(record.platform.clone()),
                    format!("Use {} version (overwrite canonical)", record.platform),
                )
            })
            .collect();
        options.push(ResolutionOption::new(
            ResolutionAction::UseCommon,
            "Use canonical version (discard platform edits)",
        ));
        options.push(ResolutionOption::skip());
        options.push(ResolutionOption::abort());
        options
    }

    pub fn describe(&self, canonical: &SkillOccurrence) -> String {
        let mut text = format!("Skill '{}' is out of sync with canonical:", self.skill_name);
        let canonical_view = display_form(canonical);
        for record in &self.records {
            text.push_str(&format!("\n  {} ({})", record.platform, record.mismatch));
            if record.target_mismatch {
                text.push_str(&format!(
                    ", references {}",
                    record.occurrence.body.trim()
                ));
            }
            let diff = bounded_diff(
                &canonical_view,
                &display_form(&record.occurrence),
                DIFF_LINE_LIMIT,
            );
            if !diff.is_empty() {
                text.push('\n');
                text.push_str(&diff);
            }
        }
        text
    }
}

fn display_form(occurrence: &SkillOccurrence) -> String {
    render_skill(&core_frontmatter(&occurrence.frontmatter), &occurrence.body)
        .unwrap_or_else(|_| occurrence.body.clone())
}

/// Group records so each skill raises one resolution event. Order follows first appearance.
pub fn group_by_skill(records: Vec<OutOfSyncRecord>) -> Vec<OutOfSyncGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: BTreeMap<String, Vec<OutOfSyncRecord>> = BTreeMap::new();
    for record in records {
        let key = record.occurrence.key();
        if !grouped.contains_key(&key) {
            order.push(key.clone());
        }
        grouped.entry(key).or_default().push(record);
    }
    order
        .into_iter()
        .filter_map(|key| {
            let records = grouped.remove(&key)?;
            Some(OutOfSyncGroup {
                skill_name: records[0].skill_name.clone(),
                records,
            })
        })
        .collect()
}

/// Apply a decision to a group.
///
/// `UsePlatform` writes the chosen version into canonical (canonical first)
/// and then re-stamps every grouped occurrence as a reference. `UseCommon`
/// re-stamps every platform occurrence of the skill.
pub fn apply(
    workspace: &Workspace,
    group: &OutOfSyncGroup,
    action: &ResolutionAction,
    canonical: Option<&SkillOccurrence>,
    siblings: &[&SkillOccurrence],
) -> Result<()> {
    let Some(canonical) = canonical else {
        warn!(skill = %group.skill_name, "canonical skill vanished; skipping");
        return Ok(());
    };

    match action {
        ResolutionAction::UsePlatform(platform) => {
            let Some(chosen) = group
                .records
                .iter()
                .find(|record| &record.platform == platform)
            else {
                warn!(skill = %group.skill_name, %platform, "no such candidate; skipping");
                return Ok(());
            };
            let core = core_frontmatter(&chosen.occurrence.frontmatter);
            let body = if chosen.occurrence.is_reference {
                canonical.body.clone()
            } else {
                chosen.occurrence.body.clone()
            };
            let files = SyncMetadata::read(&canonical.frontmatter).files;
            let hash = write_canonical(workspace, canonical, &core, &body, &files)?;
            for record in &group.records {
                stamp_as_reference(
                    workspace,
                    &record.occurrence,
                    &canonical.skill_name,
                    &core,
                    &hash,
                )?;
            }
            info!(skill = %group.skill_name, %platform, "promoted platform version");
        }
        ResolutionAction::UseCommon => {
            let core = core_frontmatter(&canonical.frontmatter);
            let hash = current_hash(canonical);
            for occurrence in siblings {
                stamp_as_reference(workspace, occurrence, &canonical.skill_name, &core, &hash)?;
            }
            info!(skill = %group.skill_name, "restored canonical version");
        }
        ResolutionAction::UseA
        | ResolutionAction::UseB
        | ResolutionAction::Skip
        | ResolutionAction::Abort => {}
    }
    Ok(())
}

//! The sync driver.
//!
//! Phases run in a fixed order and every phase starts from a fresh scan, so a
//! decision made earlier is always visible to the next detector.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::conflict::{self, detect_conflicts};
use crate::dependents::{self, DependentConflict};
use crate::discovery::{dependent_files, scan, Inventory};
use crate::error::{IssueKind, Result, SyncError};
use crate::metadata::{core_frontmatter, SyncMetadata};
use crate::out_of_sync::{self, classify, detect_out_of_sync, group_by_skill, OutOfSyncRecord};
use crate::promote::{link_to_canonical, promote};
use crate::propagate::{propagate, ReferenceCreator};
use crate::resolve::{current_hash, write_canonical, ResolutionAction, Resolver};
use crate::skill::{Platform, SkillOccurrence};
use crate::workspace::Workspace;

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub promoted: usize,
    pub linked: usize,
    pub conflicts_resolved: usize,
    pub out_of_sync_resolved: usize,
    pub consolidated: usize,
    pub propagated: usize,
    pub created: usize,
    /// Skills left for a future run.
    pub skipped: BTreeSet<String>,
    /// Skills referenced by a platform but absent from the canonical store.
    pub missing_canonical: BTreeSet<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.missing_canonical.is_empty()
    }
}

pub struct SyncEngine {
    workspace: Workspace,
    platforms: Vec<Platform>,
    resolver: Resolver,
    deferred: BTreeSet<String>,
    /// Skills already decided in a dry run, whose writes never landed.
    settled: BTreeSet<String>,
    report: SyncReport,
}

impl SyncEngine {
    /// `platforms` are the enabled platforms in priority order; promotion
    /// takes the first one holding a skill.
    pub fn new(workspace: Workspace, platforms: Vec<Platform>, resolver: Resolver) -> Self {
        Self {
            workspace,
            platforms,
            resolver,
            deferred: BTreeSet::new(),
            settled: BTreeSet::new(),
            report: SyncReport::default(),
        }
    }

    pub fn run(mut self) -> Result<SyncReport> {
        if self.resolver.is_fail_fast() {
            self.precheck()?;
        }
        self.resolve_conflicts()?;
        self.promote_skills()?;
        self.resolve_out_of_sync()?;
        self.consolidate_dependents()?;
        self.propagate_all()?;
        Ok(self.report)
    }

    fn rescan(&self) -> Inventory {
        scan(&self.workspace.root, &self.platforms)
    }

    fn defer(&mut self, occurrence: &SkillOccurrence) {
        self.deferred.insert(occurrence.key());
        self.report.skipped.insert(occurrence.skill_name.clone());
    }

    /// Whether `key` needs no further decision this run.
    fn is_decided(&self, key: &str) -> bool {
        self.deferred.contains(key) || self.settled.contains(key)
    }

    fn settle(&mut self, key: String) {
        if self.workspace.dry_run {
            self.settled.insert(key);
        }
    }

    /// Collect every issue up front so a fail-fast run names all affected skills at once.
    fn precheck(&self) -> Result<()> {
        let inventory = self.rescan();
        let issues = find_issues(&inventory, &self.platforms);
        if issues.is_empty() {
            return Ok(());
        }

        let mut kinds = issues.values().copied();
        let first = kinds.next().unwrap_or(IssueKind::Mixed);
        let kind = if kinds.all(|kind| kind == first) {
            first
        } else {
            IssueKind::Mixed
        };
        Err(SyncError::Unresolved {
            kind,
            skills: issues.into_keys().collect(),
        })
    }

    fn resolve_conflicts(&mut self) -> Result<()> {
        debug!("phase: conflicts");
        for (i, a) in self.platforms.iter().enumerate() {
            for b in &self.platforms[i + 1..] {
                let inventory = self.rescan();
                let conflicts = detect_conflicts(
                    inventory.platform(&a.name),
                    inventory.platform(&b.name),
                    &inventory.canonical,
                );
                for conflict in conflicts {
                    let key = conflict.a.key();
                    if self.is_decided(&key) {
                        continue;
                    }
                    let canonical = inventory.canonical_for(&key);
                    let action = self.resolver.decide(
                        IssueKind::Conflicts,
                        &conflict.skill_name,
                        &conflict.describe(),
                        &conflict.options(canonical.is_some()),
                    )?;
                    if action == ResolutionAction::Skip {
                        self.deferred.insert(key);
                        self.report.skipped.insert(conflict.skill_name.clone());
                        continue;
                    }
                    let siblings = inventory.occurrences_of(&key, &self.platforms);
                    conflict::apply(&self.workspace, &conflict, &action, canonical, &siblings)?;
                    self.report.conflicts_resolved += 1;
                    if self.workspace.dry_run {
                        self.settled.insert(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn promote_skills(&mut self) -> Result<()> {
        debug!("phase: promotion");
        let inventory = self.rescan();
        for key in inventory.skill_keys() {
            if self.deferred.contains(&key) || inventory.canonical_for(&key).is_some() {
                continue;
            }
            let first_literal = inventory
                .occurrences_of(&key, &self.platforms)
                .into_iter()
                .find(|occ| !occ.is_reference);
            match first_literal {
                Some(occurrence) => {
                    if promote(&self.workspace, occurrence)?.is_some() {
                        self.report.promoted += 1;
                    }
                }
                None => self.report_missing_canonical(&inventory, &key),
            }
        }

        let inventory = self.rescan();
        for canonical in &inventory.canonical {
            let key = canonical.key();
            if self.deferred.contains(&key) {
                continue;
            }
            for occurrence in inventory.occurrences_of(&key, &self.platforms) {
                if link_to_canonical(&self.workspace, occurrence, canonical)? {
                    self.report.linked += 1;
                }
            }
        }
        Ok(())
    }

    fn report_missing_canonical(&mut self, inventory: &Inventory, key: &str) {
        for occurrence in inventory.occurrences_of(key, &self.platforms) {
            warn!(
                skill = %occurrence.skill_name,
                platform = %occurrence.platform,
                path = %self.workspace.display_path(&occurrence.path),
                "reference points at a missing canonical skill"
            );
            self.report.missing_canonical.insert(occurrence.skill_name.clone());
        }
    }

    fn resolve_out_of_sync(&mut self) -> Result<()> {
        debug!("phase: out of sync");
        let inventory = self.rescan();
        let records: Vec<OutOfSyncRecord> = self
            .platforms
            .iter()
            .flat_map(|platform| {
                detect_out_of_sync(
                    inventory.platform(&platform.name),
                    &inventory.canonical,
                    &platform.name,
                )
            })
            .filter(|record| !self.is_decided(&record.occurrence.key()))
            .collect();

        for group in group_by_skill(records) {
            let key = group.records[0].occurrence.key();
            let Some(canonical) = inventory.canonical_for(&key) else {
                continue;
            };
            let action = self.resolver.decide(
                IssueKind::OutOfSync,
                &group.skill_name,
                &group.describe(canonical),
                &group.options(),
            )?;
            if action == ResolutionAction::Skip {
                self.defer(&group.records[0].occurrence);
                continue;
            }
            let siblings = inventory.occurrences_of(&key, &self.platforms);
            out_of_sync::apply(&self.workspace, &group, &action, Some(canonical), &siblings)?;
            self.report.out_of_sync_resolved += 1;
            self.settle(key);
        }
        Ok(())
    }

    fn consolidate_dependents(&mut self) -> Result<()> {
        debug!("phase: dependent files");
        let inventory = self.rescan();
        for canonical in &inventory.canonical {
            let key = canonical.key();
            if self.is_decided(&key) {
                continue;
            }
            let references: Vec<&SkillOccurrence> = inventory
                .occurrences_of(&key, &self.platforms)
                .into_iter()
                .filter(|occ| occ.is_reference)
                .collect();
            let platform_dirs: BTreeMap<String, PathBuf> = references
                .iter()
                .map(|occ| (occ.platform.clone(), occ.dir().to_path_buf()))
                .collect();
            let platform_files = platform_dirs
                .iter()
                .map(|(platform, dir)| (platform.clone(), dependent_files(dir)))
                .collect();

            let stored = SyncMetadata::read(&canonical.frontmatter).files;
            let mut plan =
                dependents::plan(&canonical.skill_name, platform_files, canonical.dir(), &stored);
            for conflict in plan.conflicts.clone() {
                let action = self.resolver.decide(
                    IssueKind::DependentConflicts,
                    &canonical.skill_name,
                    &conflict.describe(),
                    &conflict.options(),
                )?;
                plan.resolve(&conflict, &action);
            }
            if !plan.skipped.is_empty() {
                self.report.skipped.insert(canonical.skill_name.clone());
            }

            let moved = plan
                .accepted
                .values()
                .filter(|source| matches!(source, dependents::Source::Platform { .. }))
                .count();
            let files = plan.apply(&self.workspace, &platform_dirs)?;
            if files != stored {
                write_canonical(
                    &self.workspace,
                    canonical,
                    &core_frontmatter(&canonical.frontmatter),
                    &canonical.body,
                    &files,
                )?;
            }
            self.report.consolidated += moved;
        }
        Ok(())
    }

    fn propagate_all(&mut self) -> Result<()> {
        debug!("phase: propagation");
        let inventory = self.rescan();
        let mut creator = ReferenceCreator::new(&self.workspace);
        for canonical in &inventory.canonical {
            let key = canonical.key();
            if self.deferred.contains(&key) {
                continue;
            }
            let occurrences = inventory.occurrences_of(&key, &self.platforms);
            self.report.propagated += propagate(&self.workspace, canonical, &occurrences)?;

            let hash = current_hash(canonical);
            for platform in &self.platforms {
                if occurrences.iter().any(|occ| occ.platform == platform.name) {
                    continue;
                }
                if creator.ensure(&mut self.resolver, platform, canonical, &hash)? {
                    self.report.created += 1;
                }
            }
        }
        Ok(())
    }
}

/// Every skill that would need a decision, with the kind of issue found.
pub fn find_issues(inventory: &Inventory, platforms: &[Platform]) -> BTreeMap<String, IssueKind> {
    let mut issues: BTreeMap<String, IssueKind> = BTreeMap::new();
    let mut note = |skill: &str, kind: IssueKind| {
        issues
            .entry(skill.to_string())
            .and_modify(|existing| {
                if *existing != kind {
                    *existing = IssueKind::Mixed;
                }
            })
            .or_insert(kind);
    };

    for (i, a) in platforms.iter().enumerate() {
        for b in &platforms[i + 1..] {
            for conflict in detect_conflicts(
                inventory.platform(&a.name),
                inventory.platform(&b.name),
                &inventory.canonical,
            ) {
                note(&conflict.skill_name, IssueKind::Conflicts);
            }
        }
    }

    for platform in platforms {
        let records = detect_out_of_sync(
            inventory.platform(&platform.name),
            &inventory.canonical,
            &platform.name,
        );
        for record in records {
            note(&record.skill_name, IssueKind::OutOfSync);
        }
    }

    for key in inventory.skill_keys() {
        for conflict in predicted_dependent_conflicts(inventory, platforms, &key) {
            note(&conflict.skill_name, IssueKind::DependentConflicts);
        }
    }

    issues
}

fn predicted_dependent_conflicts(
    inventory: &Inventory,
    platforms: &[Platform],
    key: &str,
) -> Vec<DependentConflict> {
    let occurrences = inventory.occurrences_of(key, platforms);
    let Some(first) = occurrences.first() else {
        return Vec::new();
    };
    let platform_files = occurrences
        .iter()
        .map(|occ| (occ.platform.clone(), dependent_files(occ.dir())))
        .collect();
    let (canonical_dir, stored) = match inventory.canonical_for(key) {
        Some(canonical) => (
            canonical.dir().to_path_buf(),
            SyncMetadata::read(&canonical.frontmatter).files,
        ),
        None => (PathBuf::new(), BTreeMap::new()),
    };
    dependents::plan(&first.skill_name, platform_files, &canonical_dir, &stored).conflicts
}

/// Sync state of one skill on one platform, as shown by `--list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Missing,
    Reference,
    Literal,
    OutOfSync,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Missing => "-",
            Self::Reference => "ref",
            Self::Literal => "local",
            Self::OutOfSync => "drift",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillStatus {
    pub skill_name: String,
    pub canonical: bool,
    pub platforms: Vec<(String, Presence)>,
}

/// Per-skill status across canonical and every platform, sorted by skill key.
pub fn list(inventory: &Inventory, platforms: &[Platform]) -> Vec<SkillStatus> {
    inventory
        .skill_keys()
        .into_iter()
        .filter_map(|key| {
            let canonical = inventory.canonical_for(&key);
            let occurrences = inventory.occurrences_of(&key, platforms);
            let skill_name = canonical
                .or_else(|| occurrences.first().copied())
                .map(|occ| occ.skill_name.clone())?;
            let statuses = platforms
                .iter()
                .map(|platform| {
                    let presence = occurrences
                        .iter()
                        .find(|occ| occ.platform == platform.name)
                        .map_or(Presence::Missing, |occ| presence(occ, canonical));
                    (platform.name.clone(), presence)
                })
                .collect();
            Some(SkillStatus {
                skill_name,
                canonical: canonical.is_some(),
                platforms: statuses,
            })
        })
        .collect()
}

fn presence(occurrence: &SkillOccurrence, canonical: Option<&SkillOccurrence>) -> Presence {
    let drifted = match canonical {
        Some(canonical) => classify(occurrence, canonical).mismatch.is_some(),
        None => occurrence.is_reference,
    };
    match (occurrence.is_reference, drifted) {
        (_, true) => Presence::OutOfSync,
        (true, false) => Presence::Reference,
        (false, false) => Presence::Literal,
    }
}

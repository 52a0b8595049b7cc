//! Resolution policy and the writes shared by every resolution path.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{IssueKind, Result, SyncError};
use crate::hash::fingerprint;
use crate::metadata::{compose_frontmatter, core_frontmatter, platform_fields, SyncMetadata};
use crate::prompt::Prompter;
use crate::skill::{reference_string, Frontmatter, SkillOccurrence};
use crate::workspace::Workspace;

/// What to do about one detected issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionAction {
    /// Replace side B with side A.
    UseA,
    /// Replace side A with side B.
    UseB,
    /// Promote this platform's version into canonical.
    UsePlatform(String),
    /// Discard platform edits and re-stamp every platform as a reference.
    UseCommon,
    /// Leave everything as is for a future run.
    Skip,
    Abort,
}

/// A legal action together with the text shown for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOption {
    pub action: ResolutionAction,
    pub label: String,
}

impl ResolutionOption {
    pub fn new(action: ResolutionAction, label: impl Into<String>) -> Self {
        Self {
            action,
            label: label.into(),
        }
    }

    pub fn skip() -> Self {
        Self::new(ResolutionAction::Skip, "Skip for now (keep both)")
    }

    pub fn abort() -> Self {
        Self::new(ResolutionAction::Abort, "Abort sync")
    }
}

pub enum Policy {
    /// Any decision is an error naming the skill.
    FailFast,
    Interactive(Box<dyn Prompter>),
}

pub struct Resolver {
    policy: Policy,
}

impl Resolver {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    pub fn fail_fast() -> Self {
        Self::new(Policy::FailFast)
    }

    pub fn interactive(prompter: impl Prompter + 'static) -> Self {
        Self::new(Policy::Interactive(Box::new(prompter)))
    }

    pub fn is_fail_fast(&self) -> bool {
        matches!(self.policy, Policy::FailFast)
    }

    /// Pick one of `options` for `skill`.
    ///
    /// `Abort` never comes back as a value; it is raised as
    /// [`SyncError::Aborted`].
    pub fn decide(
        &mut self,
        kind: IssueKind,
        skill: &str,
        message: &str,
        options: &[ResolutionOption],
    ) -> Result<ResolutionAction> {
        let prompter = match &mut self.policy {
            Policy::FailFast => {
                return Err(SyncError::Unresolved {
                    kind,
                    skills: vec![skill.to_string()],
                })
            }
            Policy::Interactive(prompter) => prompter,
        };

        let labels: Vec<String> = options.iter().map(|option| option.label.clone()).collect();
        let default = options
            .iter()
            .position(|option| option.action == ResolutionAction::Skip)
            .unwrap_or(0);
        let index = prompter.choose(message, &labels, default)?;
        let action = options
            .get(index)
            .map(|option| option.action.clone())
            .unwrap_or(ResolutionAction::Skip);
        debug!(skill, ?action, "resolved");

        if action == ResolutionAction::Abort {
            return Err(SyncError::Aborted {
                skill: skill.to_string(),
            });
        }
        Ok(action)
    }

    /// Yes/no question. Fail-fast runs take the default without asking.
    pub fn confirm(&mut self, message: &str, default: bool) -> Result<bool> {
        match &mut self.policy {
            Policy::FailFast => Ok(default),
            Policy::Interactive(prompter) => prompter.confirm(message, default),
        }
    }

    pub fn select_many(
        &mut self,
        message: &str,
        options: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>> {
        match &mut self.policy {
            Policy::FailFast => Ok(defaults
                .iter()
                .enumerate()
                .filter_map(|(index, selected)| selected.then_some(index))
                .collect()),
            Policy::Interactive(prompter) => prompter.select_many(message, options, defaults),
        }
    }
}

/// Fingerprint of canonical as it stands on disk, using its recorded file hashes.
pub fn current_hash(canonical: &SkillOccurrence) -> String {
    let files = SyncMetadata::read(&canonical.frontmatter).files;
    fingerprint(&core_frontmatter(&canonical.frontmatter), &canonical.body, &files)
}

/// Recompute canonical's fingerprint and rewrite its sync block.
pub fn restamp_canonical(workspace: &Workspace, canonical: &SkillOccurrence) -> Result<String> {
    let files = SyncMetadata::read(&canonical.frontmatter).files;
    write_canonical(
        workspace,
        canonical,
        &core_frontmatter(&canonical.frontmatter),
        &canonical.body,
        &files,
    )
}

/// Write canonical content with a freshly computed sync block. Returns the new hash.
pub fn write_canonical(
    workspace: &Workspace,
    canonical: &SkillOccurrence,
    core: &Frontmatter,
    body: &str,
    files: &BTreeMap<String, String>,
) -> Result<String> {
    let hash = fingerprint(core, body, files);
    let frontmatter = compose_frontmatter(
        core,
        &platform_fields(&canonical.frontmatter),
        SyncMetadata::canonical(&hash, files),
    );
    if workspace.write_skill(&canonical.path, &frontmatter, body)? {
        info!(skill = %canonical.skill_name, %hash, "updated canonical");
    }
    Ok(hash)
}

/// Rewrite a platform occurrence as a reference carrying canonical's core and hash.
///
/// Platform-local fields are kept. Returns whether the file changed.
pub fn stamp_as_reference(
    workspace: &Workspace,
    occurrence: &SkillOccurrence,
    skill_name: &str,
    core: &Frontmatter,
    hash: &str,
) -> Result<bool> {
    let frontmatter = compose_frontmatter(
        core,
        &platform_fields(&occurrence.frontmatter),
        SyncMetadata::reference(hash),
    );
    workspace.write_skill(&occurrence.path, &frontmatter, &reference_string(skill_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<usize>);

    impl Prompter for Scripted {
        fn choose(&mut self, _message: &str, _options: &[String], default: usize) -> Result<usize> {
            Ok(self.0.pop_front().unwrap_or(default))
        }

        fn confirm(&mut self, _message: &str, default: bool) -> Result<bool> {
            Ok(default)
        }

        fn select_many(
            &mut self,
            _message: &str,
            _options: &[String],
            _defaults: &[bool],
        ) -> Result<Vec<usize>> {
            Ok(Vec::new())
        }
    }

    fn options() -> Vec<ResolutionOption> {
        vec![
            ResolutionOption::new(ResolutionAction::UseA, "a"),
            ResolutionOption::skip(),
            ResolutionOption::abort(),
        ]
    }

    #[test]
    fn fail_fast_names_the_skill() {
        let mut resolver = Resolver::fail_fast();
        let err = resolver
            .decide(IssueKind::Conflicts, "beta", "?", &options())
            .unwrap_err();
        assert!(matches!(err, SyncError::Unresolved { ref skills, .. } if skills == &["beta"]));
        assert!(err.to_string().contains("beta"));
    }

    #[test]
    fn interactive_returns_choice_and_raises_abort() {
        let mut resolver = Resolver::interactive(Scripted(VecDeque::from([0, 2])));
        let action = resolver
            .decide(IssueKind::Conflicts, "beta", "?", &options())
            .expect("decided");
        assert_eq!(action, ResolutionAction::UseA);

        let err = resolver
            .decide(IssueKind::Conflicts, "beta", "?", &options())
            .unwrap_err();
        assert!(matches!(err, SyncError::Aborted { .. }));
    }

    #[test]
    fn default_choice_is_skip() {
        let mut resolver = Resolver::interactive(Scripted(VecDeque::new()));
        let action = resolver
            .decide(IssueKind::OutOfSync, "beta", "?", &options())
            .expect("decided");
        assert_eq!(action, ResolutionAction::Skip);
    }
}

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use agent_skills_sync::hash::{fingerprint, hash_bytes};
use agent_skills_sync::metadata::{core_frontmatter, stored_hash, SyncMetadata};
use agent_skills_sync::out_of_sync::{detect_out_of_sync, MismatchType};
use agent_skills_sync::resolve::current_hash;
use agent_skills_sync::skill::reference_string;
use agent_skills_sync::{
    scan, IssueKind, Platform, Prompter, Resolver, SyncEngine, SyncError, SyncReport, Workspace,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Answers choices from a script and records every question asked.
struct Scripted {
    choices: VecDeque<usize>,
    confirm_answer: bool,
    asked: Rc<RefCell<Vec<String>>>,
    chosen: Rc<RefCell<Vec<String>>>,
}

impl Scripted {
    fn new(choices: &[usize]) -> Self {
        Self {
            choices: choices.iter().copied().collect(),
            confirm_answer: false,
            asked: Rc::default(),
            chosen: Rc::default(),
        }
    }
}

impl Prompter for Scripted {
    fn choose(
        &mut self,
        message: &str,
        _options: &[String],
        default: usize,
    ) -> agent_skills_sync::Result<usize> {
        self.chosen.borrow_mut().push(message.to_string());
        Ok(self.choices.pop_front().unwrap_or(default))
    }

    fn confirm(&mut self, message: &str, _default: bool) -> agent_skills_sync::Result<bool> {
        self.asked.borrow_mut().push(message.to_string());
        Ok(self.confirm_answer)
    }

    fn select_many(
        &mut self,
        _message: &str,
        _options: &[String],
        _defaults: &[bool],
    ) -> agent_skills_sync::Result<Vec<usize>> {
        Ok(Vec::new())
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(path, content).expect("write");
}

fn platforms() -> Vec<Platform> {
    vec![
        Platform::new("claude", ".claude/skills"),
        Platform::new("codex", ".codex/skills"),
    ]
}

fn sync(root: &Path, resolver: Resolver) -> Result<SyncReport, SyncError> {
    SyncEngine::new(Workspace::new(root, false), platforms(), resolver).run()
}

#[test]
fn scenario_a_single_platform_skill_is_promoted() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/alpha/SKILL.md"), "# Alpha\n");

    let report = sync(dir.path(), Resolver::fail_fast()).expect("first run");
    assert_eq!(report.promoted, 1);

    let inventory = scan(dir.path(), &platforms());
    let canonical = inventory.canonical_for("alpha").expect("canonical");
    assert_eq!(canonical.body, "# Alpha");
    assert!(core_frontmatter(&canonical.frontmatter).is_empty());

    let reference = &inventory.platform("claude")[0];
    assert!(reference.is_reference);
    assert_eq!(reference.body, reference_string("alpha"));
    assert_eq!(stored_hash(&reference.frontmatter), Some(current_hash(canonical)));

    let report = sync(dir.path(), Resolver::fail_fast()).expect("second run");
    assert_eq!(report, SyncReport::default());
}

#[test]
fn scenario_b_use_a_overwrites_the_other_platform() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/beta/SKILL.md"), "X\n");
    write(&dir.path().join(".codex/skills/beta/SKILL.md"), "Y\n");

    let err = sync(dir.path(), Resolver::fail_fast()).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Unresolved { kind: IssueKind::Conflicts, ref skills } if skills == &["beta"]
    ));

    let report = sync(dir.path(), Resolver::interactive(Scripted::new(&[0]))).expect("run");
    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(report.promoted, 1);
    assert_eq!(report.linked, 1);

    let inventory = scan(dir.path(), &platforms());
    assert_eq!(inventory.canonical_for("beta").expect("canonical").body, "X");
    assert!(inventory.platform("codex")[0].is_reference);
}

#[test]
fn scenario_b_skip_leaves_both_copies() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/beta/SKILL.md"), "X\n");
    write(&dir.path().join(".codex/skills/beta/SKILL.md"), "Y\n");

    // Options are use-a, use-b, skip, abort.
    let report = sync(dir.path(), Resolver::interactive(Scripted::new(&[2]))).expect("run");
    assert_eq!(report.skipped.iter().collect::<Vec<_>>(), vec!["beta"]);
    assert!(!dir.path().join(".agents-common/skills/beta").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join(".codex/skills/beta/SKILL.md")).unwrap(),
        "Y\n"
    );
}

#[test]
fn abort_stops_the_run() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/beta/SKILL.md"), "X\n");
    write(&dir.path().join(".codex/skills/beta/SKILL.md"), "Y\n");

    let err = sync(dir.path(), Resolver::interactive(Scripted::new(&[3]))).unwrap_err();
    assert!(matches!(err, SyncError::Aborted { ref skill } if skill == "beta"));
    assert!(!dir.path().join(".agents-common").exists());
}

#[test]
fn scenario_c_canonical_edit_is_out_of_sync() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/gamma/SKILL.md"), "# Gamma\n");
    sync(dir.path(), Resolver::fail_fast()).expect("first run");

    let canonical_path = dir.path().join(".agents-common/skills/gamma/SKILL.md");
    let edited = fs::read_to_string(&canonical_path)
        .expect("read")
        .replace("# Gamma", "# Gamma, revised");
    fs::write(&canonical_path, edited).expect("write");

    let inventory = scan(dir.path(), &platforms());
    let records = detect_out_of_sync(inventory.platform("claude"), &inventory.canonical, "claude");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].mismatch, MismatchType::Body);
    assert!(!records[0].authored);

    let err = sync(dir.path(), Resolver::fail_fast()).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Unresolved { kind: IssueKind::OutOfSync, ref skills } if skills == &["gamma"]
    ));

    // Options are use-common, skip, abort.
    let report = sync(dir.path(), Resolver::interactive(Scripted::new(&[0]))).expect("run");
    assert_eq!(report.out_of_sync_resolved, 1);

    let inventory = scan(dir.path(), &platforms());
    let canonical = inventory.canonical_for("gamma").expect("canonical");
    assert_eq!(canonical.body, "# Gamma, revised");
    assert_eq!(
        stored_hash(&inventory.platform("claude")[0].frontmatter),
        Some(current_hash(canonical))
    );
    assert_eq!(sync(dir.path(), Resolver::fail_fast()).expect("clean run"), SyncReport::default());
}

#[test]
fn identical_literal_beside_reference_is_linked_silently() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/alpha/SKILL.md"), "# Alpha\n");
    sync(dir.path(), Resolver::fail_fast()).expect("first run");
    write(&dir.path().join(".codex/skills/alpha/SKILL.md"), "# Alpha\n");

    let report = sync(dir.path(), Resolver::fail_fast()).expect("second run");
    assert_eq!(report.linked, 1);
    assert_eq!(report.conflicts_resolved, 0);

    let inventory = scan(dir.path(), &platforms());
    assert!(inventory.platform("codex")[0].is_reference);
}

#[test]
fn differing_literal_beside_reference_asks_once() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/alpha/SKILL.md"), "# Alpha\n");
    sync(dir.path(), Resolver::fail_fast()).expect("first run");
    write(&dir.path().join(".codex/skills/alpha/SKILL.md"), "# Alpha, local\n");

    let err = sync(dir.path(), Resolver::fail_fast()).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Unresolved { kind: IssueKind::OutOfSync, ref skills } if skills == &["alpha"]
    ));

    // Options are use-codex, use-common, skip, abort.
    let prompter = Scripted::new(&[0]);
    let chosen = Rc::clone(&prompter.chosen);
    let report = sync(dir.path(), Resolver::interactive(prompter)).expect("run");
    assert_eq!(chosen.borrow().len(), 1);
    assert_eq!(report.out_of_sync_resolved, 1);

    let inventory = scan(dir.path(), &platforms());
    assert_eq!(inventory.canonical_for("alpha").expect("canonical").body, "# Alpha, local");
    assert!(inventory.platform("codex")[0].is_reference);
}

#[test]
fn platform_frontmatter_edit_can_be_promoted() {
    let dir = TempDir::new().expect("temp dir");
    write(
        &dir.path().join(".claude/skills/gamma/SKILL.md"),
        "---\ndescription: old\n---\n# Gamma\n",
    );
    sync(dir.path(), Resolver::fail_fast()).expect("first run");

    let reference_path = dir.path().join(".claude/skills/gamma/SKILL.md");
    let edited = fs::read_to_string(&reference_path)
        .expect("read")
        .replace("\"old\"", "\"new\"");
    fs::write(&reference_path, edited).expect("write");

    // Options are use-claude, use-common, skip, abort.
    sync(dir.path(), Resolver::interactive(Scripted::new(&[0]))).expect("run");

    let inventory = scan(dir.path(), &platforms());
    let canonical = inventory.canonical_for("gamma").expect("canonical");
    assert_eq!(
        canonical.frontmatter.get("description").and_then(|v| v.as_str()),
        Some("new")
    );
    assert_eq!(canonical.body, "# Gamma");
}

#[test]
fn scenario_d_dependent_conflict_resolved_from_platform() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/delta/SKILL.md"), "# Delta\n");
    write(&dir.path().join(".claude/skills/delta/util.txt"), "a");
    write(&dir.path().join(".codex/skills/delta/SKILL.md"), "# Delta\n");
    write(&dir.path().join(".codex/skills/delta/util.txt"), "b");

    let err = sync(dir.path(), Resolver::fail_fast()).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Unresolved {
            kind: IssueKind::DependentConflicts,
            ref skills,
        } if skills == &["delta"]
    ));

    // Options are use-claude, use-codex, skip, abort.
    let report = sync(dir.path(), Resolver::interactive(Scripted::new(&[0]))).expect("run");
    assert_eq!(report.consolidated, 1);

    let canonical_dir = dir.path().join(".agents-common/skills/delta");
    assert_eq!(fs::read_to_string(canonical_dir.join("util.txt")).unwrap(), "a");
    assert!(!dir.path().join(".claude/skills/delta/util.txt").exists());
    assert!(!dir.path().join(".codex/skills/delta/util.txt").exists());

    let inventory = scan(dir.path(), &platforms());
    let canonical = inventory.canonical_for("delta").expect("canonical");
    let sync_block = SyncMetadata::read(&canonical.frontmatter);
    assert_eq!(sync_block.files.get("util.txt"), Some(&hash_bytes(b"a")));
    assert_eq!(
        sync_block.hash,
        Some(fingerprint(
            &core_frontmatter(&canonical.frontmatter),
            &canonical.body,
            &sync_block.files
        ))
    );
    for platform in ["claude", "codex"] {
        assert_eq!(
            stored_hash(&inventory.platform(platform)[0].frontmatter),
            sync_block.hash
        );
    }
}

#[test]
fn scenario_e_references_created_for_existing_platforms_only() {
    let dir = TempDir::new().expect("temp dir");
    write(
        &dir.path().join(".agents-common/skills/epsilon/SKILL.md"),
        "---\nname: epsilon\n---\n# Epsilon\n",
    );
    fs::create_dir_all(dir.path().join(".claude/skills")).expect("mkdir");

    let prompter = Scripted::new(&[]);
    let asked = Rc::clone(&prompter.asked);
    let report = sync(dir.path(), Resolver::interactive(prompter)).expect("run");
    assert_eq!(report.created, 1);

    let inventory = scan(dir.path(), &platforms());
    assert!(inventory.platform("claude")[0].is_reference);
    assert!(!dir.path().join(".codex").exists());
    let asked = asked.borrow();
    assert_eq!(asked.len(), 1);
    assert!(asked[0].contains("codex"));

    let mut prompter = Scripted::new(&[]);
    prompter.confirm_answer = true;
    let report = sync(dir.path(), Resolver::interactive(prompter)).expect("second run");
    assert_eq!(report.created, 1);
    let inventory = scan(dir.path(), &platforms());
    assert!(inventory.platform("codex")[0].is_reference);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir.path().join(".claude/skills/alpha/SKILL.md"), "# Alpha\n");

    let engine = SyncEngine::new(
        Workspace::new(dir.path(), true),
        platforms(),
        Resolver::fail_fast(),
    );
    engine.run().expect("dry run");

    assert!(!dir.path().join(".agents-common").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join(".claude/skills/alpha/SKILL.md")).unwrap(),
        "# Alpha\n"
    );
}

#[test]
fn legacy_sync_stamp_is_dropped_on_rewrite() {
    let dir = TempDir::new().expect("temp dir");
    write(
        &dir.path().join(".claude/skills/alpha/SKILL.md"),
        "---\nname: alpha\nsync:\n  managed-by: agent-skills\n  refactored: 2024-01-01\n---\n# Alpha\n",
    );
    sync(dir.path(), Resolver::fail_fast()).expect("run");

    let content = fs::read_to_string(dir.path().join(".claude/skills/alpha/SKILL.md")).unwrap();
    assert!(!content.contains("managed-by"));
    assert!(content.contains(&reference_string("alpha")));
}

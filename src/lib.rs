//! Keep Agent Skills in sync across AI assistant directories.
//!
//! Every skill lives once under `.agents-common/skills/<name>/SKILL.md`; each
//! enabled platform (`.claude/skills`, `.codex/skills`, ...) holds a small
//! reference file pointing there, stamped with the canonical fingerprint and
//! carrying the platform's own frontmatter fields.

pub mod config;
pub mod conflict;
pub mod dependents;
pub mod discovery;
pub mod error;
pub mod formatting;
pub mod hash;
pub mod metadata;
pub mod out_of_sync;
pub mod promote;
pub mod prompt;
pub mod propagate;
pub mod resolve;
pub mod skill;
pub mod sync;
pub mod workspace;

pub use config::{detect_platforms, ConfigStore, SyncConfig};
pub use discovery::{scan, Inventory};
pub use error::{ConfigError, FormatError, IssueKind, ParseError, Result, SyncError};
pub use formatting::{parse_frontmatter, render_skill};
pub use hash::fingerprint;
pub use prompt::{DefaultPrompter, Prompter, TerminalPrompter};
pub use resolve::{ResolutionAction, Resolver};
pub use skill::{builtin_platforms, Platform, SkillOccurrence};
pub use sync::{list, Presence, SkillStatus, SyncEngine, SyncReport};
pub use workspace::Workspace;

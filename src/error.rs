//! Error types for agent-skills-sync.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing SKILL.md frontmatter.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The frontmatter is not properly closed with a second delimiter.
    #[error("SKILL.md frontmatter not properly closed with ---")]
    UnclosedFrontmatter,

    /// The YAML in the frontmatter is invalid.
    #[error("Invalid YAML in frontmatter: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    /// The frontmatter is not a YAML mapping.
    #[error("SKILL.md frontmatter must be a YAML mapping")]
    NotAMapping,

    /// A frontmatter key is not a string.
    #[error("Frontmatter keys must be strings")]
    NonStringKey,
}

/// Errors that can occur when writing frontmatter back out.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Unsupported YAML value type.
    #[error("Unsupported YAML value type for formatting")]
    UnsupportedValueType,
}

/// Errors raised while loading or saving the persisted platform selection.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt config {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that stop a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Filesystem access failed on an essential step.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Frontmatter could not be rendered.
    #[error("Failed to format frontmatter for {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// Issues that need a decision were found under the fail-fast policy.
    #[error("{kind} require attention: {}", .skills.join(", "))]
    Unresolved { kind: IssueKind, skills: Vec<String> },

    /// The user chose to stop the run.
    #[error("Sync aborted while resolving '{skill}'")]
    Aborted { skill: String },

    /// The prompt collaborator failed.
    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// What kind of issue a fail-fast error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Conflicts,
    OutOfSync,
    DependentConflicts,
    Mixed,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Conflicts => "Conflicting skills",
            Self::OutOfSync => "Out-of-sync skills",
            Self::DependentConflicts => "Conflicting dependent files",
            Self::Mixed => "Conflicting or out-of-sync skills",
        };
        f.write_str(text)
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

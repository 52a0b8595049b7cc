//! The prompt/choice capability used by resolution.
//!
//! Resolution only ever talks to [`Prompter`], so it can run against a
//! terminal, a fixed default, or a scripted answer list in tests.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, MultiSelect, Select};

use crate::error::{Result, SyncError};

pub trait Prompter {
    /// Present `options` and return the index of the chosen one.
    fn choose(&mut self, message: &str, options: &[String], default: usize) -> Result<usize>;

    fn confirm(&mut self, message: &str, default: bool) -> Result<bool>;

    /// Pick any number of `options`; `defaults` marks the preselected ones.
    fn select_many(
        &mut self,
        message: &str,
        options: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>>;
}

/// Interactive prompts on the terminal.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn choose(&mut self, message: &str, options: &[String], default: usize) -> Result<usize> {
        Select::with_theme(&self.theme)
            .with_prompt(message)
            .items(options)
            .default(default)
            .interact()
            .map_err(|err| SyncError::Prompt(err.to_string()))
    }

    fn confirm(&mut self, message: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(|err| SyncError::Prompt(err.to_string()))
    }

    fn select_many(
        &mut self,
        message: &str,
        options: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>> {
        MultiSelect::with_theme(&self.theme)
            .with_prompt(message)
            .items(options)
            .defaults(defaults)
            .interact()
            .map_err(|err| SyncError::Prompt(err.to_string()))
    }
}

/// Answers every prompt with its default. Used when no terminal is attached.
#[derive(Debug, Default)]
pub struct DefaultPrompter;

impl Prompter for DefaultPrompter {
    fn choose(&mut self, _message: &str, _options: &[String], default: usize) -> Result<usize> {
        Ok(default)
    }

    fn confirm(&mut self, _message: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn select_many(
        &mut self,
        _message: &str,
        _options: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>> {
        Ok(defaults
            .iter()
            .enumerate()
            .filter_map(|(index, selected)| selected.then_some(index))
            .collect())
    }
}

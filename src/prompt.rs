//! Interaction mode and yes/no confirmation.

use std::io::IsTerminal;

use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use thiserror::Error;

/// Whether the process may block waiting for user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    NonInteractive,
}

impl Mode {
    /// Interactive only when not disabled and both stdin and stdout are terminals.
    pub fn detect(non_interactive: bool) -> Self {
        if !non_interactive && std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
        {
            Mode::Interactive
        } else {
            Mode::NonInteractive
        }
    }

    pub fn is_interactive(self) -> bool {
        self == Mode::Interactive
    }
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("failed to read answer: {0}")]
    Dialoguer(#[from] dialoguer::Error),
}

/// Asks the user a yes/no question. Only called in interactive mode.
pub trait Prompter: Send + Sync {
    fn confirm(&self, question: &str) -> Result<bool, PromptError>;
}

impl<P: Prompter + ?Sized> Prompter for std::sync::Arc<P> {
    fn confirm(&self, question: &str) -> Result<bool, PromptError> {
        (**self).confirm(question)
    }
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str) -> Result<bool, PromptError> {
        let answer = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(true)
            .interact_opt()?;
        // Esc / q counts as "no"
        Ok(answer.unwrap_or(false))
    }
}

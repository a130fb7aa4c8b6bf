// pgmigrate/src/utils/prompt.rs
use std::io::{Write, stdin, stdout};

use crate::errors::{AppError, Result};

/// Asks the operator for a line of input.
pub trait Prompt: Send + Sync {
    fn ask(&self, question: &str) -> Result<String>;

    /// Like [`Prompt::ask`], but the answer is not echoed.
    fn ask_secret(&self, question: &str) -> Result<String>;
}

/// Reads answers from the terminal.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&self, question: &str) -> Result<String> {
        print!("{}", question);
        stdout().flush().map_err(|e| AppError::io("<stdout>", e))?;
        let mut input = String::new();
        stdin()
            .read_line(&mut input)
            .map_err(|e| AppError::io("<stdin>", e))?;
        Ok(input.trim().to_string())
    }

    fn ask_secret(&self, question: &str) -> Result<String> {
        rpassword::prompt_password(question).map_err(|e| AppError::io("<tty>", e))
    }
}

//! Operator confirmation for destructive steps.

use crate::error::Result;
use std::io::{BufRead, Write};

/// Asks the operator before something irreversible happens
#[cfg_attr(test, mockall::automock)]
pub trait Confirmation: Send + Sync {
    /// `Ok(true)` only on an explicit yes
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Blocking prompt on stderr, answered on stdin
pub struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        read_confirmation(prompt, &mut input, &mut std::io::stderr())
    }
}

/// Write `prompt`, read one line and interpret it. End of input counts as no.
pub fn read_confirmation<R: BufRead, W: Write>(
    prompt: &str,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    write!(output, "{} [y/N]: ", prompt)?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        writeln!(output)?;
        return Ok(false);
    }
    Ok(is_affirmative(&answer))
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use crate::models::{ReviewDecision, Story};
use crate::review::DecisionSource;

/// Line-oriented operator input
pub trait Prompt {
    /// Show `message` and return the next line of input, trimmed.
    fn ask(&mut self, message: &str) -> Result<String>;
}

/// Interactive stdin/stdout operator
pub struct Console<R: BufRead> {
    input: R,
}

impl Console<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> Console<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Pasted notes, ending at a line reading `DONE` or at end of input.
    pub fn read_notes(&mut self) -> Result<String> {
        read_until_done(&mut self.input)
    }
}

impl<R: BufRead> Prompt for Console<R> {
    fn ask(&mut self, message: &str) -> Result<String> {
        print!("{}", message);
        io::stdout().flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        if read == 0 {
            anyhow::bail!("Input closed");
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead> DecisionSource for Console<R> {
    fn ask_decision(&mut self, _story: &Story) -> ReviewDecision {
        match self.ask("Create this story in Jira? (y/n/q to quit): ") {
            Ok(answer) => ReviewDecision::from_answer(&answer),
            // Nobody left to answer: stop rather than skip through the rest.
            Err(_) => ReviewDecision::QuitRemaining,
        }
    }
}

pub fn read_until_done<R: BufRead>(reader: R) -> Result<String> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read notes")?;
        if line.trim().eq_ignore_ascii_case("DONE") {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_until_done_stops_at_marker() {
        let input = Cursor::new("Standup notes\n  - ship SSO\n done \nignored\n");
        assert_eq!(read_until_done(input).unwrap(), "Standup notes\n  - ship SSO");
    }

    #[test]
    fn test_read_until_done_accepts_eof() {
        let input = Cursor::new("only line");
        assert_eq!(read_until_done(input).unwrap(), "only line");
    }

    #[test]
    fn test_ask_trims_and_errors_on_eof() {
        let mut console = Console::new(Cursor::new("  KAN \n"));
        assert_eq!(console.ask("Project: ").unwrap(), "KAN");
        assert!(console.ask("Again: ").is_err());
    }

    #[test]
    fn test_decisions_from_console() {
        let story = Story {
            summary: "s".to_string(),
            description: "d".to_string(),
            acceptance_criteria: vec![],
        };
        let mut console = Console::new(Cursor::new("y\nn\nq\n"));
        assert_eq!(console.ask_decision(&story), ReviewDecision::Create);
        assert_eq!(console.ask_decision(&story), ReviewDecision::Skip);
        assert_eq!(console.ask_decision(&story), ReviewDecision::QuitRemaining);
        assert_eq!(console.ask_decision(&story), ReviewDecision::QuitRemaining);
    }
}

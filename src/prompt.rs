use crate::error::ManagerError;
use std::io::{self, BufRead, ErrorKind, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Choice {
    Index(usize),
    Skip,
}

/// Operator interaction used by the core: yes/no confirmation and picking one
/// entry out of a numbered list.
pub(crate) trait Prompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool, ManagerError>;

    fn choose(&self, header: &str, options: &[String]) -> Result<Choice, ManagerError>;
}

/// Reads answers line by line from stdin. EOF counts as "no" / "skip".
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TerminalPrompter;

impl TerminalPrompter {
    fn ask(&self, prompt: &str) -> Result<Option<String>, ManagerError> {
        let mut stdout = io::stdout();
        print!("{prompt}");
        stdout.flush().map_err(prompt_failure)?;

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => {
                println!();
                Ok(None)
            }
            Ok(_) => Ok(Some(line)),
            Err(err) if err.kind() == ErrorKind::Interrupted => Err(ManagerError::Interrupted),
            Err(err) => Err(prompt_failure(err)),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool, ManagerError> {
        let choices = if default { "Y/n" } else { "y/N" };
        match self.ask(&format!("{question} [{choices}]: "))? {
            Some(answer) => Ok(parse_confirmation(&answer, default)),
            None => Ok(false),
        }
    }

    fn choose(&self, header: &str, options: &[String]) -> Result<Choice, ManagerError> {
        println!();
        println!("{header}");
        for (index, option) in options.iter().enumerate() {
            println!("  [{index}] {option}");
        }
        loop {
            let Some(answer) = self.ask("Select an index (or 's' to skip): ")? else {
                println!("No input available; skipping");
                return Ok(Choice::Skip);
            };
            match parse_choice(&answer, options.len()) {
                Some(choice) => return Ok(choice),
                None => println!("Invalid selection. Enter a listed index or 's' to skip."),
            }
        }
    }
}

fn prompt_failure(err: io::Error) -> ManagerError {
    ManagerError::CommandExecution(format!("failed to read operator input: {err}"))
}

pub(crate) fn parse_confirmation(answer: &str, default: bool) -> bool {
    let answer = answer.trim().to_ascii_lowercase();
    if answer.is_empty() {
        return default;
    }
    matches!(answer.as_str(), "y" | "yes")
}

/// `None` means the answer was neither a skip nor an index in `0..len`.
pub(crate) fn parse_choice(answer: &str, len: usize) -> Option<Choice> {
    let answer = answer.trim().to_ascii_lowercase();
    if matches!(answer.as_str(), "" | "s" | "skip" | "n" | "no") {
        return Some(Choice::Skip);
    }
    answer
        .parse::<usize>()
        .ok()
        .filter(|index| *index < len)
        .map(Choice::Index)
}

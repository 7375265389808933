//! Deterministic stand-ins for the process runner and the operator.

use crate::config::Connection;
use crate::error::ManagerError;
use crate::process::{CmdOutput, ProcessRunner, RunOutcome};
use crate::prompt::{Choice, Prompter, parse_choice, parse_confirmation};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

pub(crate) fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

pub(crate) fn connection(name: &str, login_command: &str) -> Connection {
    Connection {
        name: name.to_string(),
        login_command: login_command.to_string(),
    }
}

pub(crate) fn completed(code: i32, stdout: &str, stderr: &str) -> RunOutcome {
    RunOutcome::Completed(CmdOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    })
}

pub(crate) fn failed(stderr: &str) -> RunOutcome {
    completed(1, "", stderr)
}

/// Replays queued outcomes in order and records every argv. Once the queue
/// is empty every run succeeds with empty output.
#[derive(Debug, Default)]
pub(crate) struct FakeRunner {
    outcomes: RefCell<VecDeque<RunOutcome>>,
    calls: RefCell<Vec<Vec<String>>>,
    timeouts: RefCell<Vec<Option<Duration>>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, outcome: RunOutcome) {
        self.outcomes.borrow_mut().push_back(outcome);
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    pub(crate) fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts.borrow().clone()
    }

    pub(crate) fn calls_to(&self, program: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|argv| argv.first().is_some_and(|first| first == program))
            .count()
    }

    pub(crate) fn calls_with(&self, needle: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|argv| argv.windows(needle.len()).any(|window| window == needle))
            .count()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, argv: &[String], timeout: Option<Duration>) -> Result<RunOutcome, ManagerError> {
        self.calls.borrow_mut().push(argv.to_vec());
        self.timeouts.borrow_mut().push(timeout);
        Ok(self
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| completed(0, "", "")))
    }

    fn run_interactive(&self, argv: &[String]) -> Result<Option<i32>, ManagerError> {
        self.calls.borrow_mut().push(argv.to_vec());
        self.timeouts.borrow_mut().push(None);
        match self.outcomes.borrow_mut().pop_front() {
            Some(RunOutcome::Completed(output)) => Ok(output.code),
            Some(RunOutcome::TimedOut) => Ok(None),
            None => Ok(Some(0)),
        }
    }
}

/// Answers prompts from a script. Running out of answers means "no" / "skip".
#[derive(Debug, Default)]
pub(crate) struct ScriptedPrompter {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub(crate) fn new(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|answer| (*answer).to_string()).collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    fn next_answer(&self) -> Option<String> {
        self.answers.borrow_mut().pop_front()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool, ManagerError> {
        self.asked.borrow_mut().push(question.to_string());
        Ok(self
            .next_answer()
            .is_some_and(|answer| parse_confirmation(&answer, default)))
    }

    fn choose(&self, header: &str, options: &[String]) -> Result<Choice, ManagerError> {
        self.asked.borrow_mut().push(header.to_string());
        while let Some(answer) = self.next_answer() {
            if let Some(choice) = parse_choice(&answer, options.len()) {
                return Ok(choice);
            }
        }
        Ok(Choice::Skip)
    }
}

//! Scripted [`ShellExecutor`] for tests: no device, no `su`, fully
//! deterministic.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;

use crate::{
    error::ShellError,
    shell::{ShellExecutor, ShellResult},
};

/// What a scripted rule makes a command produce.
pub(crate) enum Outcome {
    /// Exit code 0 with the given stdout lines.
    Lines(Vec<String>),
    /// A non-zero exit with the given stderr lines.
    Failure { exit_code: i32, stderr: Vec<String> },
    /// The session itself is gone: [`ShellError::Unavailable`].
    Unavailable,
    /// The command deadline elapsed: [`ShellError::Timeout`].
    Timeout,
}

type Effect = Box<dyn Fn(&str) + Send + Sync>;

struct Rule {
    prefix: String,
    outcome: Outcome,
    effect: Option<Effect>,
}

/// A shell whose answers are scripted by command prefix.
///
/// Rules are matched latest-first, so a test can take a prepared shell and
/// override single commands. Commands with no matching rule succeed with
/// empty output. Every command is recorded for assertions.
#[derive(Default)]
pub(crate) struct ScriptedShell {
    rules: Vec<Rule>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, prefix: &str, outcome: Outcome) -> Self {
        self.rules.push(Rule { prefix: prefix.to_string(), outcome, effect: None });
        self
    }

    /// Like [`Self::on`], with a side effect run when the rule fires. Used to
    /// emulate commands that materialize staged files.
    pub(crate) fn on_do(
        mut self,
        prefix: &str,
        outcome: Outcome,
        effect: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            outcome,
            effect: Some(Box::new(effect)),
        });
        self
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn count_containing(&self, needle: &str) -> usize {
        self.commands.lock().unwrap().iter().filter(|c| c.contains(needle)).count()
    }
}

#[async_trait]
impl ShellExecutor for ScriptedShell {
    async fn run(&self, command: &str) -> Result<ShellResult, ShellError> {
        self.commands.lock().unwrap().push(command.to_string());
        let Some(rule) = self.rules.iter().rev().find(|r| command.starts_with(&r.prefix)) else {
            return Ok(ShellResult::default());
        };
        if let Some(effect) = &rule.effect {
            effect(command);
        }
        match &rule.outcome {
            Outcome::Lines(lines) => {
                Ok(ShellResult { exit_code: 0, stdout: lines.clone(), stderr: vec![] })
            }
            Outcome::Failure { exit_code, stderr } => {
                Ok(ShellResult { exit_code: *exit_code, stdout: vec![], stderr: stderr.clone() })
            }
            Outcome::Unavailable => Err(ShellError::Unavailable("scripted".into())),
            Outcome::Timeout => Err(ShellError::Timeout {
                command: command.to_string(),
                timeout: Duration::from_secs(0),
            }),
        }
    }
}

/// One `ls -bAll` entry line with a fixed owner and timestamp.
pub(crate) fn ls_line(mode: &str, name: &str, size: u64) -> String {
    format!("{mode} 1 u0_a247 u0_a247 {size} 2021-01-19 01:03:29.000000000 +0100 {name}")
}

/// The fragments of `dumpsys package` output the version query looks for.
pub(crate) fn dumpsys_output(version_name: &str, version_code: i64) -> Vec<String> {
    vec![
        "Packages:".into(),
        format!("    versionCode={version_code} minSdk=26 targetSdk=30"),
        format!("    versionName={version_name}"),
    ]
}

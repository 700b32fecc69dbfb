use std::collections::HashMap;
use std::path::PathBuf;

use super::error::ProcessError;
use super::runner::ProcessCommand;

/// Assembles a [`ProcessCommand`] from the pieces an `exec` call supplies
#[derive(Debug, Clone)]
pub struct ProcessCommandBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    stdin: Option<String>,
}

impl ProcessCommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            stdin: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a variable on top of the inherited environment
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a variable written as `KEY=VALUE`; the value may itself contain `=`
    pub fn env_assignment(self, assignment: &str) -> Result<Self, ProcessError> {
        match assignment.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(self.env(key, value)),
            _ => Err(ProcessError::InvalidEnv(assignment.to_string())),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn build(self) -> ProcessCommand {
        ProcessCommand {
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            stdin: self.stdin,
        }
    }
}

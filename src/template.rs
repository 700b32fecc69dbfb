//! Request template expansion
//!
//! Request bodies may be written as Tera templates. Besides the standard Tera
//! syntax, three helpers are available:
//!
//! ```text
//! {{ exec(cmd="date", args=["+%F"]) | trim }}     captured stdout of a process
//! {{ exec(cmd="token", env=["TZ=UTC"], cwd="/srv") }}  ... with extra env and a working dir
//! {% for id in ids | lines %}...{% endfor %}      split text on line endings
//! {{ env(name="ACCOUNT", default="demo") }}        environment lookup
//! ```
//!
//! Processes started by `exec` get an empty stdin unless the template passes
//! `stdin="..."` explicitly; the invocation's own stdin is usually the
//! template itself and has already been consumed.

use std::collections::HashMap;
use std::sync::Arc;

use tera::{Context, Tera, Value};
use tracing::debug;

use crate::error::{ErrorCode, Result, SoapCallError};
use crate::subprocess::{
    ProcessCommand, ProcessCommandBuilder, ProcessError, ProcessOutput, ProcessRunner,
    StdProcessRunner,
};

const TEMPLATE_NAME: &str = "request";

/// Capabilities the template helpers are allowed to reach
pub trait TemplateHost: Send + Sync {
    fn run_process(&self, command: ProcessCommand) -> std::result::Result<ProcessOutput, ProcessError>;
    fn env_var(&self, name: &str) -> Option<String>;
}

/// Host backed by a process runner and either the real environment or a fixed map
pub struct RuntimeHost {
    runner: Arc<dyn ProcessRunner>,
    vars: Option<HashMap<String, String>>,
}

impl RuntimeHost {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner, vars: None }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(StdProcessRunner))
    }

    /// Serve environment lookups from `vars` instead of the process environment
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = Some(vars);
        self
    }
}

impl TemplateHost for RuntimeHost {
    fn run_process(&self, command: ProcessCommand) -> std::result::Result<ProcessOutput, ProcessError> {
        self.runner.run(command)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }
}

/// Expands a request template into the literal body sent over the wire
#[derive(Clone)]
pub struct TemplateExpander {
    host: Arc<dyn TemplateHost>,
}

impl TemplateExpander {
    pub fn new(host: Arc<dyn TemplateHost>) -> Self {
        Self { host }
    }

    /// Expand `template` in a single pass
    pub fn expand(&self, template: &str) -> Result<String> {
        debug!("Expanding request template ({} bytes)", template.len());

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_function("exec", exec_helper(Arc::clone(&self.host)));
        tera.register_function("env", env_helper(Arc::clone(&self.host)));
        tera.register_function("lines", lines_function);
        tera.register_filter("lines", lines_filter);

        tera.add_raw_template(TEMPLATE_NAME, template).map_err(|e| {
            SoapCallError::template_with_code(ErrorCode::TEMPLATE_PARSE, describe(&e))
        })?;

        let rendered = tera
            .render(TEMPLATE_NAME, &Context::new())
            .map_err(|e| {
                let code = if caused_by_process(&e) {
                    ErrorCode::TEMPLATE_HELPER_FAILED
                } else {
                    ErrorCode::TEMPLATE_RENDER
                };
                SoapCallError::template_with_code(code, describe(&e))
            })?;

        debug!("Template expanded to {} bytes", rendered.len());
        Ok(rendered)
    }
}

fn exec_helper(host: Arc<dyn TemplateHost>) -> impl tera::Function {
    move |args: &HashMap<String, Value>| -> tera::Result<Value> {
        let program = args
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("exec: missing required string argument `cmd`"))?;

        let mut builder = ProcessCommandBuilder::new(program);
        match args.get("args") {
            None => {}
            Some(Value::Array(values)) => {
                builder = builder.args(values.iter().map(value_to_arg));
            }
            Some(other) => {
                return Err(tera::Error::msg(format!(
                    "exec: `args` must be an array, got {other}"
                )))
            }
        }
        match args.get("env") {
            None => {}
            Some(Value::Array(values)) => {
                for value in values {
                    builder = builder
                        .env_assignment(&value_to_arg(value))
                        .map_err(|e| tera::Error::chain("exec: bad `env` entry", e))?;
                }
            }
            Some(other) => {
                return Err(tera::Error::msg(format!(
                    "exec: `env` must be an array of KEY=VALUE strings, got {other}"
                )))
            }
        }
        if let Some(dir) = args.get("cwd").and_then(Value::as_str) {
            builder = builder.current_dir(dir);
        }
        if let Some(stdin) = args.get("stdin").and_then(Value::as_str) {
            builder = builder.stdin(stdin);
        }

        let command = builder.build();
        let display = command.display();
        host.run_process(command)
            .and_then(ProcessOutput::into_stdout)
            .map(Value::String)
            .map_err(|e| tera::Error::chain(format!("exec `{display}` failed"), e))
    }
}

fn env_helper(host: Arc<dyn TemplateHost>) -> impl tera::Function {
    move |args: &HashMap<String, Value>| -> tera::Result<Value> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("env: missing required string argument `name`"))?;

        let value = host.env_var(name).unwrap_or_else(|| {
            args.get("default")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        });
        Ok(Value::String(value))
    }
}

fn lines_function(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = args
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("lines: missing required string argument `text`"))?;
    Ok(split_lines(text))
}

fn lines_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("lines: expected a string, got {value}")))?;
    Ok(split_lines(text))
}

/// Split on `\n` or `\r\n`; a trailing line ending does not add an empty line
fn split_lines(text: &str) -> Value {
    Value::Array(
        text.lines()
            .map(|line| Value::String(line.to_string()))
            .collect(),
    )
}

fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten a Tera error and its causes into one line
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn caused_by_process(err: &tera::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.downcast_ref::<ProcessError>().is_some() {
            return true;
        }
        source = cause.source();
    }
    false
}

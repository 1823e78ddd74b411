// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Executor Agent
//
// Runs one unit of concrete work (a training run, an eval script) as a
// subprocess and reports the outcome as a RESULT entry. The process runs on
// its own task so the agent keeps answering steers and STOP while it waits.

use crate::application::agent::{AgentBehavior, StepContext, StepResult};
use crate::application::agents::parse_params;
use crate::domain::agent::AgentSpec;
use crate::domain::entry::EntryType;
use crate::domain::runtime::{AgentError, RuntimeError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Bytes of stdout/stderr kept in the RESULT payload.
const OUTPUT_TAIL: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_fail_on_error")]
    pub fail_on_error: bool,
}

fn default_fail_on_error() -> bool {
    true
}

#[derive(Debug)]
struct RunOutcome {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    duration: Duration,
    timed_out: bool,
}

pub struct ExecutorAgent {
    params: ExecutorParams,
    task: Option<JoinHandle<std::io::Result<RunOutcome>>>,
}

impl ExecutorAgent {
    pub fn from_spec(spec: &AgentSpec) -> Result<Self, RuntimeError> {
        let params: ExecutorParams = parse_params(spec)?;
        if params.command.trim().is_empty() {
            return Err(RuntimeError::SpawnValidation(
                "executor params.command cannot be empty".into(),
            ));
        }
        Ok(Self { params, task: None })
    }

    async fn run(params: ExecutorParams) -> std::io::Result<RunOutcome> {
        let mut cmd = tokio::process::Command::new(&params.command);
        cmd.args(&params.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &params.env {
            cmd.env(key, value);
        }

        let start_time = Instant::now();
        let child = cmd.spawn()?;
        debug!(pid = ?child.id(), command = %params.command, "Executor process spawned");

        let output = child.wait_with_output();
        let result = match params.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), output).await,
            None => Ok(output.await),
        };

        match result {
            Ok(output) => {
                let output = output?;
                Ok(RunOutcome {
                    exit_code: output.status.code(),
                    stdout: tail(&output.stdout),
                    stderr: tail(&output.stderr),
                    duration: start_time.elapsed(),
                    timed_out: false,
                })
            }
            // Dropping the wait future kills the child (kill_on_drop)
            Err(_) => Ok(RunOutcome {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                duration: start_time.elapsed(),
                timed_out: true,
            }),
        }
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let count = text.chars().count();
    if count <= OUTPUT_TAIL {
        return text.into_owned();
    }
    text.chars().skip(count - OUTPUT_TAIL).collect()
}

#[async_trait]
impl AgentBehavior for ExecutorAgent {
    async fn on_start(&mut self, ctx: &StepContext) -> Result<(), AgentError> {
        info!(agent_id = %ctx.agent_id(), command = %self.params.command, args = ?self.params.args, "Starting executor process");
        self.task = Some(tokio::spawn(Self::run(self.params.clone())));
        ctx.report_status("executing", Some(serde_json::json!({ "command": self.params.command })))
            .await;
        Ok(())
    }

    async fn step(&mut self, ctx: &StepContext) -> Result<StepResult, AgentError> {
        let finished = self.task.as_ref().is_some_and(|task| task.is_finished());
        if !finished {
            return Ok(StepResult::Idle);
        }
        let Some(task) = self.task.take() else {
            return Err(AgentError::Invalid("executor process was never started".into()));
        };

        let outcome = task
            .await
            .map_err(|e| AgentError::Other(format!("executor task failed: {e}")))??;
        let success = !outcome.timed_out && outcome.exit_code == Some(0);

        ctx.report(
            EntryType::Result,
            serde_json::json!({
                "command": self.params.command,
                "exit_code": outcome.exit_code,
                "success": success,
                "timed_out": outcome.timed_out,
                "stdout": outcome.stdout,
                "stderr": outcome.stderr,
                "duration_ms": outcome.duration.as_millis() as u64,
            }),
        )?;

        if outcome.timed_out {
            return Err(AgentError::Other(format!(
                "{} timed out after {}s",
                self.params.command,
                self.params.timeout_secs.unwrap_or_default()
            )));
        }
        if !success && self.params.fail_on_error {
            return Err(AgentError::Other(format!(
                "{} exited with {}",
                self.params.command,
                outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".into())
            )));
        }

        Ok(StepResult::Done {
            reflection: format!(
                "{} finished with exit code {} in {} ms",
                self.params.command,
                outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".into()),
                outcome.duration.as_millis()
            ),
        })
    }

    async fn on_stop(&mut self, ctx: &StepContext) -> Result<(), AgentError> {
        if let Some(task) = self.task.take() {
            debug!(agent_id = %ctx.agent_id(), "Aborting executor process");
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(params: serde_json::Value) -> AgentSpec {
        AgentSpec::new("executor").with_params(params)
    }

    #[test]
    fn test_params_validation() {
        assert!(ExecutorAgent::from_spec(&spec(serde_json::json!({"command": "  "}))).is_err());
        assert!(ExecutorAgent::from_spec(&spec(serde_json::json!({"args": ["x"]}))).is_err());

        let agent =
            ExecutorAgent::from_spec(&spec(serde_json::json!({"command": "python", "args": ["train.py"]})))
                .unwrap();
        assert!(agent.params.fail_on_error);
        assert_eq!(agent.params.args, vec!["train.py"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output_and_timeout() {
        let params: ExecutorParams = serde_json::from_value(serde_json::json!({
            "command": "sh",
            "args": ["-c", "echo hello; echo oops >&2; exit 3"]
        }))
        .unwrap();
        let outcome = ExecutorAgent::run(params).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.stderr.trim(), "oops");

        let slow: ExecutorParams = serde_json::from_value(serde_json::json!({
            "command": "sleep",
            "args": ["5"],
            "timeout_secs": 0
        }))
        .unwrap();
        assert!(ExecutorAgent::run(slow).await.unwrap().timed_out);
    }

    #[test]
    fn test_tail_keeps_end_of_output() {
        let long = "x".repeat(OUTPUT_TAIL) + "END";
        let kept = tail(long.as_bytes());
        assert_eq!(kept.len(), OUTPUT_TAIL);
        assert!(kept.ends_with("END"));
    }
}

//! Periodic wake-up: evaluate every habit and deliver what is due.
//!
//! Output is JSON lines on stdout: one `nudge` line per delivered nudge
//! (unless a delivery command is configured) followed by one `report` line.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use clap::Args;
use serde_json::json;
use streakline_core::{Config, Database, Delivery, DeliveryError, Engine, NudgeKind};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;

use super::{parse_datetime, CmdResult};

#[derive(Args)]
pub struct WakeArgs {
    /// Pretend it is this time (YYYY-MM-DDTHH:MM, default: now)
    #[arg(long)]
    at: Option<String>,
}

fn nudge_json(kind: NudgeKind, title: &str, body: &str, habit_id: Option<&str>) -> serde_json::Value {
    json!({
        "type": "nudge",
        "kind": kind,
        "title": title,
        "body": body,
        "habit_id": habit_id,
    })
}

/// Prints each nudge as a JSON line.
struct StdoutDelivery;

impl Delivery for StdoutDelivery {
    fn send(
        &self,
        kind: NudgeKind,
        title: &str,
        body: &str,
        target_habit_id: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let line = nudge_json(kind, title, body, target_habit_id);
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").map_err(|e| DeliveryError::Unavailable(e.to_string()))
    }
}

/// Pipes each nudge as JSON into a shell command; exit status 0 confirms
/// the handoff. A command still running after `timeout` is killed.
struct CommandDelivery {
    command: String,
    timeout: Duration,
    runtime: Handle,
}

impl CommandDelivery {
    async fn hand_off(&self, kind: NudgeKind, payload: String) -> Result<(), DeliveryError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeliveryError::Unavailable(format!("{}: {e}", self.command)))?;

        let handoff = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload.as_bytes()).await?;
            }
            child.wait_with_output().await
        };

        // dropping the timed-out handoff drops, and so kills, the child
        let output = tokio::time::timeout(self.timeout, handoff)
            .await
            .map_err(|_| DeliveryError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                kind: kind.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Delivery for CommandDelivery {
    fn send(
        &self,
        kind: NudgeKind,
        title: &str,
        body: &str,
        target_habit_id: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let payload = nudge_json(kind, title, body, target_habit_id).to_string();
        // runs on the cycle's blocking thread, outside any async context
        self.runtime.block_on(self.hand_off(kind, payload))
    }
}

pub fn run(args: WakeArgs) -> CmdResult {
    let now = parse_datetime(args.at.as_deref())?;
    let config = Config::load()?;
    let timeout_secs = config.wake.timeout_secs;
    let engine = Engine::with_config(Database::open()?, &config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let delivery: Box<dyn Delivery + Send> = match config.wake.delivery_command.clone() {
        Some(command) => Box::new(CommandDelivery {
            command,
            timeout: Duration::from_secs(config.wake.delivery_timeout_secs),
            runtime: runtime.handle().clone(),
        }),
        None => Box::new(StdoutDelivery),
    };
    let outcome = runtime.block_on(async move {
        let cycle =
            tokio::task::spawn_blocking(move || engine.run_cycle(now, &*delivery));
        tokio::time::timeout(Duration::from_secs(timeout_secs), cycle).await
    });

    let report = match outcome {
        Ok(joined) => joined??,
        Err(_) => {
            // the blocking task cannot be cancelled; let it die with the process.
            // Its reservations go stale after the same timeout.
            runtime.shutdown_background();
            tracing::warn!(timeout_secs, "wake cycle timed out");
            return Err(format!(
                "wake cycle timed out after {timeout_secs}s; it will be retried on the next wake-up"
            )
            .into());
        }
    };

    println!("{}", json!({ "type": "report", "report": report }));
    Ok(())
}

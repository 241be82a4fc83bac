//! Console Dispatch Loop
//!
//! Reads one command per line, dispatches it against the registry snapshot current at that
//! moment, and writes capability output and notices back.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::dispatcher::dispatch;
use crate::common::HostResult;
use crate::config::FaultPolicy;
use crate::registry::CapabilityRegistry;

pub const QUIT_COMMAND: &str = "quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// `quit` was entered; the shared token has been cancelled.
    Quit,
    EndOfInput,
    Cancelled,
}

/// Runs the dispatch loop until `quit`, end of input, or cancellation.
///
/// Lines are trimmed before matching. Blank lines are ignored. Capability handlers run on the
/// blocking pool.
pub async fn run_console<R, W>(
    registry: Arc<CapabilityRegistry>,
    input: R,
    mut output: W,
    cancel: &CancellationToken,
    policy: FaultPolicy,
) -> HostResult<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ConsoleExit::Cancelled),
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            debug!("Console input closed");
            return Ok(ConsoleExit::EndOfInput);
        };

        let command = line.trim().to_string();
        if command.is_empty() {
            continue;
        }

        if command.eq_ignore_ascii_case(QUIT_COMMAND) {
            info!("Quit requested");
            cancel.cancel();
            return Ok(ConsoleExit::Quit);
        }

        let snapshot = registry.snapshot();
        let dispatched = tokio::task::spawn_blocking(move || {
            let outcome = dispatch(&snapshot, &command, policy);
            (command, outcome)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let (command, outcome) = match dispatched {
            (command, Ok(outcome)) => (command, outcome),
            (_, Err(aborted)) => {
                output.write_all(&aborted.outcome.output).await?;
                output.flush().await?;
                return Err(aborted.fault.into());
            }
        };

        output.write_all(&outcome.output).await?;
        for fault in &outcome.faults {
            output.write_all(format!("{fault}\n").as_bytes()).await?;
        }
        if outcome.is_unrecognized() {
            output
                .write_all(format!("unrecognized command: {command}\n").as_bytes())
                .await?;
        }
        output.flush().await?;
    }
}

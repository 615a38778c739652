//! Builder orchestration
//!
//! Process primitives plus the builder driver that turns a build definition
//! into a filesystem tree:
//! - `LocalExport`: `buildx build --output type=local`
//! - `ImageRoundTrip`: build and load an image, then `docker cp` it out
//!   through `tar`

mod docker;
mod driver;
mod factory;
mod image_roundtrip;
mod local_export;

pub use docker::DockerCli;
pub use driver::{BuildDriver, BuildRequest, Buildx};
pub use factory::create_driver;
pub use image_roundtrip::ImageRoundTrip;
pub use local_export::LocalExport;

use crate::error::{DanceError, DanceResult};
use std::fmt;
use std::io;
use std::process::{ExitStatus, Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from a configured argv prefix such as `["sudo", "docker"]`
    pub fn from_prefix(key: &str, prefix: &[String]) -> DanceResult<Self> {
        let (program, args) = prefix
            .split_first()
            .ok_or_else(|| DanceError::setting(key, "command must not be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Child processes die with their handle so an abandoned transfer
    /// does not leave builders running
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

fn check_status(command: &CommandLine, status: io::Result<ExitStatus>) -> DanceResult<()> {
    let status = status.map_err(|e| DanceError::command_failed(command.to_string(), e))?;
    if status.success() {
        debug!("Command succeeded: {}", command);
        Ok(())
    } else {
        Err(DanceError::CommandExit {
            command: command.to_string(),
            code: status.code(),
        })
    }
}

/// Run a command with inherited output and wait for it to succeed
pub async fn run(command: &CommandLine) -> DanceResult<()> {
    debug!("Executing: {}", command);

    let mut child = command
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| DanceError::command_failed(command.to_string(), e))?;

    check_status(command, child.wait().await)
}

/// Run a command and capture its output without checking the exit status
pub async fn run_captured(command: &CommandLine) -> DanceResult<Output> {
    debug!("Executing: {}", command);

    command
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| DanceError::command_failed(command.to_string(), e))
}

/// Run a command with `input` written to its stdin
pub async fn run_with_input(command: &CommandLine, input: &str) -> DanceResult<()> {
    debug!("Executing with stdin: {}", command);

    let mut child = command
        .command()
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| DanceError::command_failed(command.to_string(), e))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| DanceError::Internal("child stdin was not piped".to_string()))?;
    let feed = async move {
        let written = stdin.write_all(input.as_bytes()).await;
        // EOF for the child
        drop(stdin);
        written
    };

    let (written, status) = tokio::join!(feed, child.wait());
    check_status(command, status)?;
    written.map_err(|e| DanceError::io(format!("writing stdin of {}", command), e))
}

/// Run `first | second`, waiting for both sides to finish
pub async fn run_piped(first: &CommandLine, second: &CommandLine) -> DanceResult<()> {
    debug!("Executing piped: {} | {}", first, second);

    let mut producer = first
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| DanceError::command_failed(first.to_string(), e))?;

    // kill_on_drop reaps the producer if the consumer cannot start
    let mut consumer = second
        .command()
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| DanceError::command_failed(second.to_string(), e))?;

    let mut source = producer
        .stdout
        .take()
        .ok_or_else(|| DanceError::Internal("producer stdout was not piped".to_string()))?;
    let mut sink = consumer
        .stdin
        .take()
        .ok_or_else(|| DanceError::Internal("consumer stdin was not piped".to_string()))?;

    let pump = async move {
        let copied = tokio::io::copy(&mut source, &mut sink).await;
        drop(sink);
        copied
    };

    let (pumped, first_status, second_status) =
        tokio::join!(pump, producer.wait(), consumer.wait());

    check_status(first, first_status)?;
    check_status(second, second_status)?;
    let bytes = pumped
        .map_err(|e| DanceError::io(format!("piping {} into {}", first, second), e))?;
    debug!("Piped {} bytes", bytes);
    Ok(())
}

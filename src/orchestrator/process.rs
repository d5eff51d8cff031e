//! Per-process state tracked by the orchestrator.
//!
//! A slot moves `NotStarted -> Running -> Exited` and never back. Every
//! liveness answer comes from a fresh `try_wait`, so a process that died
//! since the last look is noticed (and reaped) immediately.

use super::error::Role;
use std::ffi::OsStr;
use std::io::{self, PipeReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Interval between liveness polls while waiting with a deadline.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
pub(crate) enum ProcessSlot {
    #[default]
    NotStarted,
    Running(Child),
    Exited(ExitStatus),
}

impl ProcessSlot {
    pub(crate) fn is_started(&self) -> bool {
        !matches!(self, ProcessSlot::NotStarted)
    }

    pub(crate) fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            ProcessSlot::Exited(status) => Some(*status),
            _ => None,
        }
    }

    /// Poll the OS; reaps the child and moves to `Exited` if it has gone.
    pub(crate) fn is_alive(&mut self, role: Role) -> bool {
        let ProcessSlot::Running(child) = self else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(%role, pid = child.id(), %status, "process exited");
                *self = ProcessSlot::Exited(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                // Keep treating it as alive; terminate() will still reap it.
                tracing::warn!(%role, pid = child.id(), error = %e, "failed to poll process");
                true
            }
        }
    }

    /// Block until the process has exited on its own, for at most `timeout`.
    /// Returns true if it exited.
    pub(crate) fn wait_for_exit(&mut self, role: Role, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_alive(role) {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        true
    }

    /// Send SIGTERM and reap. With `kill_after` set, a process that is still
    /// around once it elapses is killed outright.
    pub(crate) fn terminate(&mut self, role: Role, kill_after: Option<Duration>) {
        if !self.is_alive(role) {
            return;
        }
        let ProcessSlot::Running(child) = self else {
            return;
        };
        let pid = child.id();
        tracing::debug!(%role, pid, "terminating process");
        if let Err(e) = send_terminate(child) {
            tracing::warn!(%role, pid, error = %e, "failed to signal process");
        }

        if let Some(grace) = kill_after {
            if !self.wait_for_exit(role, grace) {
                if let ProcessSlot::Running(child) = self {
                    tracing::warn!(%role, pid, ?grace, "process ignored SIGTERM, killing");
                    if let Err(e) = child.kill() {
                        tracing::warn!(%role, pid, error = %e, "failed to kill process");
                    }
                }
            }
        }

        if let ProcessSlot::Running(child) = self {
            match child.wait() {
                Ok(status) => {
                    tracing::debug!(%role, pid, %status, "process reaped");
                    *self = ProcessSlot::Exited(status);
                }
                Err(e) => tracing::warn!(%role, pid, error = %e, "failed to reap process"),
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    kill(pid, Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Spawn `program args...` with stdout and stderr both writing into one new
/// pipe, returning the child and the pipe's read end.
///
/// The `Command` (and with it the parent's copies of the write end) is
/// dropped before returning, so the reader sees end-of-stream as soon as the
/// child and anything it handed the pipe to are gone.
pub(crate) fn spawn_merged<I, S>(
    program: &OsStr,
    args: I,
    stdin: Stdio,
) -> io::Result<(Child, PipeReader)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let (reader, writer) = io::pipe()?;
    let err_writer = writer.try_clone()?;

    let mut cmd = Command::new(program);
    cmd.args(args).stdin(stdin).stdout(writer).stderr(err_writer);
    let child = cmd.spawn()?;
    drop(cmd);

    Ok((child, reader))
}

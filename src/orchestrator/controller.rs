//! Pipeline lifecycle controller.
//!
//! Runs the probe with its output piped into the encoder, streams the
//! encoder's output to a consumer and tears both processes down again.

use super::consumer::{LineConsumer, StdoutConsumer};
use super::error::{PipelineError, Role};
use super::process::{spawn_merged, ProcessSlot, POLL_INTERVAL};
use crate::model::{EncoderOptions, PipelineConfig};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, PipeReader};
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Exit statuses of both pipeline processes, `None` until reaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitStatuses {
    pub probe: Option<ExitStatus>,
    pub encoder: Option<ExitStatus>,
}

#[derive(Debug, Default)]
struct Processes {
    started: bool,
    cancelled: bool,
    probe: ProcessSlot,
    encoder: ProcessSlot,
}

impl Processes {
    fn slot(&mut self, role: Role) -> &mut ProcessSlot {
        match role {
            Role::Probe => &mut self.probe,
            Role::Encoder => &mut self.encoder,
        }
    }
}

/// A single twping invocation with its output encoded as JSON.
///
/// `run` blocks the calling thread; `terminate` and `running` may be called
/// from any other thread while it does (share the pipeline behind an `Arc`).
pub struct TwpingPipeline {
    probe_args: Vec<OsString>,
    config: PipelineConfig,
    procs: Mutex<Processes>,
}

impl TwpingPipeline {
    pub fn new<I, S>(probe_args: I, config: PipelineConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            probe_args: probe_args.into_iter().map(Into::into).collect(),
            config,
            procs: Mutex::new(Processes::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Processes> {
        self.procs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the probe through the encoder, blocking until the encoder's
    /// output ends and both processes have been reaped.
    ///
    /// Lines go to `consumer`, or to stdout when it is `None`. Returns
    /// `Ok(true)` only if both processes exited successfully; a non-zero exit
    /// or a process killed mid-run is `Ok(false)`. Spawn failures are the
    /// only errors, and are returned after any started process was stopped.
    ///
    /// # Panics
    ///
    /// If called more than once on the same pipeline.
    pub fn run(
        &self,
        options: EncoderOptions,
        consumer: Option<&mut dyn LineConsumer>,
    ) -> Result<bool, PipelineError> {
        let mut stdout_consumer;
        let consumer: &mut dyn LineConsumer = match consumer {
            Some(c) => c,
            None => {
                stdout_consumer = StdoutConsumer::stdout();
                &mut stdout_consumer
            }
        };

        let Some(output) = self.start(options)? else {
            tracing::info!("pipeline terminated before it started");
            return Ok(false);
        };
        let unwind = TerminateOnUnwind(self);
        let lines = stream_lines(output, consumer);
        drop(unwind);

        // A cleanly finishing encoder closes its output just before exiting;
        // let it (and then the probe) exit on their own before signalling.
        if self.settle(Role::Encoder) {
            self.settle(Role::Probe);
        }
        self.terminate();

        let statuses = self.exit_statuses();
        let ok = is_success(statuses.encoder) && is_success(statuses.probe);
        tracing::info!(
            lines,
            ok,
            probe = ?statuses.probe,
            encoder = ?statuses.encoder,
            "pipeline finished"
        );
        Ok(ok)
    }

    /// Spawn probe then encoder under the lock and hand back the encoder's
    /// merged output. `None` if `terminate` got here first.
    fn start(&self, options: EncoderOptions) -> Result<Option<PipeReader>, PipelineError> {
        let mut procs = self.lock();
        assert!(
            !procs.started,
            "TwpingPipeline::run may only be called once per pipeline"
        );
        procs.started = true;
        if procs.cancelled {
            return Ok(None);
        }

        let (program, args) = self
            .probe_args
            .split_first()
            .ok_or(PipelineError::EmptyProbeCommand)?;
        let (probe, probe_out) = spawn_merged(program, args, Stdio::inherit())
            .map_err(|e| PipelineError::spawn(Role::Probe, program, e))?;
        tracing::info!(pid = probe.id(), program = ?program, "probe started");
        procs.probe = ProcessSlot::Running(probe);

        let encoder_bin = &self.config.encoder_bin;
        let flags = options.flags();
        match spawn_merged(encoder_bin.as_os_str(), &flags, Stdio::from(probe_out)) {
            Ok((encoder, output)) => {
                tracing::info!(pid = encoder.id(), program = %encoder_bin.display(), ?flags, "encoder started");
                procs.encoder = ProcessSlot::Running(encoder);
                Ok(Some(output))
            }
            Err(e) => {
                tracing::warn!(program = %encoder_bin.display(), error = %e, "encoder failed to start");
                self.terminate_locked(&mut procs);
                Err(PipelineError::spawn(Role::Encoder, encoder_bin, e))
            }
        }
    }

    /// Give `role` up to the settle timeout to exit by itself. Returns true
    /// if it is gone and exited successfully.
    fn settle(&self, role: Role) -> bool {
        let deadline = Instant::now() + self.config.settle_timeout;
        loop {
            {
                let mut procs = self.lock();
                let slot = procs.slot(role);
                if !slot.is_alive(role) {
                    return is_success(slot.exit_status());
                }
            }
            if Instant::now() >= deadline {
                tracing::debug!(%role, "process still running after output ended");
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Stop the pipeline: SIGTERM and reap the encoder, then the probe.
    ///
    /// Safe to call at any time, from any thread, any number of times.
    /// Processes that were never started or have already exited are left
    /// alone. Called before `run`, it makes that `run` return `Ok(false)`
    /// without spawning anything.
    pub fn terminate(&self) {
        let mut procs = self.lock();
        procs.cancelled = true;
        self.terminate_locked(&mut procs);
    }

    fn terminate_locked(&self, procs: &mut Processes) {
        debug_assert!(!procs.encoder.is_started() || procs.probe.is_started());
        // Encoder first, so neither side is left blocked on a half-closed pipe.
        procs.encoder.terminate(Role::Encoder, self.config.kill_after);
        procs.probe.terminate(Role::Probe, self.config.kill_after);
    }

    /// True while both the probe and the encoder are alive.
    pub fn running(&self) -> bool {
        let mut procs = self.lock();
        procs.probe.is_alive(Role::Probe) && procs.encoder.is_alive(Role::Encoder)
    }

    pub fn exit_statuses(&self) -> ExitStatuses {
        let procs = self.lock();
        ExitStatuses {
            probe: procs.probe.exit_status(),
            encoder: procs.encoder.exit_status(),
        }
    }
}

impl Drop for TwpingPipeline {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Tears the pipeline down if the consumer panics while lines are streaming.
struct TerminateOnUnwind<'a>(&'a TwpingPipeline);

impl Drop for TerminateOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::warn!("line consumer panicked, stopping pipeline");
            self.0.terminate();
        }
    }
}

fn is_success(status: Option<ExitStatus>) -> bool {
    status.is_some_and(|s| s.success())
}

/// Feed every line of `output` to `consumer` until end-of-stream. Returns the
/// number of lines delivered.
fn stream_lines(output: PipeReader, consumer: &mut dyn LineConsumer) -> usize {
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    let mut lines = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                for line in decode_lines(&buf) {
                    consumer.on_line(&line);
                    lines += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading encoder output failed");
                break;
            }
        }
    }
    lines
}

/// Decode one `\n` terminated chunk. `\r\n` and a lone `\r` both end a
/// line and come out as `\n`, so a chunk may hold several lines.
fn decode_lines(buf: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(buf)
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    text.split_inclusive('\n').map(str::to_owned).collect()
}

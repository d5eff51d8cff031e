//! Process-pipeline orchestration.
//!
//! This module owns the probe -> encoder process chain: spawning both
//! processes, piping one into the other, streaming the encoder's output to a
//! consumer, and tearing the pipeline down again on completion, failure or
//! cancellation. CLI layers call into it and only see exit statuses.

mod consumer;
mod controller;
mod error;
mod process;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub(crate) use controller::TwpingPipeline;

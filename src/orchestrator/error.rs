//! Errors raised by the pipeline orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Which side of the pipeline a process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Probe,
    Encoder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Probe => f.write_str("probe"),
            Role::Encoder => f.write_str("encoder"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A process of the pipeline could not be launched. Any process that was
    /// already running has been terminated by the time this is returned.
    #[error("failed to spawn {role} process {program}: {source}")]
    Spawn {
        role: Role,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The probe was given no argv at all.
    #[error("probe command line is empty")]
    EmptyProbeCommand,
}

impl PipelineError {
    pub(crate) fn spawn(role: Role, program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Spawn {
            role,
            program: program.into(),
            source,
        }
    }
}

//! Launch-phase and supervision errors.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no free port found after {attempts} attempts starting at {start}")]
    PortAllocationExhausted { start: u16, attempts: u32 },

    #[error("R interpreter not found: {program}")]
    InterpreterNotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start R process '{program}': {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Shiny server did not respond after {attempts} attempts ({waited:?})")]
    ReadinessTimeout { attempts: u32, waited: Duration },

    #[error("failed to build readiness probe client: {0}")]
    ProbeClient(#[from] reqwest::Error),

    #[error("R process exited unexpectedly ({})", describe_code(*code))]
    UnexpectedChildExit { code: Option<i32> },

    #[error("a child server is already running for this session")]
    AlreadyLaunched,

    #[error("window error: {message}")]
    Window { message: String },
}

impl LaunchError {
    pub fn spawn(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::InterpreterNotFound {
                program: program.to_string(),
                source,
            }
        } else {
            Self::SpawnFailure {
                program: program.to_string(),
                source,
            }
        }
    }

    pub fn window(err: impl std::fmt::Display) -> Self {
        Self::Window {
            message: err.to_string(),
        }
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

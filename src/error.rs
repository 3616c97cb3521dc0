use std::io;

use thiserror::Error;

/// Failures while running an external tool (ffmpeg/ffprobe).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch `{tool}`: {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error while waiting for `{tool}`: {source}")]
    Wait {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("`{tool}` timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("`{tool}` exited with status {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Audio extraction failed. Always recovered by the synthetic fallback,
/// never surfaced as a fatal error.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("could not create temporary wav file: {0}")]
    TempFile(#[source] io::Error),

    #[error("could not read extracted wav: {0}")]
    WavRead(#[from] hound::Error),

    #[error("extracted audio stream is empty")]
    EmptyStream,

    #[error("unsupported wav encoding: {bits} bits per sample")]
    UnsupportedFormat { bits: u16 },
}

/// Duration metadata probe failed. Recovered via layered fallbacks.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("no parseable duration in probe output")]
    Unparseable,
}

//! Error taxonomy, per-layer.
//!
//! Mirrors the teacher's pattern of one `thiserror` enum per concern plus a
//! blanket top-level enum that the rest of the crate actually propagates.

use thiserror::Error;

/// Errors from the byte-pipe layer (`Connection`).
#[derive(Error, Debug)]
pub enum ConnError {
    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} closed")]
    Exit { name: String },
}

/// Errors from the directory/command protocol decoder.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed protocol frame: {0}")]
    Malformed(String),
}

/// Errors from `CommandLineModel` mutation (the `ModelUnderflow` of spec §7).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("cursor or delete went out of range")]
    Underflow,
}

/// Fatal setup-time errors from PTY allocation.
#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to allocate pty: {0}")]
    Alloc(String),
    #[error("failed to spawn shell: {0}")]
    Spawn(String),
}

/// Top-level application error.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("connection error: {0}")]
    Conn(#[from] ConnError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("pty error: {0}")]
    Pty(#[from] PtyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

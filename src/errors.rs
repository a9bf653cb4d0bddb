//! Error types for the nextblog notes service.
//!
//! This module defines the error enums that categorize failures in the note
//! store, configuration, server startup and token handling.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the note store and the service around it.
#[derive(Error, Debug)]
pub enum BlogError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// A shard file exists but could not be parsed.
    #[error("Corrupt shard file {path}: {message}")]
    CorruptShard { path: PathBuf, message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// The HTTP server could not be started.
    #[error("Server error: {message}")]
    ServerError { message: String },

    /// Token signing or verification failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Reasons a bearer token is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header missing")]
    MissingHeader,

    #[error("Invalid authorization header")]
    MalformedHeader,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Invalid credentials")]
    InvalidCredentials,
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the HEC transport.

/// Errors produced while building, feeding or draining a HEC connection.
///
/// `Resolution`, `Request`, `Transport` and `RemoteRejection` are fatal for the
/// connection that produced them. The tag errors are local and only fail the
/// call that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum HecError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("failed to resolve endpoint {endpoint}: {reason}")]
    Resolution { endpoint: String, reason: String },

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid status {status} ({status_line})\n{body}")]
    RemoteRejection {
        status: u16,
        status_line: String,
        body: String,
    },

    #[error("invalid tag name {name:?}: {reason}")]
    InvalidTagName { name: String, reason: String },

    #[error("tag {0:?} not found")]
    TagNotFound(String),

    #[error("tag table is full")]
    TagTableFull,

    #[error("failed to encode entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("upload stream is closed")]
    StreamClosed,
}

impl HecError {
    pub(crate) fn resolution(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        HecError::Resolution {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that leave the connection unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            HecError::InvalidTagName { .. }
                | HecError::TagNotFound(_)
                | HecError::TagTableFull
                | HecError::Encode(_)
        )
    }
}

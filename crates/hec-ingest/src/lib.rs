// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP Event Collector transport for synthetic log generators.
//!
//! [`HecConnection`] implements the same [`IngestTransport`] contract as the
//! indexer transport (tag negotiation, batched writes, draining on close,
//! source address reporting) but ships entries to a HEC endpoint over one
//! long-lived streaming HTTP request.
//!
//! - [`resolver`]: source address discovery
//! - [`tags`]: tag name/id negotiation
//! - [`encoder`]: raw and JSON event wire encodings
//! - [`pipeline`]: the streaming upload worker
//! - [`connection`]: the facade tying them together

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod connection;
pub mod encoder;
pub mod entry;
pub mod errors;
pub mod http;
pub mod pipeline;
pub mod resolver;
pub mod tags;
pub mod transport;

pub use config::{EmbedStrategy, HecConfig, HecMode};
pub use connection::HecConnection;
pub use entry::{Entry, TagId, Timestamp};
pub use errors::HecError;
pub use transport::IngestTransport;

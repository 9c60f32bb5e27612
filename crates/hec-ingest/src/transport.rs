// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::entry::{Entry, TagId, Timestamp};

/// The contract a generator needs from an ingest transport.
///
/// Matches the shape of the indexer-facing transport so a generator can run
/// against either one.
#[async_trait]
pub trait IngestTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn write(&self, ts: Timestamp, tag: TagId, data: &[u8]) -> Result<(), Self::Error> {
        self.write_entry(&Entry::new(ts, tag, data)).await
    }

    async fn write_entry(&self, entry: &Entry) -> Result<(), Self::Error>;

    /// Writes entries in order and stops at the first failure. Entries before
    /// the failing one have already been handed to the transport.
    async fn write_batch(&self, entries: &[Entry]) -> Result<(), Self::Error> {
        for entry in entries {
            self.write_entry(entry).await?;
        }
        Ok(())
    }

    fn negotiate_tag(&self, name: &str) -> Result<TagId, Self::Error>;

    fn lookup_tag(&self, tag: TagId) -> Option<String>;

    /// Id of an already negotiated tag.
    fn get_tag(&self, name: &str) -> Result<TagId, Self::Error>;

    fn source_ip(&self) -> IpAddr;

    /// Waits until the backend is ready to take entries.
    async fn wait_for_hot(&self, timeout: Duration) -> Result<(), Self::Error>;

    /// Waits until written entries are durable on the backend.
    async fn sync(&self, timeout: Duration) -> Result<(), Self::Error>;

    /// Drains and shuts down the transport, returning its final outcome.
    async fn close(&self) -> Result<(), Self::Error>;
}

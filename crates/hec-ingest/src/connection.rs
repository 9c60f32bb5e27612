// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HEC connection: the transport a generator writes through.

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info, trace};

use crate::config::{HecConfig, HecMode};
use crate::encoder::Encoder;
use crate::entry::{Entry, TagId};
use crate::errors::HecError;
use crate::http::build_client;
use crate::pipeline::{PipelineState, UploadPipeline, UploadTarget};
use crate::resolver::probe_source_ip;
use crate::tags::TagTable;
use crate::transport::IngestTransport;

/// A single-use connection to a HEC endpoint.
///
/// Construction probes the collector for the local source address and opens
/// the one streaming request every write feeds. Errors from the request are
/// reported by [`IngestTransport::close`]; a closed or failed connection
/// cannot be reused.
pub struct HecConnection {
    endpoint: Url,
    src: IpAddr,
    tags: Mutex<TagTable>,
    encoder: Encoder,
    pipeline: UploadPipeline,
}

impl HecConnection {
    /// Validates `config`, discovers the source address and starts the upload.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(config: &HecConfig) -> Result<Self, HecError> {
        config.validate()?;
        let endpoint = config.endpoint()?;

        let src = probe_source_ip(&endpoint, config.timeout).await?;
        let client = build_client(config)?;

        let target = UploadTarget {
            url: endpoint.clone(),
            authorization: config.authorization(),
            user_agent: config.name.clone(),
            sourcetype: (config.mode == HecMode::Raw).then(|| config.tag.clone()),
        };
        let pipeline = UploadPipeline::start(client, target, config.channel_depth);

        info!(
            "HEC | Connected to {} from {} ({:?} mode, default tag {})",
            endpoint, src, config.mode, config.tag
        );

        Ok(HecConnection {
            endpoint,
            src,
            tags: Mutex::new(TagTable::new(&config.tag)),
            encoder: Encoder::new(config.mode, config.embed, config.tag.clone()),
            pipeline,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[must_use]
    pub fn mode(&self) -> HecMode {
        self.encoder.mode()
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Snapshot of negotiated tag names in id order.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.tag_table().names().map(str::to_string).collect()
    }

    fn tag_table(&self) -> MutexGuard<'_, TagTable> {
        self.tags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IngestTransport for HecConnection {
    type Error = HecError;

    async fn write_entry(&self, entry: &Entry) -> Result<(), HecError> {
        let chunk = self.encoder.encode(entry)?;
        trace!("HEC | Writing {} bytes for tag {}", chunk.len(), entry.tag);
        self.pipeline.send(chunk).await
    }

    fn negotiate_tag(&self, name: &str) -> Result<TagId, HecError> {
        let id = self.tag_table().negotiate(name)?;
        debug!("HEC | Negotiated tag {} as {}", name, id);
        Ok(id)
    }

    fn lookup_tag(&self, tag: TagId) -> Option<String> {
        self.tag_table().lookup(tag).map(str::to_string)
    }

    fn get_tag(&self, name: &str) -> Result<TagId, HecError> {
        self.tag_table().resolve(name)
    }

    fn source_ip(&self) -> IpAddr {
        self.src
    }

    // HEC has no warm-up phase; the request is already open.
    async fn wait_for_hot(&self, _timeout: Duration) -> Result<(), HecError> {
        Ok(())
    }

    // Nothing to flush short of ending the body.
    async fn sync(&self, _timeout: Duration) -> Result<(), HecError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), HecError> {
        debug!("HEC | Closing upload to {}", self.endpoint);
        self.pipeline.finish().await
    }
}

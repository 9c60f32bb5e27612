// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local source address discovery.
//!
//! The indexer transport reports the address entries were sent from. Over
//! HTTP we learn it once by dialing the collector and reading back the local
//! half of the socket the OS picked for that route.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Url;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use crate::errors::HecError;

/// `host:port` of the collector, using the scheme's default port when the
/// URL does not carry one.
pub fn endpoint_addr(url: &Url) -> Result<String, HecError> {
    let host = url
        .host_str()
        .ok_or_else(|| HecError::resolution(url.as_str(), "missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| HecError::resolution(url.as_str(), "missing port"))?;
    // IPv6 literals keep their brackets in host_str
    Ok(format!("{host}:{port}"))
}

/// Opens and immediately closes a TCP connection to the collector and returns
/// the local IP the connection used.
pub async fn probe_source_ip(url: &Url, connect_timeout: Duration) -> Result<IpAddr, HecError> {
    let endpoint = endpoint_addr(url)?;

    let remote = lookup_host(endpoint.as_str())
        .await
        .map_err(|e| HecError::resolution(&endpoint, e))?
        .next()
        .ok_or_else(|| HecError::resolution(&endpoint, "no addresses returned"))?;

    let stream = timeout(connect_timeout, TcpStream::connect(remote))
        .await
        .map_err(|_| {
            HecError::resolution(
                &endpoint,
                format!("connect timed out after {connect_timeout:?}"),
            )
        })?
        .map_err(|e| HecError::resolution(&endpoint, e))?;

    let local = stream
        .local_addr()
        .map_err(|e| HecError::resolution(&endpoint, e))?;
    drop(stream);

    debug!("HEC | Probed {endpoint} ({remote}) from {}", local.ip());
    Ok(local.ip())
}

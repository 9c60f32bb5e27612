// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The single streaming upload behind a HEC connection.
//!
//! ```text
//!   writers ──Bytes──► bounded mpsc ──► request body ──► POST (one per connection)
//!                                                          │
//!   finish() ◄──────────── oneshot outcome ◄───────────────┘
//! ```
//!
//! The request is opened as soon as the pipeline starts and stays open until
//! the write side is dropped, which ends the body. The status of that one
//! response is the connection's outcome. There is no retry: a failed pipeline
//! is discarded together with its connection.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Body, Response, StatusCode, Url};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::errors::HecError;

/// Maximum number of response body bytes kept in a rejection error.
pub const MAX_REJECTION_BODY: usize = 512;

/// Lifecycle of the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    /// Constructed, request not yet opened
    Idle = 0,
    /// The request is open and its body is fed by writes
    Streaming = 1,
    /// The outcome has been produced
    Terminated = 2,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Idle,
            1 => PipelineState::Streaming,
            _ => PipelineState::Terminated,
        }
    }
}

/// Everything attached to the request when it is opened. Never renegotiated.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub url: Url,
    pub authorization: String,
    pub user_agent: String,
    /// Set in raw mode; sent as the `sourcetype` query parameter.
    pub sourcetype: Option<String>,
}

impl UploadTarget {
    fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        if let Some(sourcetype) = &self.sourcetype {
            url.query_pairs_mut().append_pair("sourcetype", sourcetype);
        }
        url
    }
}

type Outcome = Result<(), HecError>;

pub struct UploadPipeline {
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    outcome: Mutex<Option<oneshot::Receiver<Outcome>>>,
    state: Arc<AtomicU8>,
}

impl UploadPipeline {
    /// Spawns the upload worker on the current tokio runtime.
    ///
    /// `depth` bounds how many encoded chunks may wait for the request to
    /// consume them; writers wait once it is reached.
    #[must_use]
    pub fn start(client: reqwest::Client, target: UploadTarget, depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Bytes>(depth.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let state = Arc::new(AtomicU8::new(PipelineState::Idle as u8));

        let worker_state = Arc::clone(&state);
        tokio::spawn(async move {
            worker_state.store(PipelineState::Streaming as u8, Ordering::Release);
            let outcome = upload(&client, &target, receiver).await;
            match &outcome {
                Ok(()) => info!("HEC | Upload to {} completed", target.url),
                Err(e) => error!("HEC | Upload to {} failed: {}", target.url, e),
            }
            worker_state.store(PipelineState::Terminated as u8, Ordering::Release);
            if outcome_tx.send(outcome).is_err() {
                debug!("HEC | Upload outcome dropped, connection was never closed");
            }
        });

        UploadPipeline {
            sender: Mutex::new(Some(sender)),
            outcome: Mutex::new(Some(outcome_rx)),
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Hands one chunk to the request body, waiting for room in the channel.
    ///
    /// Fails with [`HecError::StreamClosed`] once the pipeline was finished or
    /// the request has already completed. The cause of an early completion is
    /// reported by [`UploadPipeline::finish`].
    pub async fn send(&self, chunk: Bytes) -> Result<(), HecError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(HecError::StreamClosed)?;
        sender.send(chunk).await.map_err(|_| HecError::StreamClosed)
    }

    /// Ends the request body and waits for the outcome.
    ///
    /// Only the first call observes the outcome; later calls return `Ok(())`.
    pub async fn finish(&self) -> Result<(), HecError> {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let receiver = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match receiver {
            Some(receiver) => receiver.await.unwrap_or_else(|_| {
                error!("HEC | Upload worker exited without an outcome");
                Err(HecError::StreamClosed)
            }),
            None => {
                debug!("HEC | Upload already finished");
                Ok(())
            }
        }
    }
}

async fn upload(
    client: &reqwest::Client,
    target: &UploadTarget,
    receiver: mpsc::Receiver<Bytes>,
) -> Outcome {
    let body = Body::wrap_stream(futures::stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|chunk| (Ok::<Bytes, std::io::Error>(chunk), receiver))
    }));

    let request = client
        .post(target.request_url())
        .header(AUTHORIZATION, target.authorization.as_str())
        .header(USER_AGENT, target.user_agent.as_str())
        .body(body)
        .build()
        .map_err(|e| HecError::Request(e.to_string()))?;

    debug!("HEC | Opening upload to {}", request.url());
    let response = client.execute(request).await?;
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(());
    }

    let body = read_prefix(response, MAX_REJECTION_BODY).await;
    Err(HecError::RemoteRejection {
        status: status.as_u16(),
        status_line: status_line(status),
        body,
    })
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_str()),
        None => status.as_str().to_string(),
    }
}

/// Reads at most `limit` bytes of the response body.
///
/// The bytes are decoded lossily: invalid UTF-8, including a multi-byte
/// character split by the `limit` cut, becomes U+FFFD.
async fn read_prefix(mut response: Response, limit: usize) -> String {
    let mut buf = Vec::with_capacity(limit);
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("HEC | Failed to read rejection body: {}", e);
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn target(url: &str, sourcetype: Option<&str>) -> UploadTarget {
        UploadTarget {
            url: Url::parse(url).unwrap(),
            authorization: "Splunk test-token".to_string(),
            user_agent: "pipeline-test".to_string(),
            sourcetype: sourcetype.map(str::to_string),
        }
    }

    #[test]
    fn test_request_url_appends_sourcetype() {
        let t = target("http://127.0.0.1:8088/services/collector/raw?channel=1", Some("gen"));
        assert_eq!(
            t.request_url().as_str(),
            "http://127.0.0.1:8088/services/collector/raw?channel=1&sourcetype=gen"
        );
        let t = target("http://127.0.0.1:8088/services/collector/event", None);
        assert_eq!(t.request_url().query(), None);
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            status_line(StatusCode::INTERNAL_SERVER_ERROR),
            "500 Internal Server Error"
        );
        assert_eq!(status_line(StatusCode::from_u16(599).unwrap()), "599");
    }

    #[tokio::test]
    async fn test_streams_chunks_into_one_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/services/collector/raw")
            .match_header("Authorization", "Splunk test-token")
            .match_header("User-Agent", "pipeline-test")
            .match_query(Matcher::UrlEncoded("sourcetype".into(), "gen".into()))
            .match_body("one\ntwo\n")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/services/collector/raw", server.url());
        let pipeline = UploadPipeline::start(reqwest::Client::new(), target(&url, Some("gen")), 1);
        pipeline.send(Bytes::from_static(b"one\n")).await.unwrap();
        pipeline.send(Bytes::from_static(b"two\n")).await.unwrap();
        pipeline.finish().await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Terminated);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejection_truncates_body() {
        let mut server = Server::new_async().await;
        let long_body = "x".repeat(2048);
        server
            .mock("POST", "/services/collector/event")
            .with_status(400)
            .with_body(&long_body)
            .create_async()
            .await;

        let url = format!("{}/services/collector/event", server.url());
        let pipeline = UploadPipeline::start(reqwest::Client::new(), target(&url, None), 4);
        pipeline.send(Bytes::from_static(b"{}\n")).await.unwrap();

        match pipeline.finish().await.unwrap_err() {
            HecError::RemoteRejection {
                status,
                status_line,
                body,
            } => {
                assert_eq!(status, 400);
                assert_eq!(status_line, "400 Bad Request");
                assert_eq!(body.len(), MAX_REJECTION_BODY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejection_body_cut_mid_character() {
        let mut server = Server::new_async().await;
        let body = format!("a{}", "\u{e9}".repeat(1000));
        server
            .mock("POST", "/services/collector/event")
            .with_status(400)
            .with_body(&body)
            .create_async()
            .await;

        let url = format!("{}/services/collector/event", server.url());
        let pipeline = UploadPipeline::start(reqwest::Client::new(), target(&url, None), 4);
        pipeline.send(Bytes::from_static(b"{}\n")).await.unwrap();

        match pipeline.finish().await.unwrap_err() {
            HecError::RemoteRejection { body: text, .. } => {
                // 511 bytes decode cleanly, the 512th is half of an 'é'
                assert!(text.starts_with(&body[..511]));
                assert!(text.ends_with('\u{fffd}'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_finish_is_ok() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let pipeline =
            UploadPipeline::start(reqwest::Client::new(), target(&server.url(), None), 4);
        assert!(pipeline.finish().await.is_err());
        assert!(pipeline.finish().await.is_ok());
    }

    #[tokio::test]
    async fn test_send_after_finish_fails() {
        let mut server = Server::new_async().await;
        server.mock("POST", "/").with_status(200).create_async().await;

        let pipeline =
            UploadPipeline::start(reqwest::Client::new(), target(&server.url(), None), 4);
        pipeline.finish().await.unwrap();

        let err = pipeline.send(Bytes::from_static(b"late\n")).await.unwrap_err();
        assert!(matches!(err, HecError::StreamClosed));
    }
}

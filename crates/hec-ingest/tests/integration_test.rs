// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hec_ingest::{
    EmbedStrategy, Entry, HecConfig, HecConnection, HecError, HecMode, IngestTransport, Timestamp,
};
use mockito::{Matcher, Server};
use std::time::Duration;

fn config(server: &Server, path: &str, mode: HecMode) -> HecConfig {
    HecConfig {
        mode,
        tag: "gen".to_string(),
        name: "integration-gen".to_string(),
        ..HecConfig::new(format!("{}{}", server.url(), path), "mock-token")
    }
}

#[tokio::test]
async fn raw_mode_streams_payload_with_newline() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/services/collector/raw")
        .match_header("Authorization", "Splunk mock-token")
        .match_header("User-Agent", "integration-gen")
        .match_query(Matcher::UrlEncoded("sourcetype".into(), "gen".into()))
        .match_body("{\"a\":1}\n")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let conn = HecConnection::connect(&config(&server, "/services/collector/raw", HecMode::Raw))
        .await
        .expect("failed to connect");
    conn.write(Timestamp::now(), 0, br#"{"a":1}"#)
        .await
        .expect("write failed");
    conn.close().await.expect("close failed");

    mock.assert_async().await;
}

#[tokio::test]
async fn event_mode_batch_is_one_request() {
    let mut server = Server::new_async().await;
    let body = concat!(
        "{\"event\":\"hello\",\"time\":1700000000.5,\"sourcetype\":\"gen\"}\n",
        "{\"event\":{\"user\":\"bob\"},\"time\":1700000001.0,\"sourcetype\":\"gen\"}\n",
        "{\"event\":\"no time\",\"sourcetype\":\"gen\"}\n",
    );
    let mock = server
        .mock("POST", "/services/collector/event")
        .match_header("Authorization", "Splunk mock-token")
        .match_body(body)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let conn = HecConnection::connect(&config(
        &server,
        "/services/collector/event",
        HecMode::Event,
    ))
    .await
    .expect("failed to connect");

    let web = conn.negotiate_tag("web").expect("negotiate failed");
    let entries = vec![
        Entry::new(Timestamp::new(1_700_000_000, 500_000_000), 0, "hello"),
        Entry::new(Timestamp::new(1_700_000_001, 0), web, r#"{"user":"bob"}"#),
        Entry::new(Timestamp::new(-86_400, 0), web, "no time"),
    ];
    conn.write_batch(&entries).await.expect("batch failed");
    conn.close().await.expect("close failed");

    mock.assert_async().await;
}

#[tokio::test]
async fn event_mode_string_strategy_quotes_objects() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/services/collector/event")
        .match_body(Matcher::Regex(r#"^\{"event":"\{\\"a\\":1\}","#.to_string()))
        .with_status(200)
        .create_async()
        .await;

    let conn = HecConnection::connect(&HecConfig {
        embed: EmbedStrategy::String,
        ..config(&server, "/services/collector/event", HecMode::Event)
    })
    .await
    .expect("failed to connect");
    conn.write(Timestamp::now(), 0, br#"{"a":1}"#)
        .await
        .expect("write failed");
    conn.close().await.expect("close failed");

    mock.assert_async().await;
}

#[tokio::test]
async fn rejection_is_reported_on_close() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/services/collector/event")
        .with_status(500)
        .with_body("server error")
        .create_async()
        .await;

    let conn = HecConnection::connect(&config(
        &server,
        "/services/collector/event",
        HecMode::Event,
    ))
    .await
    .expect("failed to connect");
    conn.write(Timestamp::now(), 0, b"doomed")
        .await
        .expect("write should be buffered");

    let err = conn.close().await.expect_err("close should fail");
    let text = err.to_string();
    assert!(text.contains("500"), "{text}");
    assert!(text.contains("server error"), "{text}");
    assert!(matches!(err, HecError::RemoteRejection { status: 500, .. }));

    // the outcome is only delivered once
    assert!(conn.close().await.is_ok());
}

#[tokio::test]
async fn source_ip_is_stable() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/services/collector/event")
        .with_status(200)
        .create_async()
        .await;

    let conn = HecConnection::connect(&config(
        &server,
        "/services/collector/event",
        HecMode::Event,
    ))
    .await
    .expect("failed to connect");

    let first = conn.source_ip();
    assert!(first.is_loopback());
    assert_eq!(conn.source_ip(), first);
    conn.close().await.expect("close failed");
    assert_eq!(conn.source_ip(), first);
}

#[tokio::test]
async fn unreachable_endpoint_fails_construction() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind failed");
        listener.local_addr().expect("no local addr").port()
    };
    let config = HecConfig {
        timeout: Duration::from_millis(500),
        ..HecConfig::new(format!("http://127.0.0.1:{port}/services/collector"), "t")
    };

    let err = HecConnection::connect(&config)
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, HecError::Resolution { .. }));
}

#[tokio::test]
async fn concurrent_writers_share_one_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/services/collector/raw")
        .match_query(Matcher::Any)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let conn = std::sync::Arc::new(
        HecConnection::connect(&HecConfig {
            channel_depth: 2,
            ..config(&server, "/services/collector/raw", HecMode::Raw)
        })
        .await
        .expect("failed to connect"),
    );

    let mut handles = Vec::new();
    for worker in 0..4 {
        let conn = std::sync::Arc::clone(&conn);
        handles.push(tokio::spawn(async move {
            let tag = conn
                .negotiate_tag(&format!("worker{worker}"))
                .expect("negotiate failed");
            for i in 0..25 {
                conn.write(Timestamp::now(), tag, format!("{worker}-{i}").as_bytes())
                    .await
                    .expect("write failed");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("writer panicked");
    }

    assert_eq!(conn.tags().len(), 5);
    conn.close().await.expect("close failed");
    mock.assert_async().await;
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, time::Duration};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hec_ingest::http::prepare_client_provider;
use hec_ingest::{Entry, HecConfig, HecConnection, IngestTransport, TagId, Timestamp};

const DEFAULT_COUNT: usize = 1000;
const DEFAULT_BATCH: usize = 100;
const HOT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("HEC_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if let Err(e) = prepare_client_provider() {
        error!("Error setting up TLS crypto provider: {e}");
        process::exit(1);
    }

    let config = match HecConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on hec-loadgen startup: {e}");
            process::exit(1);
        }
    };

    let count = env::var("HEC_LOADGEN_COUNT")
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(DEFAULT_COUNT);
    let batch = env::var("HEC_LOADGEN_BATCH")
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .filter(|&batch| batch > 0)
        .unwrap_or(DEFAULT_BATCH);
    let extra_tags = env::var("HEC_LOADGEN_TAGS")
        .map(|val| parse_tags(&val))
        .unwrap_or_default();

    let conn = match HecConnection::connect(&config).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("Failed to connect to {}: {e}", config.url);
            process::exit(1);
        }
    };
    info!("Streaming {count} entries to {} from {}", config.url, conn.source_ip());

    if let Err(e) = generate(&conn, &extra_tags, count, batch).await {
        error!("Generation stopped: {e}");
        // still drain so the collector's answer is logged
        if let Err(close_err) = conn.close().await {
            error!("Upload failed: {close_err}");
        }
        process::exit(1);
    }

    match conn.close().await {
        Ok(()) => info!("Sent {count} entries"),
        Err(e) => {
            error!("Upload failed: {e}");
            process::exit(1);
        }
    }
}

/// Drives any transport: negotiates tags, then writes `count` entries in
/// batches, round-robin over the tags.
async fn generate<T: IngestTransport>(
    transport: &T,
    extra_tags: &[String],
    count: usize,
    batch: usize,
) -> Result<(), T::Error> {
    let mut tags: Vec<TagId> = vec![0];
    for name in extra_tags {
        tags.push(transport.negotiate_tag(name)?);
    }
    transport.wait_for_hot(HOT_TIMEOUT).await?;

    let mut seq = 0;
    while seq < count {
        let entries: Vec<Entry> = (seq..count.min(seq + batch))
            .map(|n| {
                let tag = tags[n % tags.len()];
                let name = transport.lookup_tag(tag).unwrap_or_default();
                Entry::new(Timestamp::now(), tag, synthetic_payload(n, &name))
            })
            .collect();
        seq += entries.len();
        transport.write_batch(&entries).await?;
        debug!("Wrote {seq}/{count} entries");
    }

    transport.sync(HOT_TIMEOUT).await
}

fn parse_tags(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn synthetic_payload(seq: usize, tag: &str) -> String {
    const LEVELS: [&str; 4] = ["DEBUG", "INFO", "WARN", "ERROR"];
    if seq % 2 == 0 {
        format!(
            r#"{{"seq":{seq},"tag":"{tag}","level":"{}","msg":"synthetic entry {seq}"}}"#,
            LEVELS[seq % LEVELS.len()]
        )
    } else {
        format!("{} {tag} synthetic entry {seq}", LEVELS[seq % LEVELS.len()])
    }
}

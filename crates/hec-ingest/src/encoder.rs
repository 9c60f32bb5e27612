// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire encodings for HEC.
//!
//! Raw mode forwards the payload untouched with a trailing newline. Event mode
//! wraps each entry in a JSON object:
//!
//! ```text
//! {"event":<payload>,"time":1700000000.25,"sourcetype":"default"}
//! ```
//!
//! `time` and `sourcetype` are omitted when zero or empty. The sourcetype is
//! always the connection's default tag; HEC carries one sourcetype per
//! connection, not per entry.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde::Serialize;
use serde_json::value::RawValue;
use tracing::trace;

use crate::config::{EmbedStrategy, HecMode};
use crate::entry::Entry;
use crate::errors::HecError;

#[derive(Serialize)]
struct HecEvent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<Cow<'a, RawValue>>,
    #[serde(skip_serializing_if = "is_zero")]
    time: f64,
    #[serde(skip_serializing_if = "str::is_empty")]
    sourcetype: &'a str,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

fn looks_like_object(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == b'{' && data[data.len() - 1] == b'}'
}

fn has_whitespace(raw: &RawValue) -> bool {
    raw.get()
        .bytes()
        .any(|b| matches!(b, b' ' | b'\n' | b'\r' | b'\t'))
}

/// Encodes entries for a single connection.
///
/// Holds the alternation state used by [`EmbedStrategy::Alternate`], so each
/// connection alternates independently.
#[derive(Debug)]
pub struct Encoder {
    mode: HecMode,
    embed: EmbedStrategy,
    sourcetype: String,
    embed_next: AtomicBool,
}

impl Encoder {
    #[must_use]
    pub fn new(mode: HecMode, embed: EmbedStrategy, sourcetype: impl Into<String>) -> Self {
        Encoder {
            mode,
            embed,
            sourcetype: sourcetype.into(),
            embed_next: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn mode(&self) -> HecMode {
        self.mode
    }

    /// Encodes one entry into a self-contained, newline-terminated chunk.
    pub fn encode(&self, entry: &Entry) -> Result<Bytes, HecError> {
        match self.mode {
            HecMode::Raw => Ok(Self::encode_raw(&entry.data)),
            HecMode::Event => self.encode_event(entry),
        }
    }

    fn encode_raw(data: &[u8]) -> Bytes {
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.extend_from_slice(data);
        buf.push(b'\n');
        Bytes::from(buf)
    }

    fn encode_event(&self, entry: &Entry) -> Result<Bytes, HecError> {
        let record = HecEvent {
            event: self.event_value(&entry.data)?,
            time: entry.ts.epoch_seconds(),
            sourcetype: &self.sourcetype,
        };
        let mut buf = Vec::with_capacity(entry.data.len() + 64);
        serde_json::to_writer(&mut buf, &record)?;
        buf.push(b'\n');
        Ok(Bytes::from(buf))
    }

    fn event_value<'a>(&self, data: &'a [u8]) -> Result<Option<Cow<'a, RawValue>>, HecError> {
        if data.is_empty() {
            return Ok(None);
        }
        if looks_like_object(data) && self.should_embed() {
            if let Some(raw) = std::str::from_utf8(data)
                .ok()
                .and_then(|s| serde_json::from_str::<&RawValue>(s).ok())
            {
                if !has_whitespace(raw) {
                    return Ok(Some(Cow::Borrowed(raw)));
                }
                // one record per line: re-serialize compactly, keys keep their order
                let value: serde_json::Value = serde_json::from_str(raw.get())?;
                return Ok(Some(Cow::Owned(serde_json::value::to_raw_value(&value)?)));
            }
            trace!("HEC | Payload is not valid JSON, sending it as a string");
        }
        let quoted = serde_json::to_string(&String::from_utf8_lossy(data))?;
        Ok(Some(Cow::Owned(RawValue::from_string(quoted)?)))
    }

    fn should_embed(&self) -> bool {
        match self.embed {
            EmbedStrategy::Object => true,
            EmbedStrategy::String => false,
            EmbedStrategy::Alternate => self.embed_next.fetch_xor(true, Ordering::Relaxed),
        }
    }
}

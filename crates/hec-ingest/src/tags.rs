// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tag name negotiation.
//!
//! Tags are short names attached to every entry. The generator negotiates a
//! name once and gets back a small numeric id; ids are dense and assigned in
//! negotiation order, so the next id is always the current table size.

use std::collections::HashMap;

use crate::entry::TagId;
use crate::errors::HecError;

/// Longest tag name the backend accepts, in bytes.
pub const MAX_TAG_LENGTH: usize = 4096;

const FORBIDDEN_TAG_CHARS: &str = "!@#$%^&*()=+<>,.:;`\"'{[}]|\\";

/// Validates a tag name against the backend naming rules.
///
/// A valid tag:
/// - is not empty and at most [`MAX_TAG_LENGTH`] bytes
/// - contains no whitespace or control characters
/// - contains none of ``!@#$%^&*()=+<>,.:;`"'{[}]|\``
///
/// # Examples
///
/// ```
/// use hec_ingest::tags::check_tag;
///
/// assert!(check_tag("syslog").is_ok());
/// assert!(check_tag("web-access_2").is_ok());
/// assert!(check_tag("").is_err());
/// assert!(check_tag("bad tag").is_err());
/// assert!(check_tag("bad.tag").is_err());
/// ```
pub fn check_tag(name: &str) -> Result<(), HecError> {
    let invalid = |reason: String| HecError::InvalidTagName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("tag is empty".to_string()));
    }
    if name.len() > MAX_TAG_LENGTH {
        return Err(invalid(format!(
            "tag is {} bytes, the limit is {MAX_TAG_LENGTH}",
            name.len()
        )));
    }
    if let Some(ch) = name
        .chars()
        .find(|&ch| ch.is_whitespace() || ch.is_control() || FORBIDDEN_TAG_CHARS.contains(ch))
    {
        return Err(invalid(format!("forbidden character {ch:?}")));
    }
    Ok(())
}

/// Mapping between tag ids and tag names.
///
/// Id `0` always holds the default tag the table was created with. Names are
/// never removed, so ids are never reused.
#[derive(Debug, Clone)]
pub struct TagTable {
    names: Vec<String>,
    ids: HashMap<String, TagId>,
}

impl TagTable {
    /// Creates a table seeded with `default_tag` at id `0`.
    ///
    /// The default tag is not validated here; configuration validation owns that.
    #[must_use]
    pub fn new(default_tag: &str) -> Self {
        let mut ids = HashMap::new();
        ids.insert(default_tag.to_string(), 0);
        TagTable {
            names: vec![default_tag.to_string()],
            ids,
        }
    }

    /// Returns the id for `name`, assigning the next id if the name is new.
    pub fn negotiate(&mut self, name: &str) -> Result<TagId, HecError> {
        check_tag(name)?;
        if let Some(&id) = self.ids.get(name) {
            return Ok(id);
        }
        let id = TagId::try_from(self.names.len()).map_err(|_| HecError::TagTableFull)?;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        Ok(id)
    }

    #[must_use]
    pub fn lookup(&self, id: TagId) -> Option<&str> {
        self.names.get(usize::from(id)).map(String::as_str)
    }

    /// Reverse lookup over negotiated names. Never inserts.
    pub fn resolve(&self, name: &str) -> Result<TagId, HecError> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| HecError::TagNotFound(name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Tag names in id order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

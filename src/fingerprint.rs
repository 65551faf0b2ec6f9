//! Cache keys derived from the output-relevant part of a [`Config`].
//!
//! The configuration is serialized to a JSON object with the cosmetic
//! fields removed, then hashed as compact UTF-8 JSON with keys in sorted
//! order (serde_json's default map is a `BTreeMap`). Float formatting comes
//! from serde_json and does not depend on locale, so the same options give
//! the same digest on every machine.

use std::fmt;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::cache::{CacheEntry, Registry};
use crate::config::{Config, COSMETIC_FIELDS};
use crate::errors::AppError;

/// Lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != 64 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!(
                "invalid fingerprint '{}': expected 64 hex chars",
                raw
            ));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration with cosmetic fields removed, plus the digest once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedConfig {
    fields: Map<String, Value>,
    fingerprint: Option<Fingerprint>,
}

impl CleanedConfig {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Hash the fields and attach the digest.
    ///
    /// Fails with a fingerprint-guard error when a digest is already attached.
    pub fn compute_fingerprint(&mut self) -> Result<Fingerprint> {
        if self.fingerprint.is_some() {
            return Err(AppError::fingerprint_guard().into());
        }
        let canonical = canonical_json(&self.fields)?;
        let digest = Sha256::digest(canonical.as_bytes());
        let fingerprint = Fingerprint(format!("{digest:x}"));
        self.fingerprint = Some(fingerprint.clone());
        Ok(fingerprint)
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Copy of `config` without the fields that do not affect output bytes.
pub fn clean(config: &Config) -> Result<CleanedConfig> {
    let value = serde_json::to_value(config).context("failed to serialize configuration")?;
    let Value::Object(mut fields) = value else {
        return Err(anyhow!("configuration did not serialize to a JSON object"));
    };
    for key in COSMETIC_FIELDS {
        fields.remove(*key);
    }
    Ok(CleanedConfig {
        fields,
        fingerprint: None,
    })
}

/// Shorthand for `clean` followed by `compute_fingerprint`.
pub fn fingerprint_config(config: &Config) -> Result<CleanedConfig> {
    let mut cleaned = clean(config)?;
    cleaned.compute_fingerprint()?;
    Ok(cleaned)
}

fn canonical_json(fields: &Map<String, Value>) -> Result<String> {
    serde_json::to_string(fields).context("failed to encode configuration for hashing")
}

/// Anything that may carry a digest.
pub trait Fingerprinted {
    fn fingerprint_ref(&self) -> Option<&Fingerprint>;
}

impl Fingerprinted for CleanedConfig {
    fn fingerprint_ref(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }
}

impl Fingerprinted for CacheEntry {
    fn fingerprint_ref(&self) -> Option<&Fingerprint> {
        Some(&self.hash)
    }
}

/// Digest equality only. Fields are not compared, so entries written by a
/// build that knew more options still match as long as the digest does.
pub fn same_fingerprint(a: &impl Fingerprinted, b: &impl Fingerprinted) -> Result<bool> {
    match (a.fingerprint_ref(), b.fingerprint_ref()) {
        (Some(left), Some(right)) => Ok(left == right),
        _ => Err(anyhow!("cannot compare caches: a value has no fingerprint")),
    }
}

pub fn lookup<'a>(fingerprint: &Fingerprint, registry: &'a Registry) -> Option<&'a CacheEntry> {
    registry.entries().iter().find(|entry| &entry.hash == fingerprint)
}

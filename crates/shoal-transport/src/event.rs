//! Spawn events carried by the stream

use serde::Deserialize;
use shoal_core::{ShoalError, ShoalResult};

/// Request to bring one entity into the scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnEvent {
    pub url: String,
}

#[derive(Deserialize)]
struct SpawnPayload {
    #[serde(default)]
    url: Option<String>,
}

impl SpawnEvent {
    /// Parse a `{ "url": string }` payload.
    ///
    /// Unknown fields are ignored. Surrounding whitespace is trimmed from the
    /// url; a missing, null, empty or whitespace-only url is rejected.
    pub fn parse(payload: &str) -> ShoalResult<Self> {
        let raw: SpawnPayload = serde_json::from_str(payload)
            .map_err(|e| ShoalError::MalformedPayload(e.to_string()))?;

        match raw.url.map(|u| u.trim().to_string()) {
            Some(url) if !url.is_empty() => Ok(SpawnEvent { url }),
            _ => Err(ShoalError::MalformedPayload("missing url".into())),
        }
    }
}

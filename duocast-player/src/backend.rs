//! Backend collaborators
//!
//! Client-side contracts for the two external services the engine consumes:
//! the script generator (topic → segment catalog) and the TTS synthesizer
//! (segment turns → audio payload). [`BackendClient`] implements both over
//! HTTP against the generation backend; tests substitute their own
//! implementations.

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use duocast_common::models::{Catalog, SegmentDescriptor, SegmentId, Turn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Synthesized audio for one segment.
#[derive(Debug, Clone)]
pub struct TtsAudio {
    pub audio: Vec<u8>,
    pub mime_type: String,
}

/// Script-generation collaborator: produces a validated segment catalog.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn generate_catalog(&self, topic: &str, minutes: u32) -> Result<Catalog>;
}

/// Text-to-speech collaborator: the sole operation the fetch scheduler
/// invokes. Fails with a transport/service error; never retried internally.
#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, segment_id: SegmentId, turns: &[Turn]) -> Result<TtsAudio>;
}

#[derive(Debug, Serialize)]
struct ScriptRequest<'a> {
    topic: &'a str,
    minutes: u32,
}

#[derive(Debug, Deserialize)]
struct ScriptResponse {
    segments: Vec<SegmentDescriptor>,
    total_words: usize,
}

#[derive(Debug, Serialize)]
struct TtsSegmentRequest<'a> {
    #[serde(rename = "segmentId")]
    segment_id: SegmentId,
    turns: &'a [Turn],
}

#[derive(Debug, Deserialize)]
struct TtsSegmentResponse {
    #[allow(dead_code)]
    segment_id: SegmentId,
    base64: String,
    mime: String,
}

/// HTTP client for the generation backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`.
    ///
    /// `timeout` bounds each request; it is the backend's limit on a hung
    /// synthesis call, not a scheduler policy.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ScriptSource for BackendClient {
    async fn generate_catalog(&self, topic: &str, minutes: u32) -> Result<Catalog> {
        info!("Requesting chunked script: topic='{}' ({} min)", topic, minutes);

        let response = self
            .client
            .post(self.url("/generate-script-chunked/"))
            .json(&ScriptRequest { topic, minutes })
            .send()
            .await?
            .error_for_status()?;

        let script: ScriptResponse = response.json().await?;

        let catalog = Catalog::new(script.segments)
            .map_err(|e| Error::Catalog(e.to_string()))?;

        if catalog.total_words() != script.total_words {
            warn!(
                "Backend word count mismatch: derived {}, reported {}",
                catalog.total_words(),
                script.total_words
            );
        }

        info!(
            "Catalog loaded: {} segments, {} words",
            catalog.len(),
            catalog.total_words()
        );
        Ok(catalog)
    }
}

#[async_trait]
impl TtsClient for BackendClient {
    async fn synthesize(&self, segment_id: SegmentId, turns: &[Turn]) -> Result<TtsAudio> {
        debug!("Synthesizing segment {} ({} turns)", segment_id, turns.len());

        let response = self
            .client
            .post(self.url("/tts-segment/"))
            .json(&TtsSegmentRequest { segment_id, turns })
            .send()
            .await?
            .error_for_status()?;

        let body: TtsSegmentResponse = response.json().await?;

        let audio = BASE64
            .decode(body.base64.as_bytes())
            .map_err(|e| Error::Tts(format!("invalid base64 audio payload: {}", e)))?;

        if audio.is_empty() {
            return Err(Error::Tts(format!(
                "empty audio payload for segment {}",
                segment_id
            )));
        }

        debug!(
            "Segment {} synthesized: {} bytes ({})",
            segment_id,
            audio.len(),
            body.mime
        );
        Ok(TtsAudio {
            audio,
            mime_type: body.mime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tts_request_wire_shape() {
        let turns = vec![Turn {
            speaker: "Jay".to_string(),
            text: "hello".to_string(),
        }];
        let request = TtsSegmentRequest {
            segment_id: 4,
            turns: &turns,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["segmentId"], 4);
        assert_eq!(json["turns"][0]["speaker"], "Jay");
    }

    #[test]
    fn test_tts_response_parse() {
        let json = r#"{"segment_id": 2, "base64": "AAEC", "mime": "audio/wav"}"#;
        let response: TtsSegmentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.base64, "AAEC");
        assert_eq!(response.mime, "audio/wav");
        assert_eq!(BASE64.decode(response.base64).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            BackendClient::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("/tts-segment/"),
            "http://localhost:8080/tts-segment/"
        );
    }
}

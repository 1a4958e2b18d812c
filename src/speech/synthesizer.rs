//! Speech-synthesis backends.
//!
//! The dispatch queue only needs [`SpeechSynthesizer`]: speak one SSML
//! document, and stop whatever is being spoken. [`AzureSpeechSynthesizer`]
//! implements it over the Azure text-to-speech REST API.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SpeechConfig;
use crate::error::{AvatarError, Result};

/// Result of one successful synthesis call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisOutcome {
    /// Opaque id reported by the backend.
    pub result_id: String,
    /// Synthesized audio in the configured output format. May be empty for
    /// backends that render elsewhere.
    pub audio: Bytes,
}

/// A speech-synthesis backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one SSML document, resolving when it has been spoken.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Synthesis`] (or [`AvatarError::Auth`]) when the
    /// backend rejects the document, and [`AvatarError::Cancelled`] when
    /// [`stop_speaking`](Self::stop_speaking) cut it short.
    async fn speak_ssml(&self, ssml: &str) -> Result<SynthesisOutcome>;

    /// Best-effort stop of the in-flight synthesis.
    async fn stop_speaking(&self) -> Result<()>;
}

/// REST endpoint for the configured region or private endpoint.
pub fn synthesis_url(config: &SpeechConfig) -> String {
    match config.private_endpoint.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => {
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("wss://")
                .trim_end_matches('/');
            format!("https://{host}/tts/cognitiveservices/v1")
        }
        None => format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            config.region
        ),
    }
}

/// Azure text-to-speech over HTTP.
pub struct AzureSpeechSynthesizer {
    url: String,
    api_key: String,
    output_format: String,
    client: reqwest::Client,
    in_flight: Mutex<CancellationToken>,
}

impl std::fmt::Debug for AzureSpeechSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSpeechSynthesizer")
            .field("url", &self.url)
            .field("output_format", &self.output_format)
            .finish()
    }
}

impl AzureSpeechSynthesizer {
    pub fn new(config: &SpeechConfig) -> Self {
        Self::with_url(config, synthesis_url(config))
    }

    /// Use an explicit endpoint URL instead of the one derived from `config`.
    pub fn with_url(config: &SpeechConfig, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: config.api_key.clone(),
            output_format: config.output_format.clone(),
            client: reqwest::Client::new(),
            in_flight: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *guard = token.clone();
        token
    }

    async fn post(&self, ssml: &str) -> Result<SynthesisOutcome> {
        let response = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.output_format)
            .header("User-Agent", "avatar-chat")
            .body(ssml.to_owned())
            .send()
            .await
            .map_err(|e| AvatarError::Synthesis(format!("speech request failed: {e}")))?;

        let status = response.status();
        let result_id = response
            .headers()
            .get("X-RequestId")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => AvatarError::Auth(format!(
                    "speech service rejected credentials (result {result_id}): {body}"
                )),
                code => AvatarError::Synthesis(format!(
                    "speech service HTTP {code} (result {result_id}): {body}"
                )),
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| AvatarError::Synthesis(format!("reading audio failed: {e}")))?;
        Ok(SynthesisOutcome { result_id, audio })
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeechSynthesizer {
    async fn speak_ssml(&self, ssml: &str) -> Result<SynthesisOutcome> {
        let token = self.fresh_token();
        tokio::select! {
            () = token.cancelled() => Err(AvatarError::Cancelled("synthesis stopped".to_owned())),
            outcome = self.post(ssml) => outcome,
        }
    }

    async fn stop_speaking(&self) -> Result<()> {
        debug!("stopping in-flight synthesis");
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regional_url() {
        let config = SpeechConfig::default();
        assert_eq!(
            synthesis_url(&config),
            "https://westus2.tts.speech.microsoft.com/cognitiveservices/v1"
        );
    }

    #[test]
    fn private_endpoint_url() {
        let config = SpeechConfig {
            private_endpoint: Some("https://my-speech.cognitiveservices.azure.com/".into()),
            ..SpeechConfig::default()
        };
        assert_eq!(
            synthesis_url(&config),
            "https://my-speech.cognitiveservices.azure.com/tts/cognitiveservices/v1"
        );
    }

    #[test]
    fn empty_private_endpoint_falls_back_to_region() {
        let config = SpeechConfig {
            region: "eastus".into(),
            private_endpoint: Some(String::new()),
            ..SpeechConfig::default()
        };
        assert!(synthesis_url(&config).starts_with("https://eastus.tts."));
    }

    #[tokio::test]
    async fn stop_before_speak_is_harmless() {
        let synth = AzureSpeechSynthesizer::new(&SpeechConfig::default());
        assert!(synth.stop_speaking().await.is_ok());
    }

    #[test]
    fn debug_hides_key() {
        let config = SpeechConfig {
            api_key: "secret-key".into(),
            ..SpeechConfig::default()
        };
        let synth = AzureSpeechSynthesizer::new(&config);
        assert!(!format!("{synth:?}").contains("secret-key"));
    }
}

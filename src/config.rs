//! Configuration types for the chat-to-speech session.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AvatarError, Result};

/// Top-level configuration for one conversation session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarChatConfig {
    /// Text-generation service settings.
    pub chat: ChatConfig,
    /// Retrieval-augmented ("on your data") settings. `None` selects plain mode.
    pub retrieval: Option<RetrievalConfig>,
    /// Speech-synthesis settings.
    pub speech: SpeechConfig,
    /// Sentence boundary detection settings.
    pub segmenter: SegmenterConfig,
    /// Avatar appearance, passed through to the renderer.
    pub avatar: AvatarAppearance,
}

/// Text-generation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Service endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    /// Deployment name of the chat model.
    pub deployment: String,
    /// API key sent in the `api-key` header.
    pub api_key: String,
    /// `api-version` query parameter.
    pub api_version: String,
    /// System prompt. Sent ahead of the ledger on every request, and used
    /// as `roleInformation` in retrieval mode.
    pub system_prompt: String,
    /// Speak a short filler phrase while a retrieval request is in flight.
    pub enable_quick_reply: bool,
    /// Candidate filler phrases.
    pub quick_replies: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: String::new(),
            api_key: String::new(),
            api_version: "2023-06-01-preview".to_owned(),
            system_prompt: "You are an AI assistant that helps people find information."
                .to_owned(),
            enable_quick_reply: false,
            quick_replies: vec![
                "Let me take a look.".to_owned(),
                "Let me check.".to_owned(),
                "One moment, please.".to_owned(),
            ],
        }
    }
}

/// Cognitive search data source used in retrieval mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Search service endpoint.
    pub endpoint: String,
    /// Search service key.
    pub key: String,
    /// Index to query.
    pub index_name: String,
}

/// Speech-synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Azure region of the speech resource.
    pub region: String,
    /// Speech resource key.
    pub api_key: String,
    /// Private endpoint host. Overrides `region` when set.
    pub private_endpoint: Option<String>,
    /// Voice name.
    pub voice: String,
    /// Personal-voice speaker profile. Omitted from SSML when `None`.
    pub speaker_profile_id: Option<String>,
    /// `xml:lang` of the SSML document.
    pub language: String,
    /// Audio output format requested from the REST backend.
    pub output_format: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: "westus2".to_owned(),
            api_key: String::new(),
            private_endpoint: None,
            voice: "en-US-AvaMultilingualNeural".to_owned(),
            speaker_profile_id: None,
            language: "en-US".to_owned(),
            output_format: "riff-24khz-16bit-mono-pcm".to_owned(),
        }
    }
}

/// Sentence boundary configuration.
///
/// `separators` are whole fragments that end an utterance; `punctuation`
/// characters end an utterance when they appear anywhere in a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Fragments that flush the pending buffer when received verbatim.
    pub separators: Vec<String>,
    /// Sentence-terminal marks, checked in order.
    pub punctuation: Vec<char>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            separators: vec!["\n".to_owned(), "\n\n".to_owned()],
            punctuation: vec!['.', '?', '!', ':', ';', '。', '？', '！', '：', '；'],
        }
    }
}

/// Avatar character selection. Not interpreted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarAppearance {
    /// Character name.
    pub character: String,
    /// Character style.
    pub style: String,
    /// Whether the character is a custom avatar.
    pub customized: bool,
}

impl Default for AvatarAppearance {
    fn default() -> Self {
        Self {
            character: "lisa".to_owned(),
            style: "casual-sitting".to_owned(),
            customized: false,
        }
    }
}

impl AvatarChatConfig {
    /// Whether requests carry a retrieval data source.
    pub fn retrieval_enabled(&self) -> bool {
        self.retrieval.is_some()
    }

    /// Check that the fields needed to talk to the services are present.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Config`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("chat.endpoint", &self.chat.endpoint),
            ("chat.deployment", &self.chat.deployment),
            ("chat.api_key", &self.chat.api_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AvatarError::Config(format!("{name} must not be empty")));
            }
        }
        if let Some(retrieval) = &self.retrieval {
            if retrieval.endpoint.trim().is_empty() || retrieval.index_name.trim().is_empty() {
                return Err(AvatarError::Config(
                    "retrieval.endpoint and retrieval.index_name must be set".to_owned(),
                ));
            }
        }
        if self.segmenter.punctuation.is_empty() && self.segmenter.separators.is_empty() {
            return Err(AvatarError::Config(
                "segmenter needs at least one separator or punctuation mark".to_owned(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AvatarError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AvatarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/avatar-chat/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("avatar-chat").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("avatar-chat")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/avatar-chat-config/config.toml")
        }
    }
}

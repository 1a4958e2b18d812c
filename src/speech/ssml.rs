//! SSML document construction for the speech backend.

use crate::config::SpeechConfig;

/// Voice identity placed in every document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsmlVoice {
    /// Voice name, e.g. `en-US-AvaMultilingualNeural`.
    pub name: String,
    /// `xml:lang` of the document.
    pub language: String,
    /// Personal-voice speaker profile.
    pub speaker_profile_id: Option<String>,
}

impl From<&SpeechConfig> for SsmlVoice {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            name: config.voice.clone(),
            language: config.language.clone(),
            speaker_profile_id: config
                .speaker_profile_id
                .clone()
                .filter(|id| !id.is_empty()),
        }
    }
}

/// Escape text for inclusion in an SSML element or attribute.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the document for one utterance.
pub fn build_ssml(voice: &SsmlVoice, text: &str, trailing_silence_ms: u32) -> String {
    let mut body = String::from("<mstts:leadingsilence-exact value='0'/>");
    body.push_str(&escape_text(text));
    if trailing_silence_ms > 0 {
        body.push_str(&format!("<break time='{trailing_silence_ms}ms' />"));
    }

    if let Some(profile) = &voice.speaker_profile_id {
        body = format!(
            "<mstts:ttsembedding speakerProfileId='{}'>{body}</mstts:ttsembedding>",
            escape_text(profile)
        );
    }

    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' \
         xmlns:mstts='http://www.w3.org/2001/mstts' xml:lang='{}'>\
         <voice name='{}'>{body}</voice></speak>",
        escape_text(&voice.language),
        escape_text(&voice.name)
    )
}

//! Speech side of the conversation: segmentation, SSML, synthesis, and the
//! dispatch queue that serializes utterances to the backend.

pub mod queue;
pub mod segmenter;
pub mod ssml;
pub mod synthesizer;
pub mod utterance;

pub use queue::{QueueSnapshot, SpeechDispatchQueue, SpeechEvent};
pub use segmenter::{BoundaryPolicy, BoundaryRule, SentenceSegmenter};
pub use ssml::{SsmlVoice, build_ssml, escape_text};
pub use synthesizer::{AzureSpeechSynthesizer, SpeechSynthesizer, SynthesisOutcome};
pub use utterance::{Utterance, UtteranceState};

//! Conversation session: the control surface over one ledger and one queue.
//!
//! A [`Session`] runs one turn at a time. Each turn appends the user message,
//! streams the reply, routes tool content away from speech, segments the
//! spoken text into utterances for the [`SpeechDispatchQueue`], and commits
//! the reply to the ledger when the stream ends.
//!
//! [`Session::stop_speaking`] and a new [`Session::submit_query`] both
//! preempt the active turn at its next suspension point.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::client::{AzureOpenAiClient, ChatBackend, ChatRequest};
use crate::chat::message::Message;
use crate::config::AvatarChatConfig;
use crate::conversation::ledger::ConversationLedger;
use crate::conversation::router::{Routed, ToolContentRouter};
use crate::error::{AvatarError, Result};
use crate::speech::queue::SpeechDispatchQueue;
use crate::speech::segmenter::{BoundaryPolicy, SentenceSegmenter};
use crate::speech::ssml::SsmlVoice;
use crate::speech::synthesizer::{AzureSpeechSynthesizer, SpeechSynthesizer};
use crate::speech::utterance::Utterance;

/// Trailing silence after a quick reply, in milliseconds.
const QUICK_REPLY_SILENCE_MS: u32 = 2000;

/// Summary of one completed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Spoken reply text, citation markers removed.
    pub reply: String,
    /// Tool content committed ahead of the reply.
    pub tool_content: Option<String>,
    /// Utterances handed to the speech queue, quick reply excluded.
    pub utterances: usize,
    /// Malformed blocks skipped while reading the stream.
    pub skipped_blocks: usize,
    /// The turn was cut short by a stop or a newer query.
    pub interrupted: bool,
}

/// One conversation with the avatar.
pub struct Session {
    id: String,
    config: AvatarChatConfig,
    backend: Arc<dyn ChatBackend>,
    queue: SpeechDispatchQueue,
    policy: BoundaryPolicy,
    ledger: Mutex<ConversationLedger>,
    turn_lock: tokio::sync::Mutex<()>,
    active_turn: Mutex<Option<CancellationToken>>,
    /// Ticket of the most recently submitted query.
    latest_query: AtomicU64,
    stopped: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("backend", &self.backend.name())
            .field("queue", &self.queue)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Session {
    /// Start a session against the Azure chat and speech services.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Config`] when the configuration is incomplete.
    pub fn start(config: AvatarChatConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(AzureOpenAiClient::new(config.chat.clone()));
        let synthesizer = Arc::new(AzureSpeechSynthesizer::new(&config.speech));
        Ok(Self::with_backends(config, backend, synthesizer))
    }

    /// Start a session with explicit backends.
    pub fn with_backends(
        config: AvatarChatConfig,
        backend: Arc<dyn ChatBackend>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let queue = SpeechDispatchQueue::new(synthesizer, SsmlVoice::from(&config.speech));
        let policy = BoundaryPolicy::from_config(&config.segmenter);
        let id = uuid::Uuid::new_v4().to_string();
        info!(
            session_id = %id,
            backend = backend.name(),
            retrieval = config.retrieval_enabled(),
            "session started"
        );
        Self {
            id,
            config,
            backend,
            queue,
            policy,
            ledger: Mutex::new(ConversationLedger::new()),
            turn_lock: tokio::sync::Mutex::new(()),
            active_turn: Mutex::new(None),
            latest_query: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &AvatarChatConfig {
        &self.config
    }

    /// The speech queue, for event subscription and idle waits.
    pub fn speech(&self) -> &SpeechDispatchQueue {
        &self.queue
    }

    /// Copy of the ledger in sequence order.
    pub fn history(&self) -> Vec<Message> {
        self.lock_ledger().messages().to_vec()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether a turn is currently streaming.
    pub fn is_turn_active(&self) -> bool {
        self.lock_active_turn().is_some()
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, ConversationLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_active_turn(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.active_turn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send a query and speak the reply.
    ///
    /// Resolves when the reply stream ends, not when speech finishes; use
    /// [`SpeechDispatchQueue::wait_idle`] for that. Any turn or speech still
    /// in progress is interrupted first.
    ///
    /// # Errors
    ///
    /// - [`AvatarError::Session`] after [`stop`](Self::stop).
    /// - [`AvatarError::Cancelled`] when a newer query was submitted while
    ///   this one waited for the previous turn. Nothing is recorded.
    /// - [`AvatarError::Request`] / [`AvatarError::Auth`] when the request is
    ///   rejected. The user message stays in the ledger.
    /// - [`AvatarError::Transport`] when the stream fails mid-reply. The
    ///   partial reply has been spoken and committed by then.
    pub async fn submit_query(&self, text: &str, image_url: Option<&str>) -> Result<TurnOutcome> {
        if self.is_stopped() {
            return Err(AvatarError::Session("session has been stopped".to_owned()));
        }
        let ticket = self.latest_query.fetch_add(1, Ordering::AcqRel) + 1;
        if self.is_turn_active() || !self.queue.is_empty() {
            debug!(session_id = %self.id, ticket, "new query preempts active response");
            self.interrupt().await;
        }

        let _turn = self.turn_lock.lock().await;
        if self.is_stopped() {
            return Err(AvatarError::Session("session has been stopped".to_owned()));
        }
        if self.latest_query.load(Ordering::Acquire) != ticket {
            debug!(session_id = %self.id, ticket, "query superseded while waiting");
            return Err(AvatarError::Cancelled(
                "superseded by a newer query".to_owned(),
            ));
        }
        // Speech left by a turn that finished while this query waited.
        if !self.queue.is_empty() {
            self.queue.interrupt().await;
        }

        let cancel = CancellationToken::new();
        *self.lock_active_turn() = Some(cancel.clone());
        let result = self.run_turn(text, image_url, &cancel).await;
        *self.lock_active_turn() = None;
        result
    }

    async fn run_turn(
        &self,
        text: &str,
        image_url: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let message = match image_url {
            Some(url) => Message::user_with_image(text, url),
            None => Message::user(text),
        };
        let request = {
            let mut ledger = self.lock_ledger();
            ledger.append(message);
            ChatRequest {
                system_prompt: Some(self.config.chat.system_prompt.clone()),
                messages: ledger.messages().to_vec(),
                retrieval: self.config.retrieval.clone(),
            }
        };
        let mode = request.mode();
        info!(session_id = %self.id, ?mode, context = request.messages.len(), "turn started");

        if self.config.retrieval_enabled() && self.config.chat.enable_quick_reply {
            if let Some(phrase) = pick_quick_reply(&self.config.chat.quick_replies) {
                debug!(phrase = %phrase, "speaking quick reply");
                self.queue
                    .enqueue(Utterance::new(phrase).with_trailing_silence(QUICK_REPLY_SILENCE_MS));
            }
        }

        let mut outcome = TurnOutcome::default();
        let mut stream = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                outcome.interrupted = true;
                return Ok(outcome);
            }
            stream = self.backend.stream_reply(&request) => stream?,
        };

        let mut router = ToolContentRouter::new(mode);
        let mut segmenter = SentenceSegmenter::new(self.policy.clone());
        let mut failure = None;

        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.interrupted = true;
                    break;
                }
                item = stream.next() => item,
            };
            match item {
                None => break,
                Some(Ok(delta)) if delta.is_terminal => break,
                Some(Ok(delta)) => {
                    if let Routed::Spoken(fragment) = router.route(&delta) {
                        if let Some(sentence) = segmenter.push(&fragment) {
                            outcome.utterances += self.dispatch(sentence, cancel);
                        }
                    }
                }
                Some(Err(e)) if !e.is_fatal_to_turn() => {
                    outcome.skipped_blocks += 1;
                }
                Some(Err(e)) => {
                    error!(session_id = %self.id, error = %e, "reply stream failed");
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(stream);

        if outcome.interrupted {
            segmenter.clear();
            // A sentence may have slipped in while the stop was landing.
            if !self.queue.is_empty() {
                self.queue.interrupt().await;
            }
        } else if let Some(rest) = segmenter.finish() {
            outcome.utterances += self.dispatch(rest, cancel);
        }

        let (tool_content, reply) = router.take();
        self.lock_ledger()
            .commit_response(tool_content.clone(), reply.clone());
        outcome.reply = reply;
        outcome.tool_content = tool_content;

        info!(
            session_id = %self.id,
            utterances = outcome.utterances,
            skipped_blocks = outcome.skipped_blocks,
            interrupted = outcome.interrupted,
            "turn finished"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Enqueue one sentence unless the turn has been stopped.
    fn dispatch(&self, sentence: String, cancel: &CancellationToken) -> usize {
        if cancel.is_cancelled() {
            return 0;
        }
        self.queue.enqueue(Utterance::new(sentence));
        1
    }

    /// Cancel the active turn, if any, and silence the queue.
    async fn interrupt(&self) {
        let active = self.lock_active_turn().clone();
        if let Some(cancel) = active {
            cancel.cancel();
        }
        self.queue.interrupt().await;
    }

    /// Stop speaking now.
    ///
    /// The streaming turn, if any, ends at its next suspension point and
    /// commits what it received so far.
    pub async fn stop_speaking(&self) {
        info!(session_id = %self.id, "stop speaking");
        self.interrupt().await;
    }

    /// End the session: stop speech, wait for the active turn to wind down,
    /// and clear the ledger. Further queries fail with
    /// [`AvatarError::Session`].
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.interrupt().await;
        let _turn = self.turn_lock.lock().await;
        self.lock_ledger().reset();
        info!(session_id = %self.id, "session stopped");
    }
}

/// Pick one quick reply at random.
fn pick_quick_reply(candidates: &[String]) -> Option<String> {
    if candidates.is_empty() {
        warn!("quick reply enabled with no candidates");
        return None;
    }
    let index = rand::random::<usize>() % candidates.len();
    candidates.get(index).cloned()
}

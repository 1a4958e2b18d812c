//! Serialized dispatch of utterances to the speech backend.
//!
//! The queue owns utterances from enqueue until they reach a terminal state.
//! At most one utterance is `Speaking` at a time and dispatch order is
//! enqueue order. A background worker drains the queue iteratively; it is
//! started on demand and exits when the queue runs dry.
//!
//! [`SpeechDispatchQueue::interrupt`] races safely with natural completion.
//! Every worker is tagged with the generation it was started in, and
//! interrupting bumps the generation. Whoever takes the state lock first wins:
//! a worker that finds its generation stale drops its result and exits
//! without touching the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AvatarError;
use crate::speech::ssml::{SsmlVoice, build_ssml};
use crate::speech::synthesizer::{SpeechSynthesizer, SynthesisOutcome};
use crate::speech::utterance::{Utterance, UtteranceState};

/// Buffered speech events per subscriber before lagging.
const EVENT_CAPACITY: usize = 64;

/// Progress of utterances through the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// The backend started speaking this utterance.
    UtteranceStarted { id: u64, text: String },
    /// The utterance was spoken to the end.
    UtteranceCompleted { id: u64, result_id: String },
    /// The backend failed; the queue moved on.
    UtteranceFailed { id: u64, error: String },
    /// Discarded by an interrupt, while pending or mid-speech.
    UtteranceCancelled { id: u64 },
    /// Nothing pending and nothing speaking.
    Idle,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub speaking: Option<Utterance>,
    pub pending: Vec<Utterance>,
    pub last_spoke_at: Option<Instant>,
}

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<Utterance>,
    speaking: Option<Utterance>,
    generation: u64,
    next_id: u64,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    worker_active: bool,
    last_spoke_at: Option<Instant>,
}

struct Inner {
    state: Mutex<QueueState>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: SsmlVoice,
    events: broadcast::Sender<SpeechEvent>,
    idle: watch::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SpeechEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// FIFO speech queue with a single utterance in flight.
#[derive(Clone)]
pub struct SpeechDispatchQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SpeechDispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SpeechDispatchQueue")
            .field("pending", &state.pending.len())
            .field("speaking", &state.speaking.as_ref().map(|u| u.id))
            .field("generation", &state.generation)
            .finish()
    }
}

impl SpeechDispatchQueue {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, voice: SsmlVoice) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    speaking: None,
                    generation: 0,
                    next_id: 1,
                    cancel: CancellationToken::new(),
                    worker: None,
                    worker_active: false,
                    last_spoke_at: None,
                }),
                synthesizer,
                voice,
                events,
                idle,
            }),
        }
    }

    /// Append an utterance and start draining if nothing is speaking.
    ///
    /// Returns the id assigned to the utterance. Must be called from within
    /// a Tokio runtime.
    pub fn enqueue(&self, mut utterance: Utterance) -> u64 {
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;
        utterance.id = id;
        utterance.state = UtteranceState::Pending;
        utterance.enqueued_at = Instant::now();
        debug!(utterance_id = id, pending = state.pending.len(), "enqueue utterance");
        state.pending.push_back(utterance);
        self.inner.idle.send_replace(false);

        if !state.worker_active {
            state.worker_active = true;
            let generation = state.generation;
            let inner = Arc::clone(&self.inner);
            state.worker = Some(tokio::spawn(drain(inner, generation)));
        }
        id
    }

    /// Enqueue plain text with no trailing silence.
    pub fn speak(&self, text: impl Into<String>) -> u64 {
        self.enqueue(Utterance::new(text))
    }

    /// Stop the in-flight utterance, discard everything pending, and return
    /// to idle.
    ///
    /// Resolves once the previous drain worker has exited, so nothing from
    /// before the interrupt can still be speaking afterwards.
    pub async fn interrupt(&self) {
        let worker = {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.cancel.cancel();
            state.cancel = CancellationToken::new();
            state.worker_active = false;

            let mut discarded: Vec<Utterance> = state.speaking.take().into_iter().collect();
            discarded.extend(state.pending.drain(..));
            let cancelled: Vec<u64> = discarded
                .into_iter()
                .map(|mut utterance| {
                    utterance.transition(UtteranceState::Cancelled);
                    utterance.id
                })
                .collect();
            self.inner.idle.send_replace(true);
            if !cancelled.is_empty() {
                info!(cancelled = cancelled.len(), "speech interrupted");
            }
            for id in cancelled {
                self.inner.emit(SpeechEvent::UtteranceCancelled { id });
            }
            self.inner.emit(SpeechEvent::Idle);
            state.worker.take()
        };

        if let Err(e) = self.inner.synthesizer.stop_speaking().await {
            warn!(error = %e, "stop speaking failed");
        }
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "speech worker ended abnormally");
            }
        }
    }

    /// Subscribe to speech progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once nothing is pending or speaking.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Pending plus speaking utterances.
    pub fn len(&self) -> usize {
        let state = self.inner.lock();
        state.pending.len() + usize::from(state.speaking.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.lock().speaking.is_some()
    }

    /// When an utterance last started or finished.
    pub fn last_spoke_at(&self) -> Option<Instant> {
        self.inner.lock().last_spoke_at
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.lock();
        QueueSnapshot {
            speaking: state.speaking.clone(),
            pending: state.pending.iter().cloned().collect(),
            last_spoke_at: state.last_spoke_at,
        }
    }
}

/// Drain loop for one generation.
async fn drain(inner: Arc<Inner>, generation: u64) {
    loop {
        let next = {
            let mut state = inner.lock();
            if state.generation != generation {
                return;
            }
            // Events go out under the lock so a newer worker cannot overtake them.
            match state.pending.pop_front() {
                None => {
                    state.worker_active = false;
                    inner.idle.send_replace(true);
                    debug!("speech queue idle");
                    inner.emit(SpeechEvent::Idle);
                    None
                }
                Some(mut utterance) => {
                    utterance.transition(UtteranceState::Speaking);
                    state.speaking = Some(utterance.clone());
                    state.last_spoke_at = Some(Instant::now());
                    debug!(utterance_id = utterance.id, text = %utterance.text, "speaking");
                    inner.emit(SpeechEvent::UtteranceStarted {
                        id: utterance.id,
                        text: utterance.text.clone(),
                    });
                    Some((utterance, state.cancel.clone()))
                }
            }
        };

        let Some((utterance, cancel)) = next else {
            return;
        };

        let result = if utterance.is_blank() {
            Ok(SynthesisOutcome::default())
        } else {
            let ssml = build_ssml(&inner.voice, &utterance.text, utterance.trailing_silence_ms);
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(AvatarError::Cancelled("interrupted".to_owned())),
                outcome = inner.synthesizer.speak_ssml(&ssml) => outcome,
            }
        };

        {
            let mut state = inner.lock();
            if state.generation != generation {
                // Interrupted; the interrupt already settled this utterance.
                return;
            }
            let Some(mut speaking) = state.speaking.take() else {
                continue;
            };
            state.last_spoke_at = Some(Instant::now());
            let event = match result {
                Ok(outcome) => {
                    speaking.transition(UtteranceState::Completed);
                    info!(utterance_id = speaking.id, result_id = %outcome.result_id, "utterance spoken");
                    SpeechEvent::UtteranceCompleted {
                        id: speaking.id,
                        result_id: outcome.result_id,
                    }
                }
                Err(AvatarError::Cancelled(_)) => {
                    speaking.transition(UtteranceState::Cancelled);
                    debug!(utterance_id = speaking.id, "utterance cancelled by backend");
                    SpeechEvent::UtteranceCancelled { id: speaking.id }
                }
                Err(e) => {
                    speaking.transition(UtteranceState::Failed);
                    warn!(utterance_id = speaking.id, error = %e, "utterance failed");
                    SpeechEvent::UtteranceFailed {
                        id: speaking.id,
                        error: e.to_string(),
                    }
                }
            };
            inner.emit(event);
        }
    }
}

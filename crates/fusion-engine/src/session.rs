use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use fusion_contracts::artifact::GenerationResult;
use fusion_contracts::errors::GenerationError;
use fusion_contracts::events::EventWriter;
use fusion_contracts::history::History;
use fusion_contracts::prompt::{compose_prompt, PromptInputs};
use fusion_contracts::settings::{Mode, Style, StyleStrength};
use serde_json::json;
use thiserror::Error;

use crate::client::GenerationClient;
use crate::config::DEFAULT_SUBMISSION_TIMEOUT_SECS;
use crate::map_object;
use crate::source::{Slot, SourceImage};

/// The single result-or-error the session is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Idle,
    Submitting {
        id: u64,
    },
    Succeeded(GenerationResult),
    Failed(GenerationError),
}

impl Outcome {
    pub fn result(&self) -> Option<&GenerationResult> {
        match self {
            Self::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&GenerationError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting { .. } => "submitting",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a generation is already in flight")]
    Busy,
    #[error("there is no generated image to reuse")]
    NoActiveResult,
    #[error("history has no entry {index}")]
    HistoryIndex { index: usize },
    #[error("no generation is in flight")]
    NotSubmitting,
    #[error("image 2 is not used in EDIT mode")]
    SlotDisabled,
    #[error("generated image could not be reused: {0}")]
    Reuse(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

struct Completion {
    id: u64,
    result: Result<GenerationResult, GenerationError>,
}

struct Pending {
    id: u64,
    started: Instant,
    /// `None` when the timeout is too large to represent.
    deadline: Option<Instant>,
}

/// One user's editing session. Owns every piece of mutable state; the
/// model call runs on a worker thread and comes back through a channel, so
/// outcome and history only ever change on the owner's thread.
pub struct Session {
    mode: Mode,
    style: Style,
    strength: StyleStrength,
    sources: [Option<SourceImage>; 2],
    prompt: String,
    negative_prompt: String,
    outcome: Outcome,
    history: History,
    client: GenerationClient,
    events: EventWriter,
    timeout: Duration,
    pending: Option<Pending>,
    next_submission: u64,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
}

impl Session {
    pub fn new(client: GenerationClient, events: EventWriter) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        let session = Self {
            mode: Mode::default(),
            style: Style::default(),
            strength: StyleStrength::default(),
            sources: [None, None],
            prompt: String::new(),
            negative_prompt: String::new(),
            outcome: Outcome::Idle,
            history: History::new(),
            client,
            events,
            timeout: Duration::from_secs(DEFAULT_SUBMISSION_TIMEOUT_SECS),
            pending: None,
            next_submission: 1,
            completion_tx,
            completion_rx,
        };
        session.events.emit_lossy(
            "session_started",
            map_object(json!({
                "transport": session.client.transport_name(),
                "mode": session.mode.as_str(),
            })),
        );
        session
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn strength(&self) -> StyleStrength {
        self.strength
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn source(&self, slot: Slot) -> Option<&SourceImage> {
        self.sources[slot.index()].as_ref()
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_submitting(&self) -> bool {
        self.pending.is_some()
    }

    /// Replaces or removes the image in `slot`.
    pub fn select_image(
        &mut self,
        slot: Slot,
        image: Option<SourceImage>,
    ) -> Result<(), SessionError> {
        if slot == Slot::Second && self.mode == Mode::Edit && image.is_some() {
            return Err(SessionError::SlotDisabled);
        }
        match image {
            Some(image) => {
                self.events.emit_lossy(
                    "source_selected",
                    map_object(json!({
                        "slot": slot.number(),
                        "name": image.preview().name,
                        "mime_type": image.preview().mime_type,
                        "bytes": image.preview().byte_len,
                    })),
                );
                self.sources[slot.index()] = Some(image);
            }
            None => {
                if self.sources[slot.index()].take().is_some() {
                    self.events.emit_lossy(
                        "source_removed",
                        map_object(json!({ "slot": slot.number() })),
                    );
                }
            }
        }
        Ok(())
    }

    pub fn set_mode(&mut self, mode: Mode) {
        let cleared = mode == Mode::Edit && self.sources[Slot::Second.index()].take().is_some();
        self.mode = mode;
        self.events.emit_lossy(
            "mode_changed",
            map_object(json!({
                "mode": mode.as_str(),
                "cleared_image2": cleared,
            })),
        );
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    pub fn set_strength(&mut self, strength: StyleStrength) {
        self.strength = strength;
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn set_negative_prompt(&mut self, negative_prompt: impl Into<String>) {
        self.negative_prompt = negative_prompt.into();
    }

    pub fn compose_prompt(&self) -> String {
        compose_prompt(&PromptInputs {
            mode: self.mode,
            style: self.style,
            strength: self.strength,
            prompt: &self.prompt,
            negative_prompt: &self.negative_prompt,
        })
    }

    /// Starts a generation and returns its submission id.
    pub fn submit(&mut self) -> Result<u64, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::Busy);
        }

        let required = self.mode.required_sources();
        let missing = self.sources[..required].iter().any(Option::is_none);
        let image1 = self.sources[Slot::First.index()].clone();
        let (Some(image1), false) = (image1, missing) else {
            let err = GenerationError::Validation;
            self.emit_failure(None, &err, None);
            self.outcome = Outcome::Failed(err.clone());
            return Err(err.into());
        };
        let image2 = self.sources[1..required].iter().flatten().next().cloned();

        let id = self.next_submission;
        self.next_submission += 1;
        let prompt = self.compose_prompt();
        let started = Instant::now();
        self.pending = Some(Pending {
            id,
            started,
            deadline: started.checked_add(self.timeout),
        });
        self.outcome = Outcome::Submitting { id };
        self.events.emit_lossy(
            "generation_started",
            map_object(json!({
                "submission": id,
                "mode": self.mode.as_str(),
                "style": self.style.id(),
                "strength": self.strength.value(),
                "images": 1 + usize::from(image2.is_some()),
                "prompt": prompt,
            })),
        );

        let client = self.client.clone();
        let tx = self.completion_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("fusion-generation-{id}"))
            .spawn(move || {
                let result = client.generate(&prompt, &image1, image2.as_ref());
                // The session may have moved on; a closed channel is fine.
                let _ = tx.send(Completion { id, result });
            });
        if let Err(err) = spawned {
            self.resolve(
                id,
                Err(GenerationError::Unclassified {
                    raw: format!("generation thread spawn failed: {err}"),
                }),
            );
        }
        Ok(id)
    }

    /// Applies a finished submission if one has arrived, or the timeout if
    /// the deadline has passed. Never blocks.
    pub fn poll(&mut self) -> bool {
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.resolve(completion.id, completion.result) {
                return true;
            }
        }
        self.expire_if_due(Instant::now())
    }

    /// Blocks until the in-flight submission resolves or times out.
    pub fn wait(&mut self) -> Result<&Outcome, SessionError> {
        loop {
            let Some(deadline) = self.pending.as_ref().map(|pending| pending.deadline) else {
                return Ok(&self.outcome);
            };
            let now = Instant::now();
            if self.expire_if_due(now) {
                continue;
            }
            let received = match deadline {
                Some(deadline) => self
                    .completion_rx
                    .recv_timeout(deadline.saturating_duration_since(now)),
                None => self
                    .completion_rx
                    .recv()
                    .map_err(|_| mpsc::RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(completion) => {
                    self.resolve(completion.id, completion.result);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                // The session holds a sender, so this cannot happen.
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(SessionError::NotSubmitting)
                }
            }
        }
    }

    /// Abandons the in-flight submission. Its worker keeps running and its
    /// result is dropped when it arrives.
    pub fn cancel(&mut self) -> Result<u64, SessionError> {
        let Some(pending) = self.pending.take() else {
            return Err(SessionError::NotSubmitting);
        };
        if matches!(self.outcome, Outcome::Submitting { .. }) {
            self.outcome = Outcome::Idle;
        }
        self.events.emit_lossy(
            "generation_cancelled",
            map_object(json!({
                "submission": pending.id,
                "elapsed_ms": pending.started.elapsed().as_millis() as u64,
            })),
        );
        Ok(pending.id)
    }

    /// Moves the active result into slot 1 and clears it.
    pub fn use_result_as_source(&mut self) -> Result<(), SessionError> {
        let Outcome::Succeeded(result) = &self.outcome else {
            return Err(SessionError::NoActiveResult);
        };
        let source = SourceImage::from_result(result)
            .map_err(|err| SessionError::Reuse(format!("{err:#}")))?;
        self.events.emit_lossy(
            "source_promoted",
            map_object(json!({
                "name": source.preview().name,
                "mime_type": source.preview().mime_type,
            })),
        );
        self.sources[Slot::First.index()] = Some(source);
        self.outcome = Outcome::Idle;
        Ok(())
    }

    pub fn select_from_history(&mut self, index: usize) -> Result<&GenerationResult, SessionError> {
        let Some(result) = self.history.get(index).cloned() else {
            return Err(SessionError::HistoryIndex { index });
        };
        self.events.emit_lossy(
            "history_selected",
            map_object(json!({ "index": index })),
        );
        self.outcome = Outcome::Succeeded(result);
        self.outcome
            .result()
            .ok_or(SessionError::HistoryIndex { index })
    }

    /// The only place a submission's result reaches session state. Returns
    /// false when `id` is not the submission in flight.
    fn resolve(&mut self, id: u64, result: Result<GenerationResult, GenerationError>) -> bool {
        if self.pending.as_ref().map(|pending| pending.id) != Some(id) {
            return false;
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let elapsed_ms = pending.started.elapsed().as_millis() as u64;
        match result {
            Ok(result) => {
                self.events.emit_lossy(
                    "generation_succeeded",
                    map_object(json!({
                        "submission": id,
                        "elapsed_ms": elapsed_ms,
                        "mime_type": result.mime_type(),
                        "history_len": (self.history.len() + 1).min(self.history.capacity()),
                    })),
                );
                self.history.push(result.clone());
                self.outcome = Outcome::Succeeded(result);
            }
            Err(err) => {
                self.emit_failure(Some(id), &err, Some(elapsed_ms));
                self.outcome = Outcome::Failed(err);
            }
        }
        true
    }

    fn expire_if_due(&mut self, now: Instant) -> bool {
        let Some(pending) = self.pending.as_ref() else {
            return false;
        };
        if pending.deadline.map_or(true, |deadline| now < deadline) {
            return false;
        }
        let id = pending.id;
        let seconds = self.timeout.as_secs();
        self.resolve(id, Err(GenerationError::Timeout { seconds }))
    }

    fn emit_failure(&self, id: Option<u64>, err: &GenerationError, elapsed_ms: Option<u64>) {
        self.events.emit_lossy(
            "generation_failed",
            map_object(json!({
                "submission": id,
                "kind": format!("{:?}", err.kind()),
                "message_key": err.message_key(),
                "detail": err.detail(),
                "elapsed_ms": elapsed_ms,
            })),
        );
    }
}

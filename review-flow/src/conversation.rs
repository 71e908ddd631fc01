//! Scripted yes/no conversations.
//!
//! A session walks a fixed list of [`ConversationStep`]s. Answering a step records the
//! choice, then a spawned continuation asks the [`StepExecutor`] for the assistant's
//! reaction, the next prompt and finally the "analyzing" message, appending each to the
//! transcript strictly in that order. Restarting a session bumps its run counter and
//! aborts the continuation of the previous run.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    error::{FlowError, Result},
    executor::{MessageRequest, StepExecutor},
    script::{ConversationScript, FinalDocument},
};

/// Completed or failed sessions kept around for reading their result
pub const DEFAULT_MAX_FINISHED_SESSIONS: usize = 100;
/// Sessions untouched for this long are dropped, whatever their status
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Answers given so far, keyed by step index
pub type Answers = BTreeMap<usize, Choice>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Yes,
    No,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Yes => f.write_str("yes"),
            Choice::No => f.write_str("no"),
        }
    }
}

impl FromStr for Choice {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(Choice::Yes),
            "no" | "n" => Ok(Choice::No),
            other => Err(FlowError::InvalidInput(format!(
                "'{}' is not a valid answer",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Ai,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// One yes/no question of a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStep {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_yes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_label: Option<String>,
}

impl ConversationStep {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            on_yes: None,
            on_no: None,
            yes_label: None,
            no_label: None,
        }
    }

    pub fn on_yes(mut self, text: impl Into<String>) -> Self {
        self.on_yes = Some(text.into());
        self
    }

    pub fn on_no(mut self, text: impl Into<String>) -> Self {
        self.on_no = Some(text.into());
        self
    }

    pub fn labels(mut self, yes: impl Into<String>, no: impl Into<String>) -> Self {
        self.yes_label = Some(yes.into());
        self.no_label = Some(no.into());
        self
    }

    /// Text shown for the user's answer
    pub fn label(&self, choice: Choice) -> &str {
        match choice {
            Choice::Yes => self.yes_label.as_deref().unwrap_or("Yes"),
            Choice::No => self.no_label.as_deref().unwrap_or("No"),
        }
    }

    pub fn follow_up(&self, choice: Choice) -> Option<&str> {
        match choice {
            Choice::Yes => self.on_yes.as_deref(),
            Choice::No => self.on_no.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    AwaitingAnswer,
    Thinking,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    pub step_index: usize,
    pub answers: Answers,
    pub transcript: Vec<TranscriptEntry>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_document: Option<FinalDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Bumped by every start; continuations of older runs are dropped
    #[serde(skip)]
    pub run: u64,
}

impl ConversationSession {
    fn new(id: String) -> Self {
        Self {
            id,
            step_index: 0,
            answers: Answers::new(),
            transcript: Vec::new(),
            status: SessionStatus::AwaitingAnswer,
            final_document: None,
            error: None,
            run: 0,
        }
    }

    fn restart(&mut self, first_prompt: &str) {
        self.run += 1;
        self.step_index = 0;
        self.answers.clear();
        self.transcript.clear();
        self.final_document = None;
        self.error = None;
        self.status = SessionStatus::AwaitingAnswer;
        self.push(Speaker::Ai, first_prompt);
    }

    fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry {
            speaker,
            text: text.into(),
        });
    }

    pub fn awaiting_answer(&self) -> bool {
        self.status == SessionStatus::AwaitingAnswer
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn ai_messages(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript.iter().filter(|e| e.speaker == Speaker::Ai)
    }
}

struct LiveState {
    session: ConversationSession,
    pending: Option<AbortHandle>,
    touched: Instant,
}

impl LiveState {
    fn is_finished(&self) -> bool {
        matches!(
            self.session.status,
            SessionStatus::Completed | SessionStatus::Failed
        )
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.session.status != SessionStatus::Thinking && self.touched.elapsed() >= timeout
    }
}

struct LiveSession {
    state: Mutex<LiveState>,
}

impl LiveSession {
    /// Apply `change` if the session is still on `run`. Returns whether it was applied.
    async fn update<F>(&self, run: u64, change: F) -> bool
    where
        F: FnOnce(&mut ConversationSession),
    {
        let mut state = self.state.lock().await;
        if state.session.run != run {
            debug!(
                session_id = %state.session.id,
                stale_run = run,
                current_run = state.session.run,
                "Dropping continuation of a superseded run"
            );
            return false;
        }
        change(&mut state.session);
        state.touched = Instant::now();
        true
    }
}

/// Handle to the scheduled part of one answered turn
pub struct TurnHandle {
    task: JoinHandle<bool>,
}

impl TurnHandle {
    /// Wait until the assistant has finished this turn. Returns false when the turn was
    /// superseded by a restart or failed.
    pub async fn finished(self) -> bool {
        matches!(self.task.await, Ok(true))
    }
}

/// Runs any number of sessions of one script.
///
/// Finished sessions stay readable until more than `max_finished` of them pile up or
/// they sit idle past `idle_timeout`; stale sessions are swept whenever a new one is
/// created.
pub struct ConversationEngine {
    script: Arc<ConversationScript>,
    executor: Arc<dyn StepExecutor>,
    sessions: DashMap<String, Arc<LiveSession>>,
    max_finished: usize,
    idle_timeout: Duration,
}

impl ConversationEngine {
    pub fn new(script: ConversationScript, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            script: Arc::new(script),
            executor,
            sessions: DashMap::new(),
            max_finished: DEFAULT_MAX_FINISHED_SESSIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_retention(mut self, max_finished: usize, idle_timeout: Duration) -> Self {
        self.max_finished = max_finished;
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn script(&self) -> &ConversationScript {
        &self.script
    }

    /// Open a new session under a fresh id and start it
    pub async fn create(&self) -> ConversationSession {
        self.evict_stale();
        let id = Uuid::new_v4().to_string();
        self.start(&id).await
    }

    /// Start (or restart) the session: back to step 0 with only the first prompt in the
    /// transcript. Anything still scheduled for the previous run is cancelled.
    pub async fn start(&self, session_id: &str) -> ConversationSession {
        let live = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(LiveSession {
                    state: Mutex::new(LiveState {
                        session: ConversationSession::new(session_id.to_string()),
                        pending: None,
                        touched: Instant::now(),
                    }),
                })
            })
            .clone();

        let mut state = live.state.lock().await;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.session.restart(&self.script.steps()[0].prompt);
        state.touched = Instant::now();

        info!(
            session_id = %session_id,
            run = state.session.run,
            script = %self.script.name(),
            "Conversation started"
        );
        state.session.clone()
    }

    /// Record an answer for the current step and schedule the assistant's reply
    pub async fn answer(&self, session_id: &str, choice: Choice) -> Result<TurnHandle> {
        let live = self.live(session_id)?;
        let mut state = live.state.lock().await;

        let steps = self.script.steps();
        let session = &mut state.session;
        let index = session.step_index;
        if !session.awaiting_answer() || index >= steps.len() {
            return Err(FlowError::InvalidState(format!(
                "session {} is {:?}, not awaiting an answer",
                session_id, session.status
            )));
        }
        if session.answers.contains_key(&index) {
            return Err(FlowError::InvalidState(format!(
                "step {} of session {} was already answered",
                index, session_id
            )));
        }

        let step = &steps[index];
        session.answers.insert(index, choice);
        session.push(Speaker::User, step.label(choice));
        session.status = SessionStatus::Thinking;
        let run = session.run;
        state.touched = Instant::now();

        info!(
            session_id = %session_id,
            step = index,
            choice = %choice,
            "Answer recorded"
        );

        let task = tokio::spawn(continue_turn(
            live.clone(),
            self.script.clone(),
            self.executor.clone(),
            run,
            index,
            choice,
        ));
        state.pending = Some(task.abort_handle());

        Ok(TurnHandle { task })
    }

    /// Copy of the session as it is right now
    pub async fn snapshot(&self, session_id: &str) -> Result<ConversationSession> {
        let live = self.live(session_id)?;
        let state = live.state.lock().await;
        Ok(state.session.clone())
    }

    /// Drop the session, cancelling anything still scheduled for it
    pub async fn remove(&self, session_id: &str) -> bool {
        let Some((_, live)) = self.sessions.remove(session_id) else {
            return false;
        };
        let mut state = live.state.lock().await;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        true
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop idle sessions, then all but the newest `max_finished` finished ones.
    /// Sessions that are busy (locked or thinking) are never touched.
    fn evict_stale(&self) {
        let mut idle = Vec::new();
        let mut finished = Vec::new();
        for entry in self.sessions.iter() {
            let Ok(state) = entry.value().state.try_lock() else {
                continue;
            };
            if state.is_idle(self.idle_timeout) {
                idle.push(entry.key().clone());
            } else if state.is_finished() {
                finished.push((state.touched, entry.key().clone()));
            }
        }

        finished.sort();
        let excess = finished.len().saturating_sub(self.max_finished);

        let mut evicted = 0;
        for id in idle {
            let removed = self.sessions.remove_if(&id, |_, live| {
                live.state
                    .try_lock()
                    .is_ok_and(|state| state.is_idle(self.idle_timeout))
            });
            evicted += usize::from(removed.is_some());
        }
        for (touched, id) in finished.into_iter().take(excess) {
            let removed = self.sessions.remove_if(&id, |_, live| {
                live.state
                    .try_lock()
                    .is_ok_and(|state| state.is_finished() && state.touched == touched)
            });
            evicted += usize::from(removed.is_some());
        }

        if evicted > 0 {
            debug!(evicted, remaining = self.sessions.len(), "Evicted stale sessions");
        }
    }

    fn live(&self, session_id: &str) -> Result<Arc<LiveSession>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| FlowError::session_not_found(session_id))
    }
}

async fn continue_turn(
    live: Arc<LiveSession>,
    script: Arc<ConversationScript>,
    executor: Arc<dyn StepExecutor>,
    run: u64,
    index: usize,
    choice: Choice,
) -> bool {
    match play_turn(&live, &script, executor.as_ref(), run, index, choice).await {
        Ok(applied) => applied,
        Err(e) => {
            error!(executor = executor.id(), step = index, "Step execution failed: {}", e);
            live.update(run, |session| {
                session.status = SessionStatus::Failed;
                session.error = Some(e.to_string());
            })
            .await;
            false
        }
    }
}

async fn play_turn(
    live: &LiveSession,
    script: &ConversationScript,
    executor: &dyn StepExecutor,
    run: u64,
    index: usize,
    choice: Choice,
) -> Result<bool> {
    let steps = script.steps();

    let follow_up = executor
        .next_message(MessageRequest::FollowUp {
            step: steps[index].clone(),
            choice,
        })
        .await?;
    let applied = live
        .update(run, |session| {
            if let Some(text) = follow_up {
                session.push(Speaker::Ai, text);
            }
        })
        .await;
    if !applied {
        return Ok(false);
    }

    let next = index + 1;
    if next < steps.len() {
        let prompt = executor
            .next_message(MessageRequest::Prompt {
                index: next,
                step: steps[next].clone(),
            })
            .await?
            .unwrap_or_else(|| steps[next].prompt.clone());

        return Ok(live
            .update(run, |session| {
                session.push(Speaker::Ai, prompt);
                session.step_index = next;
                session.status = SessionStatus::AwaitingAnswer;
            })
            .await);
    }

    let analyzing = executor.next_message(MessageRequest::Analyzing).await?;
    let mut answers = Answers::new();
    let applied = live
        .update(run, |session| {
            if let Some(text) = analyzing {
                session.push(Speaker::Ai, text);
            }
            answers = session.answers.clone();
        })
        .await;
    if !applied {
        return Ok(false);
    }

    executor
        .next_message(MessageRequest::Finalizing {
            answers: answers.clone(),
        })
        .await?;
    let document = script.finalize(&answers);

    let completed = live
        .update(run, |session| {
            session.final_document = Some(document);
            session.status = SessionStatus::Completed;
        })
        .await;
    if completed {
        info!(run, "Conversation completed");
    }
    Ok(completed)
}

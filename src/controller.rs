use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_stream::{AgentEvent, LineDecoder};
use pod_api::{await_or_cancel, is_cancelled, new_cancel_signal, CancelSignal, TransportSignal};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::conversation::ConversationBuilder;
use crate::error::SessionError;
use crate::message::ConversationMessage;
use crate::session::{SessionContext, SessionStatus, TurnGuards, TurnOutcome};
use crate::store::TranscriptRepository;
use crate::transport::{SessionTransport, TransportProvider, TurnRequest};

struct SessionState {
    status: SessionStatus,
    conversation: ConversationBuilder,
    context: SessionContext,
    queue: VecDeque<String>,
}

struct TurnDriver {
    cancel: CancelSignal,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

/// Orchestrates transports, retries, reconnection, resumption, and turn
/// queuing for one conversation. The only component presentation code talks
/// to.
///
/// Exactly one transport is active at any time; prompts sent while a turn is
/// in flight are queued and dispatched after the turn returns to idle.
pub struct SessionController {
    state: Mutex<SessionState>,
    provider: Arc<dyn TransportProvider>,
    repository: Arc<dyn TranscriptRepository>,
    config: SessionConfig,
    driver: Mutex<Option<TurnDriver>>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn TransportProvider>,
        repository: Arc<dyn TranscriptRepository>,
    ) -> Arc<Self> {
        let context = SessionContext::new(config.working_directory.clone());
        Arc::new(Self {
            state: Mutex::new(SessionState {
                status: SessionStatus::Idle,
                conversation: ConversationBuilder::new(),
                context,
                queue: VecDeque::new(),
            }),
            provider,
            repository,
            config,
            driver: Mutex::new(None),
        })
    }

    /// Seed the transcript from the repository. Only valid while idle.
    pub async fn load_transcript(&self) -> Result<(), SessionError> {
        let messages = self.repository.load(&self.config.conversation_id).await?;

        let mut state = self.lock_state();
        if state.status.is_busy() {
            return Err(SessionError::Busy);
        }
        state.conversation.seed(messages);
        Ok(())
    }

    /// Dispatch a prompt, or queue it when a turn is already in flight.
    ///
    /// Queued prompts dispatch automatically, exactly once, after the
    /// in-flight turn reaches idle.
    pub fn send(self: &Arc<Self>, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }
        let prompt = prompt.to_owned();

        {
            let mut state = self.lock_state();
            if state.status.is_busy() {
                info!("turn in flight; queueing prompt");
                state.queue.push_back(prompt);
                return;
            }
            state.status = SessionStatus::Connecting;
        }

        self.spawn_driver(prompt);
    }

    /// Cancel the in-flight turn from any state.
    ///
    /// Leaves the controller idle, the current message marked not-streaming,
    /// and no transport attached. Queued prompts are discarded; an explicit
    /// stop wins over auto-dispatch.
    pub fn interrupt(&self) {
        if let Some(driver) = self.lock_driver().take() {
            driver.cancel.store(true, Ordering::Release);
        }

        let mut state = self.lock_state();
        if state.status.is_idle() {
            return;
        }
        state.conversation.abandon_reconnect_epoch();
        state.conversation.finish_streaming();
        state.queue.clear();
        state.status = SessionStatus::Idle;
    }

    /// Forget the agent session and transcript for an explicit "new chat".
    pub fn reset(&self) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        if state.status.is_busy() {
            return Err(SessionError::Busy);
        }
        state.context.reset();
        state.conversation = ConversationBuilder::new();
        state.queue.clear();
        state.status = SessionStatus::Idle;
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_state().status.clone()
    }

    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.lock_state().conversation.messages().to_vec()
    }

    pub fn agent_session_id(&self) -> Option<String> {
        self.lock_state().context.agent_session_id.clone()
    }

    pub fn model_id(&self) -> Option<String> {
        self.lock_state().context.model_id.clone()
    }

    /// Wait until no turn is in flight and the queue has drained.
    pub async fn wait_until_settled(&self) {
        loop {
            {
                let state = self.lock_state();
                if !state.status.is_busy() && state.queue.is_empty() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // Driver: one spawned task per dispatch; runs the turn and any prompts
    // queued behind it, then exits.

    fn spawn_driver(self: &Arc<Self>, prompt: String) {
        let cancel = new_cancel_signal();
        let controller = Arc::clone(self);
        let driver_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            controller.drive(prompt, driver_cancel).await;
        });
        *self.lock_driver() = Some(TurnDriver { cancel, handle });
    }

    async fn drive(self: Arc<Self>, first_prompt: String, cancel: CancelSignal) {
        let mut next_prompt = Some(first_prompt);

        while let Some(prompt) = next_prompt {
            self.run_turn(&prompt, &cancel).await;
            if is_cancelled(&cancel) {
                return;
            }

            next_prompt = {
                let mut state = self.lock_state();
                if state.status.is_idle() {
                    match state.queue.pop_front() {
                        Some(queued) => {
                            state.status = SessionStatus::Connecting;
                            Some(queued)
                        }
                        None => None,
                    }
                } else {
                    None
                }
            };
        }
    }

    async fn run_turn(&self, prompt: &str, cancel: &CancelSignal) {
        {
            let mut state = self.lock_state();
            state.conversation.push_user(prompt);
            state.conversation.rebuild_correlation();
        }

        let mut guards = TurnGuards::default();

        loop {
            let resume = self.lock_state().context.agent_session_id.clone();
            guards.used_resume = resume.is_some();
            let request = TurnRequest {
                prompt: prompt.to_owned(),
                resume_session_id: resume,
                working_directory: self.config.working_directory.clone(),
            };

            {
                let mut state = self.lock_state();
                state.status = SessionStatus::Connecting;
                state.conversation.begin_assistant_turn();
            }

            let transport = match self.provider.start_turn(&request).await {
                Ok(transport) => transport,
                Err(SessionError::Cancelled) => return,
                Err(error) => {
                    self.fail_turn(error);
                    return;
                }
            };

            match self
                .consume_stream(transport, cancel, guards.used_resume)
                .await
            {
                TurnOutcome::Completed => {
                    self.complete_turn();
                    return;
                }
                TurnOutcome::Cancelled => return,
                TurnOutcome::StaleResume => {
                    info!("resume rejected by remote; retrying once without session id");
                    let mut state = self.lock_state();
                    state.context.agent_session_id = None;
                    state.context.attach = None;
                    state.conversation.discard_streaming_if_empty();
                    // used_resume is false on the next attempt, so this
                    // branch cannot repeat within the turn.
                }
                TurnOutcome::TimedOut => {
                    if guards.retried_after_timeout {
                        self.fail_turn(SessionError::Stall {
                            timeout_secs: self.config.stall_timeout.as_secs(),
                        });
                        return;
                    }
                    guards.retried_after_timeout = true;
                    warn!("no data within stall timeout; clearing remote state and retrying");
                    if let Err(error) = self.provider.clear_stalled_turn(&request).await {
                        warn!(%error, "failed to clear stalled turn state");
                    }
                    self.lock_state().conversation.discard_streaming_if_empty();
                }
                TurnOutcome::Disconnected => match self.reconnect(cancel).await {
                    TurnOutcome::Completed => {
                        self.complete_turn();
                        return;
                    }
                    TurnOutcome::Cancelled => return,
                    TurnOutcome::Failed(error) => {
                        self.fail_turn(error);
                        return;
                    }
                    _ => {
                        self.fail_turn(SessionError::Transport(
                            "reconnect ended unexpectedly".to_owned(),
                        ));
                        return;
                    }
                },
                TurnOutcome::Failed(error) => {
                    self.fail_turn(error);
                    return;
                }
            }
        }
    }

    /// Consume one transport epoch until the stream ends, stalls, or is
    /// cancelled, feeding a fresh decoder into the conversation builder.
    async fn consume_stream(
        &self,
        mut transport: Box<dyn SessionTransport>,
        cancel: &CancelSignal,
        used_resume: bool,
    ) -> TurnOutcome {
        let epoch_cancel = new_cancel_signal();
        let mut decoder = LineDecoder::default();
        let mut saw_data = false;
        let mut saw_system = false;
        let mut saw_result = false;
        let mut exit_code: Option<i32> = None;
        let mut failure: Option<String> = None;
        let mut last_save = Instant::now();

        let mut signals = match transport.open(epoch_cancel.clone()).await {
            Ok(signals) => signals,
            Err(SessionError::Cancelled) => return TurnOutcome::Cancelled,
            Err(error) => {
                debug!(%error, "transport failed to open");
                return TurnOutcome::Failed(error);
            }
        };

        loop {
            if is_cancelled(cancel) {
                break;
            }

            let received = await_or_cancel(
                tokio::time::timeout(self.config.stall_timeout, signals.recv()),
                cancel,
            )
            .await;

            let Some(received) = received else {
                break; // interrupted
            };
            let Ok(maybe_signal) = received else {
                epoch_cancel.store(true, Ordering::Release);
                transport.close().await;
                return TurnOutcome::TimedOut;
            };
            let Some(signal) = maybe_signal else {
                break; // stream ended
            };

            match signal {
                TransportSignal::Data(bytes) => {
                    if !saw_data {
                        saw_data = true;
                        self.lock_state().status = SessionStatus::Streaming;
                    }
                    let events = decoder.feed(&bytes);
                    debug!(bytes = bytes.len(), events = events.len(), "received data");
                    self.apply_events(&events, &mut saw_system, &mut saw_result);

                    if last_save.elapsed() >= self.config.save_interval {
                        self.spawn_save();
                        last_save = Instant::now();
                    }
                }
                TransportSignal::Attach(handle) => {
                    debug!(?handle, "captured reattach handle");
                    self.lock_state().context.attach = Some(handle);
                }
                TransportSignal::Exited(code) => {
                    debug!(code, "remote process exited");
                    exit_code = Some(code);
                    break;
                }
                TransportSignal::Failed(message) => {
                    debug!(%message, "transport failure signal");
                    failure = Some(message);
                    break;
                }
            }
        }

        let remaining = decoder.flush();
        if !is_cancelled(cancel) {
            self.apply_events(&remaining, &mut saw_system, &mut saw_result);
        }

        epoch_cancel.store(true, Ordering::Release);
        transport.close().await;

        if is_cancelled(cancel) {
            return TurnOutcome::Cancelled;
        }

        if saw_result || exit_code == Some(0) {
            return TurnOutcome::Completed;
        }
        if used_resume && !saw_system {
            return TurnOutcome::StaleResume;
        }
        if let Some(code) = exit_code {
            // Transport-level clean end; the agent itself failed.
            self.lock_state()
                .conversation
                .append_error(format!("agent exited with code {code}"));
            return TurnOutcome::Completed;
        }
        if saw_data {
            debug!(?failure, "stream ended abnormally after data was seen");
            return TurnOutcome::Disconnected;
        }
        TurnOutcome::Failed(SessionError::Transport(
            failure.unwrap_or_else(|| "connection closed before any data".to_owned()),
        ))
    }

    /// Reattach to the in-flight remote process, retrying without bound until
    /// cancelled or the replayed stream completes.
    async fn reconnect(&self, cancel: &CancelSignal) -> TurnOutcome {
        let handle = {
            let mut state = self.lock_state();
            state.status = SessionStatus::Reconnecting;
            state.context.attach.clone()
        };
        let Some(handle) = handle else {
            return TurnOutcome::Failed(SessionError::Transport(
                "disconnected before a reattach handle was announced".to_owned(),
            ));
        };
        info!(?handle, "reconnecting to in-flight turn");

        loop {
            if is_cancelled(cancel) {
                return TurnOutcome::Cancelled;
            }

            {
                let mut state = self.lock_state();
                state.status = SessionStatus::Reconnecting;
                state.conversation.begin_reconnect_epoch();
            }

            let transport = match self.provider.reattach(&handle).await {
                Ok(transport) => transport,
                Err(SessionError::Cancelled) => return TurnOutcome::Cancelled,
                Err(error) if error.is_fatal() => {
                    self.lock_state().conversation.abandon_reconnect_epoch();
                    return TurnOutcome::Failed(error);
                }
                Err(error) => {
                    warn!(%error, "reattach failed; retrying");
                    self.lock_state().conversation.abandon_reconnect_epoch();
                    if await_or_cancel(tokio::time::sleep(self.config.reattach_delay), cancel)
                        .await
                        .is_none()
                    {
                        return TurnOutcome::Cancelled;
                    }
                    continue;
                }
            };

            match self.consume_stream(transport, cancel, false).await {
                TurnOutcome::Completed => {
                    self.lock_state().conversation.resolve_reconnect_epoch();
                    return TurnOutcome::Completed;
                }
                TurnOutcome::Cancelled => return TurnOutcome::Cancelled,
                TurnOutcome::Failed(error) if error.is_fatal() => {
                    self.lock_state().conversation.abandon_reconnect_epoch();
                    return TurnOutcome::Failed(error);
                }
                outcome => {
                    warn!(?outcome, "reattach stream ended early; retrying");
                    self.lock_state().conversation.abandon_reconnect_epoch();
                    if await_or_cancel(tokio::time::sleep(self.config.reattach_delay), cancel)
                        .await
                        .is_none()
                    {
                        return TurnOutcome::Cancelled;
                    }
                }
            }
        }
    }

    fn apply_events(&self, events: &[AgentEvent], saw_system: &mut bool, saw_result: &mut bool) {
        if events.is_empty() {
            return;
        }

        let mut state = self.lock_state();
        for event in events {
            match event {
                AgentEvent::System(system) => {
                    *saw_system = true;
                    state.context.agent_session_id = Some(system.session_id.clone());
                    if system.model.is_some() {
                        state.context.model_id = system.model.clone();
                    }
                    info!(session_id = %system.session_id, "agent session established");
                }
                AgentEvent::Result(result) => {
                    *saw_result = true;
                    state.context.agent_session_id = Some(result.session_id.clone());
                    if result.is_error {
                        state
                            .conversation
                            .append_error("agent reported an error result".to_owned());
                    }
                }
                AgentEvent::Assistant(_) | AgentEvent::User(_) => {}
                AgentEvent::Unknown(event_type) => {
                    debug!(%event_type, "ignoring unknown agent event");
                }
            }
            state.conversation.apply(event);
        }
    }

    fn complete_turn(&self) {
        {
            let mut state = self.lock_state();
            state.conversation.finish_streaming();
            state.status = SessionStatus::Idle;
        }
        self.spawn_save();
    }

    fn fail_turn(&self, error: SessionError) {
        warn!(%error, "turn failed");
        {
            let mut state = self.lock_state();
            state.conversation.append_error(error.to_string());
            state.conversation.finish_streaming();
            state.queue.clear();
            state.status = SessionStatus::Error(error.to_string());
        }
        self.spawn_save();
    }

    /// Fire-and-forget transcript persistence; never blocks the event loop.
    fn spawn_save(&self) {
        let snapshot = self.lock_state().conversation.messages().to_vec();
        let repository = Arc::clone(&self.repository);
        let conversation_id = self.config.conversation_id.clone();

        tokio::spawn(async move {
            if let Err(error) = repository.save(&conversation_id, &snapshot).await {
                warn!(%error, "failed to persist transcript");
            }
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        lock_unpoisoned(&self.state)
    }

    fn lock_driver(&self) -> MutexGuard<'_, Option<TurnDriver>> {
        lock_unpoisoned(&self.driver)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

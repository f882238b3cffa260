//! Voice Assistant Session
//!
//! Drives one cook through one recipe over a realtime bridge. A session runs as
//! a small group of cooperating tasks:
//!
//! - the **dispatch loop** (this module's `run`), the only code that touches
//!   [`SessionState`]: it consumes bridge events, dispatches function calls and
//!   reacts to timer ticks;
//! - the **audio relay**, which forwards client audio straight to the bridge;
//! - the **tick** task, which wakes the dispatch loop on a fixed period so it can
//!   poll for expired timers.
//!
//! The lifecycle is linear: `Connecting -> Active -> Closing -> Closed`.

mod state;

pub use state::{ConnectionState, DispatchOutcome, SessionState};

use crate::{
    bridge::{BridgeEvent, BridgeSender, RealtimeBridge, RealtimeProvider, SessionSetup},
    error::{BridgeErrorKind, SessionError},
    events::{ClientInput, ControlEvent, SessionOutput},
    recipe::RecipeDocument,
    timer::Timer,
    tools::tool_specs,
};
use bytes::Bytes;
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const INBOUND_BUFFER: usize = 64;
const OUTBOUND_BUFFER: usize = 256;
const MIN_TICK: Duration = Duration::from_millis(100);

/// Instructions used when no template is configured. `{title}` and
/// `{recipe_json}` are substituted per session.
pub const DEFAULT_INSTRUCTIONS: &str = "You are Recipe Road, a friendly voice assistant guiding a cook through \"{title}\" one step at a time. \
Keep answers short and spoken-friendly. Use the provided functions to track progress and timers; never invent step numbers.\n\n\
Recipe:\n{recipe_json}";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period of the timer tick.
    pub tick_interval: Duration,
    /// Forward transcripts of the cook's speech as `transcript` control events.
    pub surface_transcripts: bool,
    pub instructions_template: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            surface_transcripts: true,
            instructions_template: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }
}

impl SessionConfig {
    /// Renders the system instructions for one recipe.
    pub fn render_instructions(&self, recipe: &RecipeDocument) -> String {
        let recipe_json = serde_json::to_string_pretty(recipe).unwrap_or_default();
        self.instructions_template
            .replace("{title}", &recipe.title)
            .replace("{recipe_json}", &recipe_json)
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// The client asked to end the session.
    ClientEnded,
    /// The client went away (all handles dropped or the output stream closed).
    ClientDisconnected,
    /// The bridge reported `Closed`.
    BridgeClosed,
    /// Connecting failed, or the bridge reported a fatal error.
    Failed(SessionError),
}

/// Final state of a session after `run` returns.
pub struct SessionOutcome {
    pub state: SessionState,
    pub reason: CloseReason,
}

/// Client-side handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    inbound: mpsc::Sender<ClientInput>,
    status: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Feeds a chunk of microphone audio into the session.
    ///
    /// Audio sent while connecting is buffered and flushed once the bridge is up.
    pub async fn send_audio(&self, chunk: Bytes) -> Result<(), SessionError> {
        if !self.state().accepts_work() {
            return Err(SessionError::SessionClosed);
        }
        self.inbound
            .send(ClientInput::Audio(chunk))
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Asks the session to end.
    pub async fn end(&self) -> Result<(), SessionError> {
        if !self.state().accepts_work() {
            return Err(SessionError::SessionClosed);
        }
        self.inbound
            .send(ClientInput::End)
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Resolves once the session reached `Closed`.
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        let _ = status
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

pub struct VoiceSession {
    state: SessionState,
    config: SessionConfig,
    inbound: Option<mpsc::Receiver<ClientInput>>,
    outbound: mpsc::Sender<SessionOutput>,
    status: watch::Sender<ConnectionState>,
    /// The latest instruction, replayed at most once after a recoverable
    /// bridge error.
    replayable: Option<String>,
}

impl VoiceSession {
    /// Creates a session in `Connecting` together with its client handle and
    /// the stream of outbound audio and control events.
    pub fn new(
        id: Uuid,
        recipe: Arc<RecipeDocument>,
        config: SessionConfig,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionOutput>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Connecting);
        let session = Self {
            state: SessionState::new(id, recipe),
            config,
            inbound: Some(inbound_rx),
            outbound: outbound_tx,
            status: status_tx,
            replayable: None,
        };
        let handle = SessionHandle {
            id,
            inbound: inbound_tx,
            status: status_rx,
        };
        (session, handle, outbound_rx)
    }

    /// Runs the session to completion.
    pub async fn run(mut self, provider: Arc<dyn RealtimeProvider>) -> SessionOutcome {
        let Some(mut inbound) = self.inbound.take() else {
            return self.finish(CloseReason::Failed(SessionError::SessionClosed));
        };

        // CONNECTING: buffer client audio until the handshake completes.
        let setup = SessionSetup {
            instructions: self.config.render_instructions(self.state.recipe()),
            tools: tool_specs(),
        };
        let mut pending_audio: Vec<Bytes> = Vec::new();
        let mut connect = provider.connect(setup);
        let connected = loop {
            tokio::select! {
                result = &mut connect => break result,
                input = inbound.recv() => match input {
                    Some(ClientInput::Audio(chunk)) => pending_audio.push(chunk),
                    Some(ClientInput::End) => {
                        info!("Client ended the session before the bridge connected.");
                        return self.close(None, CloseReason::ClientEnded).await;
                    }
                    None => {
                        info!("Client left before the bridge connected.");
                        return self.close(None, CloseReason::ClientDisconnected).await;
                    }
                },
            }
        };
        drop(connect);

        let mut bridge = match connected {
            Ok(bridge) => bridge,
            Err(e) => {
                error!(error = %e, "Failed to connect the realtime bridge");
                let kind = match &e {
                    SessionError::Bridge { kind, .. } => kind.to_string(),
                    _ => BridgeErrorKind::Fatal.to_string(),
                };
                self.emit_control(ControlEvent::Error {
                    kind,
                    message: e.to_string(),
                })
                .await;
                return self.close(None, CloseReason::Failed(e)).await;
            }
        };
        let Some(mut events) = bridge.receive() else {
            let e = SessionError::fatal("bridge events were already taken");
            return self.close(Some(bridge), CloseReason::Failed(e)).await;
        };
        let sender = bridge.sender();

        // ACTIVE
        self.transition(ConnectionState::Active);
        if !pending_audio.is_empty() {
            debug!(chunks = pending_audio.len(), "Flushing audio buffered while connecting");
        }
        if pending_audio
            .into_iter()
            .any(|chunk| sender.send_audio(chunk).is_err())
        {
            return self.close(Some(bridge), CloseReason::BridgeClosed).await;
        }
        let recipe = self.state.recipe();
        let started = ControlEvent::SessionStarted {
            session_id: self.state.session_id,
            recipe_title: recipe.title.clone(),
            total_steps: recipe.total_steps(),
        };
        let kickoff = self.kickoff_instruction();
        self.emit_control(started).await;
        if self.instruct(&sender, kickoff).is_err() {
            drop(events);
            return self.close(Some(bridge), CloseReason::BridgeClosed).await;
        }

        let mut relay = tokio::spawn(relay_audio(inbound, sender.clone()));
        let (tick_tx, mut ticks) = mpsc::channel(1);
        let ticker = tokio::spawn(tick(self.config.tick_interval.max(MIN_TICK), tick_tx));

        let reason = loop {
            tokio::select! {
                finished = &mut relay => {
                    break finished.unwrap_or(CloseReason::ClientDisconnected);
                }
                Some(()) = ticks.recv() => {
                    if let Some(reason) = self.fire_due_timers(&sender).await {
                        break reason;
                    }
                }
                event = events.next() => match event {
                    Some(BridgeEvent::Closed) | None => {
                        info!("Realtime bridge closed.");
                        break CloseReason::BridgeClosed;
                    }
                    Some(event) => {
                        if let Some(reason) = self.handle_event(event, &sender).await {
                            break reason;
                        }
                    }
                },
            }
        };

        relay.abort();
        ticker.abort();
        drop(events);
        self.close(Some(bridge), reason).await
    }

    async fn handle_event(
        &mut self,
        event: BridgeEvent,
        sender: &BridgeSender,
    ) -> Option<CloseReason> {
        match event {
            BridgeEvent::AudioChunk(chunk) => {
                if !self.emit(SessionOutput::Audio(chunk)).await {
                    return Some(CloseReason::ClientDisconnected);
                }
            }
            BridgeEvent::Transcript { text, is_final } => {
                debug!(%text, is_final, "Transcript");
                if self.config.surface_transcripts
                    && !self
                        .emit_control(ControlEvent::Transcript { text, is_final })
                        .await
                {
                    return Some(CloseReason::ClientDisconnected);
                }
            }
            BridgeEvent::FunctionCallRequest {
                call_id,
                name,
                arguments,
            } => {
                let outcome = self.state.dispatch(&name, &arguments);
                for event in outcome.events {
                    if !self.emit_control(event).await {
                        return Some(CloseReason::ClientDisconnected);
                    }
                }
                if sender
                    .send_function_result(call_id, name, outcome.result.to_string())
                    .is_err()
                {
                    return Some(CloseReason::BridgeClosed);
                }
                if outcome.recipe_complete {
                    let closing = format!(
                        "The cook has finished every step of \"{}\". Congratulate them and wrap up warmly.",
                        self.state.recipe().title
                    );
                    if self.instruct(sender, closing).is_err() {
                        return Some(CloseReason::BridgeClosed);
                    }
                }
            }
            BridgeEvent::Error {
                kind: BridgeErrorKind::Recoverable,
                message,
            } => {
                match self.replayable.take() {
                    Some(last) => {
                        warn!(%message, "Recoverable bridge error; re-sending last instruction");
                        if sender.send_instruction(last).is_err() {
                            return Some(CloseReason::BridgeClosed);
                        }
                    }
                    None => warn!(%message, "Recoverable bridge error; nothing left to replay"),
                }
            }
            BridgeEvent::Error {
                kind: BridgeErrorKind::Fatal,
                message,
            } => {
                error!(%message, "Fatal bridge error");
                self.emit_control(ControlEvent::Error {
                    kind: BridgeErrorKind::Fatal.to_string(),
                    message: message.clone(),
                })
                .await;
                return Some(CloseReason::Failed(SessionError::Bridge {
                    kind: BridgeErrorKind::Fatal,
                    message,
                }));
            }
            BridgeEvent::Closed => return Some(CloseReason::BridgeClosed),
        }
        None
    }

    async fn fire_due_timers(&mut self, sender: &BridgeSender) -> Option<CloseReason> {
        for timer in self.state.poll_expired_timers() {
            info!(timer_id = %timer.id, label = %timer.label, "Timer fired");
            if self.instruct(sender, timer_announcement(&timer)).is_err() {
                return Some(CloseReason::BridgeClosed);
            }
            let fired = ControlEvent::TimerFired {
                timer_id: timer.id,
                label: timer.label,
            };
            if !self.emit_control(fired).await {
                return Some(CloseReason::ClientDisconnected);
            }
        }
        None
    }

    fn kickoff_instruction(&self) -> String {
        let step = self.state.tracker().current();
        format!(
            "The cook is ready to start \"{}\". Greet them in one sentence, then read step {} of {}: {}",
            self.state.recipe().title,
            step.index + 1,
            self.state.tracker().total_steps(),
            step.instruction
        )
    }

    fn instruct(&mut self, sender: &BridgeSender, text: String) -> Result<(), SessionError> {
        self.replayable = Some(text.clone());
        sender.send_instruction(text)
    }

    async fn emit(&self, output: SessionOutput) -> bool {
        self.outbound.send(output).await.is_ok()
    }

    async fn emit_control(&self, event: ControlEvent) -> bool {
        self.emit(SessionOutput::Control(event)).await
    }

    fn transition(&mut self, next: ConnectionState) {
        self.state.set_connection_state(next);
        self.status.send_replace(self.state.connection_state());
    }

    /// CLOSING -> CLOSED: cancel running timers, release the bridge.
    async fn close(mut self, bridge: Option<RealtimeBridge>, reason: CloseReason) -> SessionOutcome {
        self.transition(ConnectionState::Closing);
        let cancelled = self.state.cancel_all_timers();
        if !cancelled.is_empty() {
            info!(count = cancelled.len(), "Cancelled running timers on teardown");
        }
        if let Some(bridge) = bridge {
            bridge.close().await;
        }
        self.finish(reason)
    }

    fn finish(mut self, reason: CloseReason) -> SessionOutcome {
        self.transition(ConnectionState::Closed);
        info!(?reason, "Session closed");
        SessionOutcome {
            state: self.state,
            reason,
        }
    }
}

fn timer_announcement(timer: &Timer) -> String {
    format!(
        "The \"{}\" timer ({}) has just finished. Let the cook know right away.",
        timer.label, timer.id
    )
}

/// Pass-through from the client to the bridge. Touches no session state.
async fn relay_audio(mut inbound: mpsc::Receiver<ClientInput>, bridge: BridgeSender) -> CloseReason {
    while let Some(input) = inbound.recv().await {
        match input {
            ClientInput::Audio(chunk) => {
                if bridge.send_audio(chunk).is_err() {
                    return CloseReason::BridgeClosed;
                }
            }
            ClientInput::End => {
                info!("Client ended the session.");
                return CloseReason::ClientEnded;
            }
        }
    }
    info!("Client disconnected.");
    CloseReason::ClientDisconnected
}

async fn tick(period: Duration, ticks: mpsc::Sender<()>) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if ticks.send(()).await.is_err() {
            break;
        }
    }
}

/// Spawns `run` on the runtime.
pub fn spawn(
    session: VoiceSession,
    provider: Arc<dyn RealtimeProvider>,
) -> JoinHandle<SessionOutcome> {
    tokio::spawn(session.run(provider))
}

//! Per-connection session orchestration.
//!
//! One task per connection owns the browser instance and its page
//! exclusively. Streamer ticks and operator commands flow through a single
//! FIFO action queue, so no two page mutations are ever in flight at once
//! for one connection. Disconnect cancels the queue; an automation call
//! already underway settles before teardown proceeds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use authtunnel_browser::{Driver, Instance, LaunchOptions, Page};
use authtunnel_core::protocol::{Command, ServerEvent};

use crate::{capture, commands};

/// Work items serialized through the per-connection FIFO queue.
#[derive(Debug)]
pub enum SessionAction {
    /// Periodic frame push from the streamer.
    Tick,
    /// A boundary-validated operator command.
    Dispatch(Command),
}

/// Connection lifecycle states. `Closed` is terminal; re-entry is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Launching,
    Active,
    Capturing,
    Closed,
}

/// Everything one session task needs, wired up by the connection handler.
pub struct SessionContext {
    pub conn_id: String,
    pub driver: Arc<dyn Driver>,
    pub launch: LaunchOptions,
    pub start_url: String,
    pub artifact_path: PathBuf,
    pub frame_interval: Duration,
    pub events: mpsc::UnboundedSender<ServerEvent>,
    pub cancel: CancellationToken,
}

pub struct Session {
    ctx: SessionContext,
    phase: SessionPhase,
    instance: Option<Box<dyn Instance>>,
    page: Option<Box<dyn Page>>,
    streamer: Option<JoinHandle<()>>,
    /// Per-action failures discarded this session; logged at teardown only.
    swallowed: u64,
}

impl Session {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            phase: SessionPhase::Idle,
            instance: None,
            page: None,
            streamer: None,
            swallowed: 0,
        }
    }

    /// Drive the session to completion: launch, consume the action queue
    /// until the transport closes or a fatal error occurs, then reap.
    pub async fn run(
        mut self,
        action_tx: mpsc::Sender<SessionAction>,
        mut actions: mpsc::Receiver<SessionAction>,
    ) {
        if let Err(message) = self.launch(action_tx).await {
            warn!(conn_id = %self.ctx.conn_id, %message, "Browser launch failed");
            let _ = self.ctx.events.send(ServerEvent::Fatal { message });
            self.close().await;
            self.ctx.cancel.cancel();
            return;
        }

        let cancel = self.ctx.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                action = actions.recv() => match action {
                    Some(action) => self.handle(action).await,
                    None => break,
                },
            }
        }

        self.close().await;
    }

    async fn launch(&mut self, action_tx: mpsc::Sender<SessionAction>) -> Result<(), String> {
        self.phase = SessionPhase::Launching;

        let instance = self
            .ctx
            .driver
            .launch(&self.ctx.launch)
            .await
            .map_err(|e| e.to_string())?;

        let page = match instance.new_page().await {
            Ok(page) => page,
            Err(e) => {
                // Let the reaper tear down the half-launched instance.
                self.instance = Some(instance);
                return Err(e.to_string());
            }
        };
        self.instance = Some(instance);

        // Best-effort landing page; the operator can navigate from anywhere.
        if let Err(e) = page.goto(&self.ctx.start_url).await {
            debug!(conn_id = %self.ctx.conn_id, %e, "Initial navigation failed");
            self.swallowed += 1;
        }
        self.page = Some(page);

        // Streamer: one tick per interval into the shared FIFO queue. A full
        // queue drops the tick; the next one tries again.
        let cancel = self.ctx.cancel.clone();
        let interval = self.ctx.frame_interval;
        self.streamer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = action_tx.try_send(SessionAction::Tick);
                    }
                }
            }
        }));

        self.phase = SessionPhase::Active;
        info!(conn_id = %self.ctx.conn_id, "Browser ready, streaming frames");
        Ok(())
    }

    async fn handle(&mut self, action: SessionAction) {
        match action {
            SessionAction::Tick => {
                // Ticks only produce frames while healthy and not
                // mid-capture; a skipped tick is silent.
                if self.phase == SessionPhase::Active {
                    self.push_frame().await;
                }
            }
            SessionAction::Dispatch(Command::FinishCapture) => self.capture().await,
            SessionAction::Dispatch(command) => {
                let Some(page) = self.page.as_deref() else {
                    return;
                };
                match commands::dispatch(page, &command).await {
                    // Out-of-band push for low-latency input feedback.
                    Ok(true) => self.push_frame().await,
                    Ok(false) => {}
                    Err(e) => {
                        // Per-action failures never terminate the connection
                        // and are invisible to the operator.
                        self.swallowed += 1;
                        debug!(conn_id = %self.ctx.conn_id, %e, "Command failed; discarded");
                    }
                }
            }
        }
    }

    async fn capture(&mut self) {
        let Some(page) = self.page.as_deref() else {
            return;
        };
        self.phase = SessionPhase::Capturing;
        match capture::capture_session(page, &self.ctx.artifact_path).await {
            Ok(_) => {
                info!(
                    conn_id = %self.ctx.conn_id,
                    path = %self.ctx.artifact_path.display(),
                    "Session captured"
                );
                let _ = self.ctx.events.send(ServerEvent::Captured { success: true });
            }
            Err(e) => {
                // Known gap: no acknowledgment of any kind reaches the
                // operator on a failed write.
                warn!(conn_id = %self.ctx.conn_id, %e, "Session capture failed");
                self.swallowed += 1;
            }
        }
        // Capture never ends the session.
        self.phase = SessionPhase::Active;
    }

    async fn push_frame(&mut self) {
        let Some(page) = self.page.as_deref() else {
            return;
        };
        match page.screenshot().await {
            Ok(bytes) => {
                let _ = self.ctx.events.send(ServerEvent::Screenshot {
                    data: BASE64.encode(bytes),
                });
            }
            Err(_) => {
                // Page mid-teardown; the next tick simply tries again.
            }
        }
    }

    /// Lifecycle reaper. Order matters: stop the streamer first so no tick
    /// can touch a closing page, then tear down the instance. Safe to call
    /// repeatedly or on a partially-launched session.
    async fn close(&mut self) {
        if let Some(streamer) = self.streamer.take() {
            streamer.abort();
        }
        self.page = None;
        if let Some(mut instance) = self.instance.take() {
            if let Err(e) = instance.close().await {
                warn!(conn_id = %self.ctx.conn_id, %e, "Instance teardown reported an error");
            }
        }
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closed;
            if self.swallowed > 0 {
                info!(
                    conn_id = %self.ctx.conn_id,
                    count = self.swallowed,
                    "Discarded per-action failures during session"
                );
            }
            debug!(conn_id = %self.ctx.conn_id, "Session closed");
        }
    }
}

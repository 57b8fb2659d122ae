//! One engine process and the protocol state machine around it.
//!
//! Output from the engine is read by a dedicated task that never blocks on
//! a consumer: every line is parsed and routed to whichever request owns
//! the session at that moment (handshake, analysis subscriber, pending
//! search or a drain after `stop`). Requests run on the caller's task and
//! talk to the reader only through channels.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chess_core::PositionLine;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisInfo, AnalysisLimits, AnalysisStream, BestMove, SearchLimits};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::options::{find_option, OptionSpec, OptionValue};
use crate::protocol::{EngineEvent, Protocol};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Launching,
    Handshaking,
    Idle,
    Analyzing,
    Searching,
    Quitting,
}

impl SessionState {
    /// Ready for requests.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Analyzing | SessionState::Searching
        )
    }
}

/// Who receives the engine's output right now.
enum Route {
    Idle,
    Handshake(mpsc::UnboundedSender<EngineEvent>),
    Analysis,
    Search(oneshot::Sender<Result<BestMove, EngineError>>),
    /// Waiting for the event that ends a stopped analysis.
    Draining(oneshot::Sender<Result<(), EngineError>>),
}

struct Analysis {
    tx: mpsc::UnboundedSender<AnalysisInfo>,
    limits: AnalysisLimits,
    fixed: bool,
    fen: String,
}

struct Inner {
    route: Route,
    protocol: Protocol,
    declared: Vec<OptionSpec>,
    /// Values set by the user, keyed by the declared option name
    stored: BTreeMap<String, String>,
    engine_name: Option<String>,
    analysis: Option<Analysis>,
}

struct Shared {
    name: String,
    state: watch::Sender<SessionState>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}

pub struct EngineSession {
    config: EngineConfig,
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl EngineSession {
    pub fn new(config: EngineConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let inner = Inner {
            route: Route::Idle,
            protocol: Protocol::new(config.dialect),
            declared: Vec::new(),
            stored: config.options.clone(),
            engine_name: None,
            analysis: None,
        };
        Self {
            shared: Arc::new(Shared {
                name: config.name.clone(),
                state,
                inner: Mutex::new(inner),
            }),
            config,
            writer: tokio::sync::Mutex::new(None),
            child: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Name the engine reported during the handshake.
    pub fn engine_name(&self) -> Option<String> {
        self.shared.lock().engine_name.clone()
    }

    /// Current configuration, including option values set since loading.
    pub fn config(&self) -> EngineConfig {
        let mut config = self.config.clone();
        config.options = self.shared.lock().stored.clone();
        config
    }

    // ---- Lifecycle ----

    /// Spawn the engine binary and run the handshake.
    pub async fn load(&self) -> Result<(), EngineError> {
        self.begin_launch()?;
        let mut child = match Command::new(&self.config.path)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.shared.set_state(SessionState::Disconnected);
                return Err(EngineError::Spawn(format!("{}: {e}", self.config.path)));
            }
        };
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            self.shared.set_state(SessionState::Disconnected);
            return Err(EngineError::Spawn("engine stdio not captured".to_string()));
        };
        info!(engine = %self.config.name, path = %self.config.path, pid = ?child.id(), "engine spawned");
        *lock(&self.child) = Some(child);
        self.connect(stdout, stdin).await
    }

    /// Run the session over an already connected byte stream instead of a
    /// spawned process.
    pub async fn attach<R, W>(&self, reader: R, writer: W) -> Result<(), EngineError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.begin_launch()?;
        self.connect(reader, writer).await
    }

    fn begin_launch(&self) -> Result<(), EngineError> {
        let _inner = self.shared.lock();
        if self.shared.state() != SessionState::Disconnected {
            return Err(EngineError::Busy("engine already loaded"));
        }
        self.shared.set_state(SessionState::Launching);
        Ok(())
    }

    async fn connect<R, W>(&self, reader: R, writer: W) -> Result<(), EngineError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        *self.writer.lock().await = Some(Box::new(writer));
        {
            let mut inner = self.shared.lock();
            inner.protocol = Protocol::new(self.config.dialect);
            inner.declared.clear();
            inner.engine_name = None;
        }
        let handle = tokio::spawn(read_loop(Arc::clone(&self.shared), reader));
        *lock(&self.reader) = Some(handle);

        let deadline = Instant::now() + self.config.handshake_timeout();
        match timeout_at(deadline, self.handshake()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.shutdown().await;
                return Err(e);
            }
            Err(_) => {
                warn!(engine = %self.config.name, "handshake timed out");
                self.shutdown().await;
                return Err(EngineError::EngineTimeout("handshake"));
            }
        }

        self.apply_stored_options().await?;
        {
            let mut inner = self.shared.lock();
            inner.route = Route::Idle;
            self.shared.set_state(SessionState::Idle);
            info!(
                engine = %self.config.name,
                id = inner.engine_name.as_deref().unwrap_or("?"),
                options = inner.declared.len(),
                "engine ready"
            );
        }
        Ok(())
    }

    async fn handshake(&self) -> Result<(), EngineError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let identify = {
            let mut inner = self.shared.lock();
            inner.route = Route::Handshake(tx);
            self.shared.set_state(SessionState::Handshaking);
            inner.protocol.identify()
        };
        self.send_all(&identify).await?;

        loop {
            match rx.recv().await.ok_or(EngineError::EngineCrash)? {
                EngineEvent::Id(name) => self.shared.lock().engine_name = Some(name),
                EngineEvent::Option(spec) => self.shared.lock().declared.push(spec),
                EngineEvent::Feature { name, value } => {
                    let reply = self.shared.lock().protocol.accept_feature(&name, &value);
                    if let Some(reply) = reply {
                        self.send(&reply).await?;
                    }
                }
                EngineEvent::HandshakeDone => break,
                _ => {}
            }
        }

        let ready = self.shared.lock().protocol.ready();
        self.send(&ready).await?;
        loop {
            if let EngineEvent::Ready = rx.recv().await.ok_or(EngineError::EngineCrash)? {
                return Ok(());
            }
        }
    }

    async fn apply_stored_options(&self) -> Result<(), EngineError> {
        let commands: Vec<String> = {
            let mut inner = self.shared.lock();
            let stored = std::mem::take(&mut inner.stored);
            let mut commands = Vec::new();
            for (name, raw) in stored {
                let Some(spec) = find_option(&inner.declared, &name).cloned() else {
                    warn!(engine = %self.config.name, option = %name, "stored option not declared by engine");
                    inner.stored.insert(name, raw);
                    continue;
                };
                match spec.validate(&raw) {
                    Ok(value) => {
                        commands.push(inner.protocol.set_option(&spec, &value));
                        inner.stored.insert(spec.name.clone(), value.to_string());
                    }
                    Err(e) => {
                        warn!(engine = %self.config.name, error = %e, "dropping stored option");
                    }
                }
            }
            commands
        };
        self.send_all(&commands).await
    }

    /// Ask the engine to exit, killing it after the grace period. Pending
    /// requests fail with [`EngineError::EngineGone`].
    pub async fn quit(&self) -> Result<(), EngineError> {
        let quit = {
            let mut inner = self.shared.lock();
            if self.shared.state() == SessionState::Disconnected {
                return Ok(());
            }
            self.shared.set_state(SessionState::Quitting);
            fail_route(&mut inner.route, EngineError::EngineGone);
            inner.analysis = None;
            inner.protocol.quit()
        };
        let _ = self.send(&quit).await;

        let child = lock(&self.child).take();
        let reader = lock(&self.reader).take();
        if let Some(mut child) = child {
            if timeout(self.config.quit_grace(), child.wait()).await.is_err() {
                warn!(engine = %self.config.name, "engine ignored quit, killing");
                let _ = child.kill().await;
            }
        } else if let Some(reader) = &reader {
            let _ = timeout(self.config.quit_grace(), async {
                while !reader.is_finished() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
        }
        if let Some(reader) = reader {
            reader.abort();
        }
        *self.writer.lock().await = None;
        self.shared.set_state(SessionState::Disconnected);
        info!(engine = %self.config.name, "engine quit");
        Ok(())
    }

    /// Tear everything down immediately.
    async fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            fail_route(&mut inner.route, EngineError::EngineGone);
            inner.analysis = None;
            self.shared.set_state(SessionState::Disconnected);
        }
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        if let Some(mut child) = lock(&self.child).take() {
            let _ = child.start_kill();
        }
        *self.writer.lock().await = None;
    }

    // ---- I/O ----

    async fn send(&self, cmd: &str) -> Result<(), EngineError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(EngineError::EngineGone)?;
        debug!(engine = %self.config.name, cmd, "engine <");
        writer
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| EngineError::Io(format!("Failed to write to engine: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| EngineError::Io(format!("Failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    async fn send_all(&self, cmds: &[String]) -> Result<(), EngineError> {
        for cmd in cmds {
            self.send(cmd).await?;
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<SessionState, EngineError> {
        let state = self.shared.state();
        match state {
            SessionState::Disconnected | SessionState::Quitting => Err(EngineError::EngineGone),
            SessionState::Launching | SessionState::Handshaking => {
                Err(EngineError::Busy("engine is still starting"))
            }
            _ => Ok(state),
        }
    }

    // ---- Options ----

    pub fn options(&self) -> Vec<OptionSpec> {
        self.shared.lock().declared.clone()
    }

    /// Validate and record an option value, sending it right away when the
    /// engine is running.
    pub async fn config_set(&self, name: &str, raw: &str) -> Result<OptionValue, EngineError> {
        let (command, value) = {
            let mut inner = self.shared.lock();
            let spec = find_option(&inner.declared, name)
                .cloned()
                .ok_or_else(|| EngineError::InvalidOption(name.to_string()))?;
            let value = spec.validate(raw)?;
            if !spec.is_button() {
                inner.stored.insert(spec.name.clone(), value.to_string());
            }
            let command = self
                .shared
                .state()
                .is_ready()
                .then(|| inner.protocol.set_option(&spec, &value));
            (command, value)
        };
        if let Some(command) = command {
            self.send(&command).await?;
        }
        Ok(value)
    }

    /// The stored value, or the declared default.
    pub fn config_get(&self, name: &str) -> Result<OptionValue, EngineError> {
        let inner = self.shared.lock();
        let spec = find_option(&inner.declared, name)
            .ok_or_else(|| EngineError::InvalidOption(name.to_string()))?;
        match inner.stored.get(&spec.name) {
            Some(raw) => spec.validate(raw),
            None => Ok(spec.default_value()),
        }
    }

    /// Forget a stored value and restore the engine's default.
    pub async fn config_unset(&self, name: &str) -> Result<(), EngineError> {
        let command = {
            let mut inner = self.shared.lock();
            let spec = find_option(&inner.declared, name)
                .cloned()
                .ok_or_else(|| EngineError::InvalidOption(name.to_string()))?;
            let removed = inner.stored.remove(&spec.name).is_some();
            (removed && self.shared.state().is_ready())
                .then(|| inner.protocol.set_option(&spec, &spec.default_value()))
        };
        if let Some(command) = command {
            self.send(&command).await?;
        }
        Ok(())
    }

    // ---- Analysis ----

    /// Start analysing `line`, replacing any running analysis. Unless
    /// `fixed` is set, [`EngineSession::follow_position`] restarts the
    /// analysis on new positions and keeps feeding the same stream.
    pub async fn analysis_start(
        &self,
        line: &PositionLine,
        limits: AnalysisLimits,
        fixed: bool,
    ) -> Result<AnalysisStream, EngineError> {
        match self.ensure_ready()? {
            // A search runs to completion; only go() preempts the other way.
            SessionState::Searching => return Err(EngineError::Busy("a search is in progress")),
            SessionState::Analyzing => self.analysis_stop().await?,
            _ => {}
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut commands = Vec::new();
        {
            let mut inner = self.shared.lock();
            if let Some(option) = inner.protocol.multipv_option() {
                if let Some(spec) = find_option(&inner.declared, option).cloned() {
                    match spec.validate(&limits.multipv.to_string()) {
                        Ok(value) => commands.push(inner.protocol.set_option(&spec, &value)),
                        Err(e) => debug!(engine = %self.config.name, error = %e, "multipv not applied"),
                    }
                }
            }
            commands.extend(inner.protocol.set_position(line));
            commands.extend(inner.protocol.analyze(&limits));
            inner.analysis = Some(Analysis {
                tx,
                limits,
                fixed,
                fen: line.fen.clone(),
            });
            inner.route = Route::Analysis;
            self.shared.set_state(SessionState::Analyzing);
        }
        self.send_all(&commands).await?;
        Ok(AnalysisStream::new(rx))
    }

    /// Re-target a running, non-fixed analysis at a new position. Returns
    /// whether the analysis was restarted.
    pub async fn follow_position(&self, line: &PositionLine) -> Result<bool, EngineError> {
        {
            let inner = self.shared.lock();
            let Some(analysis) = &inner.analysis else {
                return Ok(false);
            };
            if analysis.fixed
                || analysis.fen == line.fen
                || self.shared.state() != SessionState::Analyzing
            {
                return Ok(false);
            }
        }
        self.drain_analysis().await?;

        let commands = {
            let mut inner = self.shared.lock();
            let Some(limits) = inner.analysis.as_mut().map(|a| {
                a.fen = line.fen.clone();
                a.limits.clone()
            }) else {
                return Ok(false);
            };
            let mut commands = inner.protocol.set_position(line);
            commands.extend(inner.protocol.analyze(&limits));
            inner.route = Route::Analysis;
            self.shared.set_state(SessionState::Analyzing);
            commands
        };
        self.send_all(&commands).await?;
        Ok(true)
    }

    /// Stop analysing. A no-op when no analysis is running.
    pub async fn analysis_stop(&self) -> Result<(), EngineError> {
        if self.shared.state() != SessionState::Analyzing {
            self.shared.lock().analysis = None;
            return Ok(());
        }
        self.drain_analysis().await?;
        self.shared.lock().analysis = None;
        Ok(())
    }

    /// Send the stop command and wait for the engine to acknowledge it,
    /// discarding output for the old position in between.
    async fn drain_analysis(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        let commands = {
            let mut inner = self.shared.lock();
            inner.route = Route::Draining(tx);
            inner.protocol.stop_analysis()
        };
        self.send_all(&commands).await?;
        match timeout(self.config.handshake_timeout(), rx).await {
            Ok(Ok(drained)) => {
                drained?;
                let mut inner = self.shared.lock();
                if self.shared.state() == SessionState::Analyzing {
                    inner.route = Route::Idle;
                    self.shared.set_state(SessionState::Idle);
                }
                Ok(())
            }
            Ok(Err(_)) => Err(EngineError::EngineCrash),
            Err(_) => {
                self.shutdown().await;
                Err(EngineError::EngineTimeout("stop"))
            }
        }
    }

    // ---- Searching ----

    /// Ask for a best move. A running analysis is stopped first.
    ///
    /// With a bounded search (move time or clock) the engine is told to
    /// stop `stop_grace` before the bound; if no move has arrived when the
    /// bound itself passes, the engine is killed and the call fails with
    /// [`EngineError::EngineTimeout`].
    pub async fn go(&self, line: &PositionLine, limits: SearchLimits) -> Result<BestMove, EngineError> {
        match self.ensure_ready()? {
            SessionState::Searching => return Err(EngineError::Busy("a search is in progress")),
            SessionState::Analyzing => self.analysis_stop().await?,
            _ => {}
        }

        let started = Instant::now();
        let white_to_move = line.white_to_move();
        let bound = limits.bound(white_to_move);
        let grace = self.config.stop_grace();
        let mut sent = limits;
        if let Some(t) = sent.movetime {
            sent.movetime = Some(t.saturating_sub(grace));
        }

        let (tx, mut rx) = oneshot::channel();
        let commands = {
            let mut inner = self.shared.lock();
            if self.shared.state() != SessionState::Idle {
                return Err(EngineError::Busy("engine is not idle"));
            }
            let mut commands = inner.protocol.set_position(line);
            commands.extend(inner.protocol.go(&sent, white_to_move));
            inner.route = Route::Search(tx);
            self.shared.set_state(SessionState::Searching);
            commands
        };
        self.send_all(&commands).await?;

        let Some(bound) = bound else {
            return rx.await.unwrap_or(Err(EngineError::EngineCrash));
        };

        tokio::select! {
            result = &mut rx => return result.unwrap_or(Err(EngineError::EngineCrash)),
            _ = sleep_until(started + bound.saturating_sub(grace)) => {}
        }
        debug!(engine = %self.config.name, "search bound reached, stopping");
        let stop = self.shared.lock().protocol.stop_search();
        self.send(&stop).await?;

        tokio::select! {
            result = &mut rx => result.unwrap_or(Err(EngineError::EngineCrash)),
            _ = sleep_until(started + bound) => {
                warn!(engine = %self.config.name, ?bound, "engine did not answer in time, killing");
                self.shutdown().await;
                Err(EngineError::EngineTimeout("search"))
            }
        }
    }

    /// Interrupt a running search or analysis. Idle sessions ignore it.
    ///
    /// A search interrupted this way still completes: its `go` call
    /// receives the engine's move.
    pub async fn stop(&self) -> Result<(), EngineError> {
        match self.shared.state() {
            SessionState::Analyzing => self.analysis_stop().await,
            SessionState::Searching => {
                let stop = self.shared.lock().protocol.stop_search();
                self.send(&stop).await?;
                let mut state = self.subscribe_state();
                let settled = timeout(
                    self.config.handshake_timeout(),
                    state.wait_for(|s| *s != SessionState::Searching),
                )
                .await
                .is_ok();
                if settled {
                    Ok(())
                } else {
                    self.shutdown().await;
                    Err(EngineError::EngineTimeout("stop"))
                }
            }
            _ => Ok(()),
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        if let Some(mut child) = lock(&self.child).take() {
            let _ = child.start_kill();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_loop<R>(shared: Arc<Shared>, reader: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(engine = %shared.name, error = %e, "engine read failed");
                break;
            }
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        debug!(engine = %shared.name, line = trimmed, "engine >");
        let mut inner = shared.lock();
        let events = inner.protocol.parse_line(trimmed);
        for event in events {
            dispatch(&shared, &mut inner, event);
        }
    }
    on_disconnect(&shared);
}

fn dispatch(shared: &Shared, inner: &mut Inner, event: EngineEvent) {
    let route = std::mem::replace(&mut inner.route, Route::Idle);
    inner.route = match (route, event) {
        (Route::Handshake(tx), event) => {
            let _ = tx.send(event);
            Route::Handshake(tx)
        }
        (Route::Analysis, EngineEvent::Info(mut info)) => {
            if let Some(analysis) = &inner.analysis {
                info.fen = analysis.fen.clone();
                let _ = analysis.tx.send(info);
            }
            Route::Analysis
        }
        (Route::Search(done), EngineEvent::BestMove(best)) => {
            shared.set_state(SessionState::Idle);
            let _ = done.send(Ok(best));
            Route::Idle
        }
        (Route::Draining(done), EngineEvent::BestMove(_) | EngineEvent::Ready) => {
            let _ = done.send(Ok(()));
            Route::Idle
        }
        (route, _) => route,
    };
}

fn on_disconnect(shared: &Shared) {
    let mut inner = shared.lock();
    match shared.state() {
        SessionState::Disconnected | SessionState::Quitting => return,
        _ => {}
    }
    warn!(engine = %shared.name, "engine process exited unexpectedly");
    fail_route(&mut inner.route, EngineError::EngineCrash);
    inner.analysis = None;
    shared.set_state(SessionState::Disconnected);
}

/// Fail whoever waits on the engine's next reply.
fn fail_route(route: &mut Route, error: EngineError) {
    match std::mem::replace(route, Route::Idle) {
        Route::Search(done) => {
            let _ = done.send(Err(error));
        }
        Route::Draining(done) => {
            let _ = done.send(Err(error));
        }
        Route::Idle | Route::Handshake(_) | Route::Analysis => {}
    }
}

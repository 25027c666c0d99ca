//! The connection engine: a single-actor worker that owns the socket,
//! drives authentication, and dispatches decoded packets to whichever
//! waiter, job originator, or subscriber they belong to.
//!
//! The actor is a dedicated `tokio::task` consuming a merged input stream
//! (socket bytes, a caller request channel) via a single biased `select!`
//! loop. All registry mutation happens on this task; no locks are needed
//! because no other task touches them.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::command;
use crate::config::Config;
use crate::error::EslError;
use crate::packet::Packet;
use crate::parser;
use crate::registry::{JobRegistry, Predicate, SubscriberRegistry};

/// Bound on the per-subscriber event channel. A subscriber slower than this
/// starts losing events rather than stalling the engine.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;
/// Bound on the caller request channel; callers block briefly under load
/// rather than the engine buffering unboundedly.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Connected,
}

enum SessionOutcome {
    /// The socket closed or a read/write failed; reconnect immediately.
    SocketClosed,
    /// Auth failed or the server violated the protocol during auth; stop.
    Fatal,
    /// Every `EventSocket` handle was dropped; nothing left to serve.
    NoMoreCallers,
}

enum EngineCommand {
    Sync {
        line: String,
        reply: oneshot::Sender<Result<Packet, EslError>>,
    },
    Bgapi {
        cmd: String,
        args: String,
        reply: oneshot::Sender<Result<(String, oneshot::Receiver<Packet>), EslError>>,
    },
    StartListening {
        predicate: Predicate,
        reply: oneshot::Sender<(u64, mpsc::Receiver<Packet>)>,
    },
    StopListening {
        key: u64,
    },
    SubscriberDead {
        key: u64,
    },
}

struct Engine {
    config: Config,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    cmd_tx: mpsc::Sender<EngineCommand>,
    ready_tx: Option<oneshot::Sender<Result<(), EslError>>>,

    stream: Option<TcpStream>,
    recv_buf: Vec<u8>,
    phase: Phase,
    failure_count: u32,

    current_sync: Option<oneshot::Sender<Result<Packet, EslError>>>,
    sync_queue: VecDeque<(String, oneshot::Sender<Result<Packet, EslError>>)>,
    job_registry: JobRegistry,
    subscribers: SubscriberRegistry,
    next_subscriber_id: u64,
}

impl Engine {
    fn new(
        config: Config,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        cmd_tx: mpsc::Sender<EngineCommand>,
        ready_tx: Option<oneshot::Sender<Result<(), EslError>>>,
    ) -> Self {
        Engine {
            config,
            cmd_rx,
            cmd_tx,
            ready_tx,
            stream: None,
            recv_buf: Vec::new(),
            phase: Phase::Connecting,
            failure_count: 0,
            current_sync: None,
            sync_queue: VecDeque::new(),
            job_registry: JobRegistry::new(),
            subscribers: SubscriberRegistry::new(),
            next_subscriber_id: 0,
        }
    }

    async fn run(mut self) {
        loop {
            let stream = match self.connect_with_retry().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(name = %self.config.name, error = %e, "giving up");
                    return;
                }
            };
            self.stream = Some(stream);
            self.phase = Phase::Connecting;
            self.recv_buf.clear();
            // Server-side subscriptions (event/filter) do not survive a
            // reconnect, but the subscriber registry itself (client-side
            // bookkeeping) is kept across connections.
            self.current_sync = None;
            self.sync_queue.clear();
            self.job_registry.clear();
            tracing::info!(name = %self.config.name, "connected, awaiting auth/request");

            match self.session_loop().await {
                SessionOutcome::SocketClosed => continue,
                SessionOutcome::Fatal => {
                    tracing::error!(name = %self.config.name, "fatal error, stopping");
                    return;
                }
                SessionOutcome::NoMoreCallers => {
                    tracing::info!(name = %self.config.name, "no callers remain, stopping");
                    return;
                }
            }
        }
    }

    async fn connect_with_retry(&mut self) -> Result<TcpStream, EslError> {
        loop {
            match TcpStream::connect((self.config.host.as_str(), self.config.port)).await {
                Ok(stream) => {
                    self.failure_count = 0;
                    return Ok(stream);
                }
                Err(e) => {
                    self.failure_count += 1;
                    tracing::warn!(
                        name = %self.config.name,
                        attempt = self.failure_count,
                        error = %e,
                        "connect failed"
                    );
                    if self.failure_count >= self.config.max_retries {
                        return Err(EslError::MaxRetriesExceeded(self.failure_count));
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.retry_interval_ms)).await;
                }
            }
        }
    }

    async fn session_loop(&mut self) -> SessionOutcome {
        let mut read_buf = [0u8; 8192];
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None => return SessionOutcome::NoMoreCallers,
                        Some(command) => {
                            if let Some(outcome) = self.handle_command(command).await {
                                return outcome;
                            }
                        }
                    }
                }
                result = self.stream.as_mut().expect("stream set before session_loop").read(&mut read_buf) => {
                    match result {
                        Ok(0) => {
                            tracing::info!(name = %self.config.name, "socket closed by peer");
                            return SessionOutcome::SocketClosed;
                        }
                        Ok(n) => {
                            self.recv_buf.extend_from_slice(&read_buf[..n]);
                            let (remainder, packets) = parser::parse(&self.recv_buf);
                            self.recv_buf = remainder;
                            for packet in packets {
                                if let Some(outcome) = self.dispatch_packet(packet).await {
                                    return outcome;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(name = %self.config.name, error = %e, "socket read failed");
                            return SessionOutcome::SocketClosed;
                        }
                    }
                }
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stream
            .as_mut()
            .expect("stream set before session_loop")
            .write_all(line.as_bytes())
            .await
    }

    async fn handle_command(&mut self, command: EngineCommand) -> Option<SessionOutcome> {
        match command {
            EngineCommand::Sync { line, reply } => self.handle_sync(line, reply).await,
            EngineCommand::Bgapi { cmd, args, reply } => self.handle_bgapi(cmd, args, reply).await,
            EngineCommand::StartListening { predicate, reply } => {
                self.handle_start_listening(predicate, reply);
                None
            }
            EngineCommand::StopListening { key } => {
                tracing::debug!(subscriber = key, "stop_listening");
                self.subscribers.stop_listening(key);
                None
            }
            EngineCommand::SubscriberDead { key } => {
                tracing::debug!(subscriber = key, "subscriber died, removing");
                self.subscribers.stop_listening(key);
                None
            }
        }
    }

    async fn handle_sync(
        &mut self,
        line: String,
        reply: oneshot::Sender<Result<Packet, EslError>>,
    ) -> Option<SessionOutcome> {
        if self.phase != Phase::Connected {
            let _ = reply.send(Err(EslError::NotConnected));
            return None;
        }
        if self.current_sync.is_some() {
            self.sync_queue.push_back((line, reply));
            return None;
        }
        if let Err(e) = self.write_line(&line).await {
            let _ = reply.send(Err(EslError::Io(e)));
            return Some(SessionOutcome::SocketClosed);
        }
        self.current_sync = Some(reply);
        None
    }

    async fn handle_bgapi(
        &mut self,
        cmd: String,
        args: String,
        reply: oneshot::Sender<Result<(String, oneshot::Receiver<Packet>), EslError>>,
    ) -> Option<SessionOutcome> {
        if self.phase != Phase::Connected {
            let _ = reply.send(Err(EslError::NotConnected));
            return None;
        }
        let job_id = Uuid::new_v4().to_string();
        let line = command::bgapi_command(&cmd, &args, &job_id);
        if let Err(e) = self.write_line(&line).await {
            let _ = reply.send(Err(EslError::Io(e)));
            return Some(SessionOutcome::SocketClosed);
        }
        let (job_tx, job_rx) = oneshot::channel();
        self.job_registry.register(job_id.clone(), job_tx);
        let _ = reply.send(Ok((job_id, job_rx)));
        None
    }

    fn handle_start_listening(
        &mut self,
        predicate: Predicate,
        reply: oneshot::Sender<(u64, mpsc::Receiver<Packet>)>,
    ) {
        let key = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.start_listening(key, tx.clone(), predicate);

        // Proactively detect a dead subscriber rather than waiting for the
        // next event to fail delivery.
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tx.closed().await;
            let _ = cmd_tx.send(EngineCommand::SubscriberDead { key }).await;
        });

        let _ = reply.send((key, rx));
    }

    async fn dispatch_packet(&mut self, packet: Packet) -> Option<SessionOutcome> {
        match self.phase {
            Phase::Connecting => self.dispatch_connecting(packet).await,
            Phase::Connected => self.dispatch_connected(packet).await,
        }
    }

    async fn dispatch_connecting(&mut self, packet: Packet) -> Option<SessionOutcome> {
        match packet.packet_type.as_str() {
            "auth/request" => {
                let line = command::auth_command(&self.config.password);
                if let Err(e) = self.write_line(&line).await {
                    tracing::error!(name = %self.config.name, error = %e, "failed to send auth");
                    return Some(SessionOutcome::SocketClosed);
                }
                None
            }
            "command/reply" if packet.success => {
                tracing::info!(name = %self.config.name, "authenticated");
                self.phase = Phase::Connected;
                if let Some(ready) = self.ready_tx.take() {
                    let _ = ready.send(Ok(()));
                }
                self.advance_sync_queue().await
            }
            "command/reply" => {
                let reason = packet.rest.clone().unwrap_or_else(|| "auth rejected".to_string());
                tracing::error!(name = %self.config.name, reason = %reason, "authentication failed");
                if let Some(ready) = self.ready_tx.take() {
                    let _ = ready.send(Err(EslError::Auth(reason)));
                }
                Some(SessionOutcome::Fatal)
            }
            other => {
                let reason = format!("unexpected packet during authentication: {other}");
                tracing::error!(name = %self.config.name, packet_type = other, "authentication failed");
                if let Some(ready) = self.ready_tx.take() {
                    let _ = ready.send(Err(EslError::Auth(reason)));
                }
                Some(SessionOutcome::Fatal)
            }
        }
    }

    async fn dispatch_connected(&mut self, packet: Packet) -> Option<SessionOutcome> {
        let is_sync_reply = matches!(packet.packet_type.as_str(), "command/reply" | "api/response")
            && packet.job_id.is_none();

        if is_sync_reply {
            if let Some(reply) = self.current_sync.take() {
                let _ = reply.send(Ok(packet));
            } else {
                tracing::debug!(name = %self.config.name, "unsolicited reply dropped");
            }
            return self.advance_sync_queue().await;
        }

        if let Some(job_id) = packet.job_id.clone() {
            if let Some(originator) = self.job_registry.resolve(&job_id) {
                let _ = originator.send(packet);
            } else {
                tracing::debug!(name = %self.config.name, job_id, "job result for unknown job_id, dropping");
            }
            return None;
        }

        self.subscribers.dispatch(&packet);
        None
    }

    /// Write the next queued synchronous command, skipping any whose caller
    /// already cancelled.
    async fn advance_sync_queue(&mut self) -> Option<SessionOutcome> {
        while self.current_sync.is_none() {
            let (line, reply) = self.sync_queue.pop_front()?;
            if reply.is_closed() {
                tracing::debug!(name = %self.config.name, "skipping cancelled queued command");
                continue;
            }
            if let Err(e) = self.write_line(&line).await {
                let _ = reply.send(Err(EslError::Io(e)));
                return Some(SessionOutcome::SocketClosed);
            }
            self.current_sync = Some(reply);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// A handle to a running connection engine.
///
/// Cheaply `Clone`-able; every clone shares the same underlying actor task.
#[derive(Clone)]
pub struct EventSocket {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EventSocket {
    /// Start the connection engine. Returns immediately; the engine
    /// connects, authenticates, and reconnects in the background.
    pub fn start(config: Config) -> (EventSocket, JoinHandle<()>) {
        let (socket, _ready, handle) = EventSocket::start_with_ready(config);
        (socket, handle)
    }

    /// Like [`EventSocket::start`], but also returns a one-shot notification
    /// fired the moment authentication completes, or with [`EslError::Auth`]
    /// if the server rejected the password.
    pub fn start_with_ready(
        config: Config,
    ) -> (EventSocket, oneshot::Receiver<Result<(), EslError>>, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let engine = Engine::new(config, cmd_rx, cmd_tx.clone(), Some(ready_tx));
        let handle = tokio::spawn(engine.run());
        (EventSocket { cmd_tx }, ready_rx, handle)
    }

    async fn send_sync(&self, line: String) -> Result<Packet, EslError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::Sync {
                line,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EslError::NotConnected)?;
        reply_rx.await.map_err(|_| EslError::NotConnected)?
    }

    /// `api <cmd> <args>` — synchronous, returns the reply packet whatever
    /// its `success` value.
    pub async fn api(&self, cmd: &str, args: &str) -> Result<Packet, EslError> {
        self.send_sync(command::api_command(cmd, args)).await
    }

    /// `bgapi <cmd> <args>` — asynchronous. The returned [`BgapiHandle`]
    /// carries the client-generated `job_id` and a future for its result.
    pub async fn bgapi(&self, cmd: &str, args: &str) -> Result<BgapiHandle, EslError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::Bgapi {
                cmd: cmd.to_string(),
                args: args.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EslError::NotConnected)?;
        let (job_id, result_rx) = reply_rx.await.map_err(|_| EslError::NotConnected)??;
        Ok(BgapiHandle { job_id, result_rx })
    }

    /// Register as an event subscriber. `predicate` defaults to always-true
    /// when `None`.
    pub async fn start_listening(
        &self,
        predicate: Option<Predicate>,
    ) -> Result<Subscription, EslError> {
        let predicate = predicate.unwrap_or_else(|| Box::new(|_: &Packet| true));
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::StartListening {
                predicate,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EslError::NotConnected)?;
        let (key, rx) = reply_rx.await.map_err(|_| EslError::NotConnected)?;
        Ok(Subscription {
            key,
            rx,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    pub async fn event(&self, format: &str, events: &str) -> Result<Packet, EslError> {
        self.send_sync(command::event_command(format, events)).await
    }

    pub async fn myevents(&self, format: &str, uuid: &str) -> Result<Packet, EslError> {
        self.send_sync(command::myevents_command(format, uuid)).await
    }

    pub async fn divert_events(&self, on: bool) -> Result<Packet, EslError> {
        self.send_sync(command::divert_events_command(on)).await
    }

    pub async fn filter(&self, key: &str, value: &str) -> Result<Packet, EslError> {
        self.send_sync(command::filter_command(key, value)).await
    }

    pub async fn filter_delete(&self, key: &str, value: &str) -> Result<Packet, EslError> {
        self.send_sync(command::filter_delete_command(key, value)).await
    }

    pub async fn log(&self, level: &str) -> Result<Packet, EslError> {
        self.send_sync(command::log_command(level)).await
    }

    pub async fn nolog(&self) -> Result<Packet, EslError> {
        self.send_sync(command::nolog_command()).await
    }

    pub async fn nixevent(&self, events: &str) -> Result<Packet, EslError> {
        self.send_sync(command::nixevent_command(events)).await
    }

    pub async fn noevents(&self) -> Result<Packet, EslError> {
        self.send_sync(command::noevents_command()).await
    }

    pub async fn linger(&self) -> Result<Packet, EslError> {
        self.send_sync(command::linger_command()).await
    }

    pub async fn nolinger(&self) -> Result<Packet, EslError> {
        self.send_sync(command::nolinger_command()).await
    }

    pub async fn exit(&self) -> Result<Packet, EslError> {
        self.send_sync(command::exit_command()).await
    }

    pub async fn sendevent(
        &self,
        name: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<Packet, EslError> {
        self.send_sync(command::sendevent_command(name, headers, body))
            .await
    }

    pub async fn sendmsg(
        &self,
        uuid: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<Packet, EslError> {
        self.send_sync(command::sendmsg_command(uuid, headers, body))
            .await
    }
}

/// A pending background-job result.
pub struct BgapiHandle {
    pub job_id: String,
    result_rx: oneshot::Receiver<Packet>,
}

impl BgapiHandle {
    /// Wait for the job result. Resolves exactly once.
    pub async fn wait(self) -> Result<Packet, EslError> {
        self.result_rx.await.map_err(|_| EslError::Cancelled)
    }
}

/// A live event subscription. Dropping it (or calling
/// [`Subscription::stop_listening`]) unregisters it from the engine.
pub struct Subscription {
    key: u64,
    rx: mpsc::Receiver<Packet>,
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    pub async fn stop_listening(self) {
        let _ = self
            .cmd_tx
            .send(EngineCommand::StopListening { key: self.key })
            .await;
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use roverlink_frame::{
    decode_datagram, encode_compact, CompactFrame, CompactKind, ControllerCommand,
    ControllerDataPayload, ExtendedFrame, ExtendedMessage, FieldValue, Frame, FrameAssembler,
    FrameError, HeartbeatPayload, Payload, ProtocolVersion, QuitPayload,
};
use roverlink_transport::{
    open, select_transport, Framing, Result as TransportResult, Transport, TransportConfig,
    TransportError,
};
use tracing::{debug, error, info, warn};

use crate::config::{LinkConfig, ReconnectPolicy};
use crate::dedup::DedupWindow;
use crate::dispatch::{Dispatcher, Message, MessageKey};
use crate::error::{LinkError, Result};
use crate::heartbeat::{HeartbeatMonitor, LinkState, LinkTransition};
use crate::stats::{LinkStats, StatsCounters};

/// Granularity of interruptible sleeps between reconnect attempts.
const RECONNECT_SLICE: Duration = Duration::from_millis(50);

/// Owns the transport and runs the link: numbered sends, the receive loop,
/// duplicate suppression, heartbeats and link-state tracking.
///
/// Sending is synchronous on the caller's thread. `start` spawns the
/// receive loop and the heartbeat ticker; `shutdown` closes the transport
/// and joins both.
pub struct CommunicationManager {
    core: Arc<LinkCore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stop_ticker: Mutex<Option<mpsc::Sender<()>>>,
}

impl std::fmt::Debug for CommunicationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationManager")
            .field("transport", &self.core.transport().transport_name())
            .field("protocol", &self.core.config.protocol)
            .field("link_state", &self.core.current_link_state())
            .finish_non_exhaustive()
    }
}

struct SendState {
    next_msg_id: u32,
    last_controller: Option<Vec<FieldValue>>,
    buf: BytesMut,
}

struct LinkCore {
    config: LinkConfig,
    /// Config the active transport was opened from; used to reconnect.
    active: TransportConfig,
    transport: RwLock<Arc<dyn Transport>>,
    send: Mutex<SendState>,
    monitor: Mutex<HeartbeatMonitor>,
    dedup: Mutex<DedupWindow>,
    dispatcher: Dispatcher,
    stats: StatsCounters,
    running: AtomicBool,
    shutting_down: AtomicBool,
    receiving: AtomicBool,
    /// Why the receive loop last stopped, if it stopped on an error.
    last_error: Mutex<Option<String>>,
}

impl CommunicationManager {
    /// Validate `config`, open its transport (or the fallback) and build a
    /// manager around it. Nothing is spawned until `start`.
    pub fn open(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let selected = select_transport(&config.transport, config.fallback.as_ref())?;
        let active = match (&config.fallback, selected.fell_back) {
            (Some(fallback), true) => TransportConfig::Simulated(fallback.clone()),
            _ => config.transport.clone(),
        };
        info!(
            transport = selected.transport.transport_name(),
            target = %active.target(),
            fell_back = selected.fell_back,
            protocol = config.protocol.name(),
            "link transport open"
        );
        Ok(Self::build(config, active, selected.transport))
    }

    /// Build a manager around an already open transport.
    pub fn with_transport(config: LinkConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let active = config.transport.clone();
        Ok(Self::build(config, active, transport))
    }

    fn build(config: LinkConfig, active: TransportConfig, transport: Arc<dyn Transport>) -> Self {
        let hb = &config.heartbeat;
        let monitor = HeartbeatMonitor::new(hb.interval(), hb.timeout());
        let dedup = DedupWindow::new(
            config.dedup.capacity,
            config.dedup.window_ms.map(Duration::from_millis),
        );
        let core = LinkCore {
            active,
            transport: RwLock::new(transport),
            send: Mutex::new(SendState {
                next_msg_id: 0,
                last_controller: None,
                buf: BytesMut::with_capacity(256),
            }),
            monitor: Mutex::new(monitor),
            dedup: Mutex::new(dedup),
            dispatcher: Dispatcher::default(),
            stats: StatsCounters::default(),
            running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            receiving: AtomicBool::new(false),
            last_error: Mutex::new(None),
            config,
        };
        Self {
            core: Arc::new(core),
            workers: Mutex::new(Vec::new()),
            stop_ticker: Mutex::new(None),
        }
    }

    /// Spawn the receive loop and the heartbeat ticker.
    pub fn start(&self) -> Result<()> {
        if self.core.shutting_down.load(Ordering::SeqCst) {
            return Err(LinkError::Shutdown);
        }
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Err(LinkError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel();
        *self
            .stop_ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);

        let receiver = Arc::clone(&self.core);
        let receive = thread::Builder::new()
            .name("roverlink-receive".to_string())
            .spawn(move || {
                if let Err(err) = receiver.run_receive_loop() {
                    error!(error = %err, "receive loop stopped");
                }
            })
            .map_err(|err| LinkError::Transport(TransportError::Io(err)))?;

        let ticker = Arc::clone(&self.core);
        let heartbeat = thread::Builder::new()
            .name("roverlink-heartbeat".to_string())
            .spawn(move || ticker.run_heartbeat(rx))
            .map_err(|err| LinkError::Transport(TransportError::Io(err)))?;

        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([receive, heartbeat]);
        Ok(())
    }

    /// Run the receive loop on the calling thread until the transport is
    /// closed or fails. For callers that manage their own threads.
    pub fn run_receive_loop(&self) -> Result<()> {
        self.core.run_receive_loop()
    }

    /// Close the transport and join the workers. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if self.core.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(
            self.stop_ticker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        self.core.transport().close();

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("link worker panicked");
            }
        }
        self.core.running.store(false, Ordering::SeqCst);
        info!("link shut down");
    }

    /// Send one compact frame. Returns once the transport accepted the bytes.
    pub fn send_compact(&self, kind: u8, fields: &[FieldValue]) -> Result<()> {
        self.core.send_compact(kind, fields)
    }

    /// Send one extended message. Returns the msgId it was sent under.
    pub fn send_extended(&self, payload: &Payload) -> Result<u32> {
        self.core.send_extended(payload)
    }

    /// Send controller state in the link's primary format.
    pub fn send_controller(&self, command: &ControllerCommand) -> Result<()> {
        match self.core.config.protocol {
            ProtocolVersion::Compact => {
                self.send_compact(CompactKind::Controller.id(), &command.to_fields()?)
            }
            ProtocolVersion::Extended => self
                .send_extended(&Payload::ControllerData(ControllerDataPayload::from(
                    command,
                )))
                .map(|_| ()),
        }
    }

    /// Send a heartbeat now in the configured heartbeat format.
    pub fn send_heartbeat(&self) -> Result<()> {
        self.core.send_heartbeat()
    }

    /// Tell the peer this side is going away.
    pub fn send_quit(&self, reason: &str) -> Result<()> {
        match self.core.config.protocol {
            ProtocolVersion::Compact => {
                let frame = CompactFrame::quit();
                self.send_compact(frame.kind.id(), &frame.fields)
            }
            ProtocolVersion::Extended => self
                .send_extended(&Payload::Quit(QuitPayload {
                    reason: reason.to_string(),
                }))
                .map(|_| ()),
        }
    }

    /// Register a handler for one message kind or type.
    pub fn on_message(
        &self,
        key: impl Into<MessageKey>,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) {
        self.core.dispatcher.on(key.into(), Arc::new(handler));
    }

    /// Register a handler for every dispatched message.
    pub fn on_any_message(&self, handler: impl Fn(&Message) + Send + Sync + 'static) {
        self.core.dispatcher.on_any(Arc::new(handler));
    }

    /// Register a listener for link-state transitions.
    pub fn on_link_state(&self, handler: impl Fn(&LinkTransition) + Send + Sync + 'static) {
        self.core.dispatcher.on_link_state(Arc::new(handler));
    }

    pub fn current_link_state(&self) -> LinkState {
        self.core.current_link_state()
    }

    /// Recompute link state now instead of waiting for the next tick.
    pub fn check_link_state(&self) -> Option<LinkTransition> {
        self.core.check_link_state()
    }

    pub fn stats(&self) -> LinkStats {
        self.core.stats.snapshot()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.core.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.core.transport().transport_name()
    }

    /// Whether the receive loop is currently running.
    pub fn is_receiving(&self) -> bool {
        self.core.receiving.load(Ordering::SeqCst)
    }

    /// The error that stopped the receive loop, if it stopped on one.
    pub fn last_error(&self) -> Option<String> {
        self.core
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for CommunicationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LinkCore {
    fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&*self.transport.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn current_link_state(&self) -> LinkState {
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    fn send_compact(&self, kind: u8, fields: &[FieldValue]) -> Result<()> {
        let mut state = self.send.lock().unwrap_or_else(PoisonError::into_inner);

        let is_controller = kind == CompactKind::Controller.id();
        if is_controller
            && self.config.skip_unchanged_compact
            && state.last_controller.as_deref() == Some(fields)
        {
            debug!("unchanged controller frame skipped");
            return Ok(());
        }

        state.buf.clear();
        encode_compact(kind, fields, &mut state.buf)?;
        self.write(&state.buf)?;
        if is_controller {
            state.last_controller = Some(fields.to_vec());
        }
        debug!(kind, len = state.buf.len(), "compact frame sent");
        Ok(())
    }

    fn send_extended(&self, payload: &Payload) -> Result<u32> {
        let bytes = payload.to_bytes()?;
        let mut state = self.send.lock().unwrap_or_else(PoisonError::into_inner);

        let msg_id = state.next_msg_id;
        let frame = ExtendedFrame::new(payload.type_id(), msg_id, now_ms(), bytes);
        state.buf.clear();
        frame.encode(&mut state.buf)?;
        state.next_msg_id = msg_id.wrapping_add(1);

        self.write(&state.buf)?;
        debug!(
            msg_type = frame.msg_type,
            msg_id,
            len = state.buf.len(),
            "extended frame sent"
        );
        Ok(msg_id)
    }

    fn send_heartbeat(&self) -> Result<()> {
        let format = self.config.heartbeat.format.unwrap_or(self.config.protocol);
        match format {
            ProtocolVersion::Compact => {
                let frame = CompactFrame::heartbeat(now_ms() / 1000);
                self.send_compact(frame.kind.id(), &frame.fields)?;
            }
            ProtocolVersion::Extended => {
                self.send_extended(&Payload::Heartbeat(HeartbeatPayload::default()))?;
            }
        }
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_sent_at(Instant::now());
        self.stats.heartbeat();
        Ok(())
    }

    /// Hand bytes to the transport. A fatal send error drops the link to
    /// DISCONNECTED before it is returned.
    fn write(&self, bytes: &[u8]) -> Result<()> {
        match self.transport().send(bytes) {
            Ok(()) => {
                self.stats.sent();
                Ok(())
            }
            Err(err) => {
                if err.is_fatal() {
                    warn!(error = %err, "send failed");
                    self.mark_disconnected();
                }
                Err(err.into())
            }
        }
    }

    fn check_link_state(&self) -> Option<LinkTransition> {
        let transition = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check_at(Instant::now());
        if let Some(transition) = &transition {
            self.report(transition);
        }
        transition
    }

    fn mark_disconnected(&self) {
        let transition = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .force_disconnected(Instant::now());
        if let Some(transition) = &transition {
            self.report(transition);
        }
    }

    fn report(&self, transition: &LinkTransition) {
        let silence_ms = transition.silence.map(|d| d.as_millis() as u64);
        match transition.to {
            LinkState::Disconnected => warn!(
                from = %transition.from,
                to = %transition.to,
                silence_ms,
                "link state changed"
            ),
            _ => info!(
                from = %transition.from,
                to = %transition.to,
                silence_ms,
                "link state changed"
            ),
        }
        self.dispatcher.notify(transition);
    }

    fn run_heartbeat(&self, stop: mpsc::Receiver<()>) {
        let hb = &self.config.heartbeat;
        let tick = hb.check_interval().min(hb.interval());
        loop {
            if hb.enabled {
                let due = self
                    .monitor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .due_at(Instant::now());
                if due {
                    if let Err(err) = self.send_heartbeat() {
                        debug!(error = %err, "heartbeat not sent");
                    }
                }
            }
            self.check_link_state();

            match stop.recv_timeout(tick) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("heartbeat ticker stopped");
    }

    fn run_receive_loop(&self) -> Result<()> {
        self.receiving.store(true, Ordering::SeqCst);
        let result = self.receive_until_closed();
        self.receiving.store(false, Ordering::SeqCst);
        if let Err(err) = &result {
            *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
        }
        result
    }

    fn receive_until_closed(&self) -> Result<()> {
        let poll = self.config.receive_poll();
        let mut assembler = FrameAssembler::new(self.config.protocol);
        let mut transport = self.transport();
        debug!(transport = transport.transport_name(), "receive loop started");

        loop {
            match transport.receive(poll) {
                Ok(bytes) => match transport.framing() {
                    Framing::Datagram => {
                        self.handle_decoded(decode_datagram(self.config.protocol, &bytes))
                    }
                    Framing::Stream => {
                        assembler.push(&bytes);
                        loop {
                            match assembler.next_frame() {
                                Ok(Some(frame)) => self.handle_decoded(Ok(frame)),
                                Ok(None) => break,
                                Err(err) => self.handle_decoded(Err(err)),
                            }
                        }
                    }
                },
                Err(TransportError::Timeout) => {
                    if self.shutting_down.load(Ordering::SeqCst) {
                        debug!("shutdown requested; receive loop exiting");
                        return Ok(());
                    }
                }
                Err(TransportError::Closed) => {
                    debug!("transport closed; receive loop exiting");
                    return Ok(());
                }
                Err(err) => {
                    if self.shutting_down.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    error!(error = %err, "receive failed");
                    self.mark_disconnected();
                    match self.reconnect(transport, err)? {
                        Some(fresh) => transport = fresh,
                        None => return Ok(()),
                    }
                    assembler.clear();
                }
            }
        }
    }

    /// Reopen the transport per the reconnect policy, or give up with `cause`.
    ///
    /// `failed` is the receive loop's handle to the broken transport. It is
    /// closed and every handle the link holds is released before the first
    /// reopen, so the socket or serial device is free to be claimed again.
    /// Returns `None` when shutdown was requested while reconnecting.
    fn reconnect(
        &self,
        failed: Arc<dyn Transport>,
        cause: TransportError,
    ) -> Result<Option<Arc<dyn Transport>>> {
        let ReconnectPolicy::Reopen {
            attempts,
            backoff_ms,
        } = self.config.reconnect
        else {
            return Err(cause.into());
        };

        failed.close();
        let released: Arc<dyn Transport> = Arc::new(Released {
            name: failed.transport_name(),
            framing: failed.framing(),
        });
        drop(std::mem::replace(
            &mut *self.transport.write().unwrap_or_else(PoisonError::into_inner),
            released,
        ));
        drop(failed);

        for attempt in 1..=attempts {
            if !self.sleep_unless_shutdown(Duration::from_millis(backoff_ms)) {
                return Ok(None);
            }
            match open(&self.active) {
                Ok(fresh) => {
                    info!(
                        attempt,
                        transport = fresh.transport_name(),
                        target = %self.active.target(),
                        "transport reopened"
                    );
                    *self.transport.write().unwrap_or_else(PoisonError::into_inner) =
                        Arc::clone(&fresh);
                    // shutdown may have closed the released slot before the
                    // fresh transport was installed
                    if self.shutting_down.load(Ordering::SeqCst) {
                        fresh.close();
                        return Ok(None);
                    }
                    return Ok(Some(fresh));
                }
                Err(err) => warn!(attempt, attempts, error = %err, "reopen failed"),
            }
        }
        Err(cause.into())
    }

    fn sleep_unless_shutdown(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return false;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return true;
            }
            thread::sleep(left.min(RECONNECT_SLICE));
        }
    }

    fn handle_decoded(&self, decoded: std::result::Result<Frame, FrameError>) {
        let frame = match decoded {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.dropped();
                warn!(error = %err, "dropped undecodable frame");
                return;
            }
        };

        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_received_at(Instant::now());
        self.stats.received();

        let message = match frame {
            Frame::Compact(frame) => Message::Compact(frame),
            Frame::Extended(frame) => {
                let fresh = self
                    .dedup
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .observe_at(frame.msg_id, Instant::now());
                if !fresh {
                    self.stats.duplicate();
                    debug!(msg_id = frame.msg_id, "duplicate dropped");
                    return;
                }
                match ExtendedMessage::from_frame(&frame) {
                    Ok(msg) => Message::Extended(msg),
                    Err(err) => {
                        self.stats.dropped();
                        warn!(msg_id = frame.msg_id, error = %err, "dropped undecodable payload");
                        return;
                    }
                }
            }
        };

        if let Message::Extended(ExtendedMessage {
            payload: Payload::Telemetry(telemetry),
            ..
        }) = &message
        {
            self.stats.telemetry(telemetry);
        }

        let handlers = self.dispatcher.dispatch(&message);
        debug!(kind = %message.name(), handlers, "frame dispatched");
    }
}

/// Stands in for a transport that was released while reconnecting.
#[derive(Debug)]
struct Released {
    name: &'static str,
    framing: Framing,
}

impl Transport for Released {
    fn send(&self, _bytes: &[u8]) -> TransportResult<()> {
        Err(TransportError::Closed)
    }

    fn receive(&self, _timeout: Duration) -> TransportResult<Bytes> {
        Err(TransportError::Closed)
    }

    fn close(&self) {}

    fn is_closed(&self) -> bool {
        true
    }

    fn framing(&self) -> Framing {
        self.framing
    }

    fn transport_name(&self) -> &'static str {
        self.name
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

//! The serial ingestion channel: a background reader that turns the
//! microcontroller's line feed into [`ChannelEvent`]s.
//!
//! A [`Session`] walks through `Idle → Connecting → Streaming → Stopped`
//! (or straight from `Connecting` to `Stopped` if the port cannot be
//! opened). Each session owns one reader thread. The thread never touches
//! the consumer's state, it only pushes events down an [`mpsc`] channel
//! that the consumer drains on its own schedule, see
//! [`crate::tracker::BearingTracker`].
//!
//! Malformed lines are expected on a noisy link and are only logged. A
//! transport failure ends the session with a
//! [`ChannelEvent::ConnectionError`]; whether to try again is up to the
//! caller.

use crate::line_assembler::{LineAssembler, MAX_LINE_LEN};
use crate::measurement_decoder::Measurement;
use crate::serial_source::{ByteSource, PortOpener};

use log::{debug, error, info, warn};
use std::{
    borrow::Cow,
    fmt,
    io::{self, Read},
    str::{self, FromStr},
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Baud rate the microcontroller firmware talks at.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How long a line may take to arrive once it has started.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How often the reader checks for a stop request.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sessions are numbered in the order they were started.
pub type SessionId = u64;

/// Where a [`Session`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing attempted yet.
    Idle,
    /// The reader thread is opening the device.
    Connecting,
    /// The device is open and lines are being read.
    Streaming,
    /// Finished, for good. Start a new session to try again.
    Stopped,
}

impl SessionState {
    /// Whether the session still owns a reader (or is about to).
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Everything the channel reports to its consumer.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A well-formed line arrived.
    Measurement {
        /// The session that read it.
        session: SessionId,
        /// What the line said.
        measurement: Measurement,
    },
    /// The device could not be opened, or went away mid-stream. Always
    /// followed by a transition to [`SessionState::Stopped`].
    ConnectionError {
        /// The session that failed.
        session: SessionId,
        /// Why, in words fit for the user.
        error: ChannelError,
    },
    /// A session moved to a new state.
    StateChanged {
        /// The session that moved.
        session: SessionId,
        /// Its new state.
        state: SessionState,
    },
}

/// Which step of talking to the device failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStage {
    /// Opening the device.
    Open,
    /// Reading from an open device.
    Read,
}

/// Things that go wrong starting or running a session.
#[derive(Debug)]
pub enum ChannelError {
    /// The caller asked for something that cannot work, like an empty port
    /// name. Nothing was attempted.
    Configuration(String),

    /// Another session is still connecting or streaming.
    Busy {
        /// The session in the way.
        active: SessionId,
    },

    /// The device could not be opened or stopped answering.
    Connection {
        /// The port that failed.
        endpoint: String,
        /// How far we got.
        stage: ConnectionStage,
        /// What the operating system said.
        source: io::Error,
    },

    /// The reader thread could not be spawned.
    Spawn(io::Error),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ChannelError as CE;
        let msg = match self {
            CE::Configuration(why) => Cow::from(format!("invalid configuration: {}", why)),
            CE::Busy { active } => Cow::from(format!(
                "session {} is still running, stop it before starting another",
                active
            )),
            CE::Connection {
                endpoint,
                stage: ConnectionStage::Open,
                source,
            } => Cow::from(format!(
                "could not open {}: {}. Check the port name and that the device is connected",
                endpoint, source
            )),
            CE::Connection {
                endpoint,
                stage: ConnectionStage::Read,
                source,
            } => Cow::from(format!(
                "lost connection to {}: {}. Check the port and connection, then start again",
                endpoint, source
            )),
            CE::Spawn(error) => Cow::from(format!("could not start the reader thread: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Connection { source, .. } => Some(source),
            ChannelError::Spawn(error) => Some(error),
            _ => None,
        }
    }
}

/// Timing knobs for the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// A partial line older than this is thrown away.
    pub read_timeout: Duration,
    /// Upper bound on a single read, and so on how long a stop can take.
    pub poll_interval: Duration,
    /// Longest line worth buffering.
    pub max_line_len: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_line_len: MAX_LINE_LEN,
        }
    }
}

enum Signal {
    Stop,
}

/// A cheap, cloneable view of a session for whoever started it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    endpoint: Arc<str>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    /// The session's number.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The port this session was started on.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The state right now; it may change the moment this returns.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the reader thread needs to publish what it sees.
struct Reporter {
    id: SessionId,
    endpoint: Arc<str>,
    state: Arc<Mutex<SessionState>>,
    events: Sender<ChannelEvent>,
}

impl Reporter {
    /// Returns `false` once nobody is listening anymore.
    fn emit(&self, event: ChannelEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Move to `next`, announcing it, unless we are already there.
    fn transition(&self, next: SessionState) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == next {
                return;
            }
            debug!("Session {} : {} -> {}", self.id, *state, next);
            *state = next;
        }
        self.emit(ChannelEvent::StateChanged {
            session: self.id,
            state: next,
        });
    }

    fn fail(&self, stage: ConnectionStage, source: io::Error) {
        let error = ChannelError::Connection {
            endpoint: self.endpoint.to_string(),
            stage,
            source,
        };
        error!("Session {} : {}", self.id, error);
        self.emit(ChannelEvent::ConnectionError {
            session: self.id,
            error,
        });
        self.transition(SessionState::Stopped);
    }

    /// Returns `false` if the consumer has gone away.
    fn handle_line(&self, line: &[u8]) -> bool {
        match str::from_utf8(line) {
            Ok(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return true;
                }
                match Measurement::from_str(s) {
                    Ok(measurement) => {
                        debug!("Session {} : received {:?}", self.id, measurement);
                        self.emit(ChannelEvent::Measurement {
                            session: self.id,
                            measurement,
                        })
                    }
                    Err(e) => {
                        warn!("Dropping malformed line {:?}: {}", s, e);
                        true
                    }
                }
            }
            // Often happens at the beginning of transmission when there is
            // still garbage in the hardware buffer
            Err(e) => {
                warn!("Failed to decode utf-8: {:?}", e);
                true
            }
        }
    }
}

/// However the reader thread ends, panics included, the session is left
/// `Stopped` and the consumer is told so.
impl Drop for Reporter {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Session {} : reader thread panicked", self.id);
        }
        self.transition(SessionState::Stopped);
    }
}

fn stop_requested(stop_rx: &Receiver<Signal>) -> bool {
    match stop_rx.try_recv() {
        Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn run_session(
    reporter: Reporter,
    opener: Arc<dyn PortOpener>,
    baud_rate: u32,
    settings: ChannelSettings,
    stop_rx: Receiver<Signal>,
) {
    let port = match opener.open(&reporter.endpoint, baud_rate, settings.poll_interval) {
        Ok(port) => port,
        Err(source) => {
            reporter.fail(ConnectionStage::Open, source);
            return;
        }
    };

    if stop_requested(&stop_rx) {
        drop(port);
        reporter.transition(SessionState::Stopped);
        return;
    }

    info!(
        "Session {} : streaming from {} at {} baud",
        reporter.id, reporter.endpoint, baud_rate
    );
    reporter.transition(SessionState::Streaming);

    match stream_lines(&reporter, port, settings, &stop_rx) {
        Ok(()) => {
            info!("Session {} : stopped", reporter.id);
            reporter.transition(SessionState::Stopped);
        }
        Err(source) => reporter.fail(ConnectionStage::Read, source),
    }
}

/// The read loop. Consumes the port, so it is closed by the time this
/// returns, one way or the other.
fn stream_lines(
    reporter: &Reporter,
    mut port: ByteSource,
    settings: ChannelSettings,
    stop_rx: &Receiver<Signal>,
) -> io::Result<()> {
    let mut buffer = [0; 256];
    let mut assembler = LineAssembler::new(settings.max_line_len, settings.read_timeout);

    loop {
        if stop_requested(stop_rx) {
            return Ok(());
        }

        match port.read(&mut buffer) {
            Ok(0) => thread::sleep(settings.poll_interval),
            Ok(read_len) => {
                for line in assembler.extend(&buffer[..read_len], Instant::now()) {
                    if !reporter.handle_line(&line) {
                        warn!("Session {} : nobody is listening, stopping", reporter.id);
                        return Ok(());
                    }
                }
            }
            // The port already waited out the poll interval
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(settings.poll_interval)
            }
            Err(e) => return Err(e),
        }
        assembler.expire(Instant::now());
    }
}

/// One attempt at streaming from one endpoint.
pub struct Session {
    handle: SessionHandle,
    stop_tx: Sender<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl Session {
    fn spawn(
        id: SessionId,
        endpoint: &str,
        baud_rate: u32,
        settings: ChannelSettings,
        opener: Arc<dyn PortOpener>,
        events: Sender<ChannelEvent>,
    ) -> Result<Self, ChannelError> {
        let handle = SessionHandle {
            id,
            endpoint: Arc::from(endpoint),
            state: Arc::new(Mutex::new(SessionState::Idle)),
        };
        let reporter = Reporter {
            id,
            endpoint: handle.endpoint.clone(),
            state: handle.state.clone(),
            events,
        };
        reporter.transition(SessionState::Connecting);

        let (stop_tx, stop_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("ingest-{}", id))
            .spawn(move || run_session(reporter, opener, baud_rate, settings, stop_rx))
            // The reporter went down with the closure and announced `Stopped`
            .map_err(ChannelError::Spawn)?;

        Ok(Session {
            handle,
            stop_tx,
            thread: Some(thread),
        })
    }

    /// A view of this session that can be passed around.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// The state right now.
    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Ask the reader to finish and wait until it has. The device is closed
    /// by the reader itself once it leaves its loop. Calling this again, or
    /// on a session that already died, does nothing.
    ///
    /// While `Connecting`, the stop is only seen once
    /// [`PortOpener::open`] returns, so this waits out the open.
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            // A send error only means the reader has already exited
            let _ = self.stop_tx.send(Signal::Stop);
            if thread.join().is_err() {
                warn!("Session {} : reaped a panicked reader", self.handle.id);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns at most one live [`Session`] and the sending half of the event
/// queue all sessions report into.
pub struct IngestionChannel {
    opener: Arc<dyn PortOpener>,
    settings: ChannelSettings,
    events: Sender<ChannelEvent>,
    session: Option<Session>,
    next_id: SessionId,
}

impl IngestionChannel {
    /// A channel with the default timing. The returned [`Receiver`] is where
    /// every event from every session ends up.
    pub fn new(opener: Arc<dyn PortOpener>) -> (Self, Receiver<ChannelEvent>) {
        Self::with_settings(opener, ChannelSettings::default())
    }

    /// A channel with custom timing.
    pub fn with_settings(
        opener: Arc<dyn PortOpener>,
        settings: ChannelSettings,
    ) -> (Self, Receiver<ChannelEvent>) {
        let (events, rx) = mpsc::channel();
        let channel = IngestionChannel {
            opener,
            settings,
            events,
            session: None,
            next_id: 1,
        };
        (channel, rx)
    }

    /// Start streaming from `endpoint`. The device is opened on the new
    /// session's thread; whether that worked is reported as an event.
    pub fn start(&mut self, endpoint: &str, baud_rate: u32) -> Result<SessionHandle, ChannelError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ChannelError::Configuration(
                "no serial port was given".to_owned(),
            ));
        }
        if baud_rate == 0 {
            return Err(ChannelError::Configuration(
                "baud rate must be greater than zero".to_owned(),
            ));
        }

        if let Some(active) = &self.session {
            if active.state().is_active() {
                return Err(ChannelError::Busy {
                    active: active.handle.id,
                });
            }
        }
        // Reap a session that died on its own
        if let Some(mut finished) = self.session.take() {
            finished.stop();
        }

        let id = self.next_id;
        self.next_id += 1;
        let session = Session::spawn(
            id,
            endpoint,
            baud_rate,
            self.settings,
            self.opener.clone(),
            self.events.clone(),
        )?;
        let handle = session.handle();
        self.session = Some(session);
        Ok(handle)
    }

    /// Stop the current session, if there is one.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
    }

    /// The most recently started session.
    pub fn session(&self) -> Option<SessionHandle> {
        self.session.as_ref().map(Session::handle)
    }
}

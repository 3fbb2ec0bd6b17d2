//! Streaming a package range to a single local consumer.
//!
//! A [`Feeder`] binds a loopback TCP endpoint, accepts exactly one
//! connection, and writes the payload bytes of packages `start..=end` to it
//! in file order. The connection carries raw concatenated payloads, with no
//! framing, so any media reader that accepts a byte stream can consume it.
//!
//! The socket's send buffer is the only flow control: a slow consumer makes
//! `write_all` block, which throttles the feeder.
//!
//! ```text
//! Idle --start--> Sending --pause--> Paused --resume--> Sending
//! Sending | Paused --stop / finish--> Idle
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//! use std::net::TcpStream;
//! use std::sync::Arc;
//!
//! use rtmv::{Container, Feeder, FeederConfig, ParseOptions};
//!
//! let data = std::fs::read("flight.rtmv")?;
//! let container = Arc::new(Container::new(data, &ParseOptions::default())?);
//! let mut feeder = Feeder::new(container, 0, 9, FeederConfig::new().with_base_port(0))?;
//! let addr = feeder.start()?;
//!
//! let mut received = Vec::new();
//! TcpStream::connect(addr)?.read_to_end(&mut received)?;
//! println!("{:?}", feeder.wait());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{self, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::FeederConfig;
use crate::error::RtmvError;
use crate::parser::Container;
use crate::progress::{OperationType, ProgressTracker};

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Control state of a [`Feeder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederState {
    /// Not running. Initial and final state.
    Idle,
    /// Waiting for the consumer or writing payloads.
    Sending,
    /// Suspended between two packages; the connection stays open.
    Paused,
}

/// How a feed session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Every package in the range was written.
    Completed {
        /// Payload bytes written.
        bytes_sent: u64,
        /// Packages written.
        packages_sent: usize,
    },
    /// [`Feeder::stop`] ended the session early.
    Stopped {
        /// Payload bytes written.
        bytes_sent: u64,
        /// Packages written.
        packages_sent: usize,
    },
    /// The consumer went away; treated as an early end of the stream.
    ConnectionLost {
        /// Payload bytes written.
        bytes_sent: u64,
        /// Packages written.
        packages_sent: usize,
    },
    /// Nobody connected within the accept timeout.
    ConnectTimeout,
}

impl FeedOutcome {
    /// Payload bytes written during the session.
    pub fn bytes_sent(&self) -> u64 {
        match *self {
            FeedOutcome::Completed { bytes_sent, .. }
            | FeedOutcome::Stopped { bytes_sent, .. }
            | FeedOutcome::ConnectionLost { bytes_sent, .. } => bytes_sent,
            FeedOutcome::ConnectTimeout => 0,
        }
    }

    /// Packages written during the session.
    pub fn packages_sent(&self) -> usize {
        match *self {
            FeedOutcome::Completed { packages_sent, .. }
            | FeedOutcome::Stopped { packages_sent, .. }
            | FeedOutcome::ConnectionLost { packages_sent, .. } => packages_sent,
            FeedOutcome::ConnectTimeout => 0,
        }
    }

    /// `true` if the whole range was delivered.
    pub fn is_completed(&self) -> bool {
        matches!(self, FeedOutcome::Completed { .. })
    }

    /// Turn a missing consumer into an error.
    ///
    /// `accept_timeout` is the timeout the feeder ran with, reported in
    /// [`RtmvError::ConnectTimeout`]. Every other outcome is returned as is.
    ///
    /// # Errors
    ///
    /// [`RtmvError::ConnectTimeout`] for [`FeedOutcome::ConnectTimeout`].
    pub fn into_result(self, accept_timeout: Duration) -> Result<Self, RtmvError> {
        match self {
            FeedOutcome::ConnectTimeout => Err(RtmvError::ConnectTimeout(accept_timeout)),
            outcome => Ok(outcome),
        }
    }
}

/// Notifications emitted from the feeder thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// A consumer connected.
    Connected {
        /// Address of the consumer.
        peer: SocketAddr,
    },
    /// The session is over and the endpoint has been released.
    ///
    /// A `Completed` outcome only means the bytes were handed to the socket;
    /// the consumer may still be decoding them.
    Finished(FeedOutcome),
}

/// Receives [`FeedEvent`]s. Called on the feeder thread.
pub trait FeedObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &FeedEvent);
}

pub(crate) struct NoOpObserver;

impl FeedObserver for NoOpObserver {
    fn on_event(&self, _event: &FeedEvent) {}
}

struct Control {
    state: FeederState,
    stream: Option<TcpStream>,
    outcome: Option<FeedOutcome>,
}

struct Shared {
    control: Mutex<Control>,
    resumed: Condvar,
    started: AtomicBool,
    bytes_sent: AtomicU64,
    next_package: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> FeederState {
        self.lock().state
    }
}

/// Streams the payloads of a package range over a loopback connection.
///
/// Dropping a `Feeder` stops it.
pub struct Feeder {
    container: Arc<Container>,
    start: usize,
    end: usize,
    config: FeederConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Debug for Feeder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Feeder")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("state", &self.status())
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl Feeder {
    /// Create an idle feeder for packages `start..=end` of `container`.
    ///
    /// # Errors
    ///
    /// [`RtmvError::InvalidRange`] if `start > end`,
    /// [`RtmvError::PackageOutOfRange`] if `end` is past the last package.
    pub fn new(
        container: Arc<Container>,
        start: usize,
        end: usize,
        config: FeederConfig,
    ) -> Result<Self, RtmvError> {
        container.table().check_range(start, end)?;
        Ok(Self {
            container,
            start,
            end,
            config,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: FeederState::Idle,
                    stream: None,
                    outcome: None,
                }),
                resumed: Condvar::new(),
                started: AtomicBool::new(false),
                bytes_sent: AtomicU64::new(0),
                next_package: AtomicUsize::new(start),
            }),
            worker: None,
            local_addr: None,
        })
    }

    /// Bind the endpoint and start the feeder thread.
    ///
    /// Returns the address the consumer should connect to. The thread waits
    /// up to [`FeederConfig::accept_timeout`] for it.
    ///
    /// # Errors
    ///
    /// [`RtmvError::AlreadyRunning`] unless the feeder is idle,
    /// [`RtmvError::PortBindExhausted`] when no port could be bound.
    pub fn start(&mut self) -> Result<SocketAddr, RtmvError> {
        if self.status() != FeederState::Idle {
            return Err(RtmvError::AlreadyRunning);
        }
        self.join_worker();

        let listener = bind(&self.config)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        {
            let mut control = self.shared.lock();
            control.state = FeederState::Sending;
            control.stream = None;
            control.outcome = None;
        }
        self.shared.started.store(true, Ordering::Release);
        self.shared.bytes_sent.store(0, Ordering::Release);
        self.shared.next_package.store(self.start, Ordering::Release);

        let session = Session {
            container: Arc::clone(&self.container),
            start: self.start,
            end: self.end,
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
        };
        let spawned = thread::Builder::new()
            .name("rtmv-feeder".to_string())
            .spawn(move || session.run(listener));
        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(error) => {
                self.shared.lock().state = FeederState::Idle;
                return Err(error.into());
            }
        }

        self.local_addr = Some(addr);
        Ok(addr)
    }

    /// Suspend sending after the package in flight. No-op unless sending.
    pub fn pause(&self) {
        let mut control = self.shared.lock();
        if control.state == FeederState::Sending {
            control.state = FeederState::Paused;
            log::debug!("Feeder paused at package {}", self.next_index());
        }
    }

    /// Continue with the next unsent package. No-op unless paused.
    pub fn resume(&self) {
        let mut control = self.shared.lock();
        if control.state == FeederState::Paused {
            control.state = FeederState::Sending;
            self.shared.resumed.notify_all();
            log::debug!("Feeder resumed at package {}", self.next_index());
        }
    }

    /// End the session and join the feeder thread.
    ///
    /// The connection is shut down in both directions, which unblocks a
    /// write stuck on a full socket buffer and gives the consumer EOF.
    /// Safe to call in any state, any number of times.
    pub fn stop(&mut self) {
        {
            let mut control = self.shared.lock();
            if control.state != FeederState::Idle {
                log::debug!("Stopping feeder at package {}", self.next_index());
            }
            control.state = FeederState::Idle;
            if let Some(stream) = control.stream.take() {
                if let Err(error) = stream.shutdown(Shutdown::Both) {
                    log::debug!("Consumer connection shutdown failed: {error}");
                }
            }
        }
        self.shared.resumed.notify_all();
        self.join_worker();
    }

    /// Block until the session ends on its own, then return how it ended.
    ///
    /// Returns `None` if the feeder was never started.
    pub fn wait(&mut self) -> Option<FeedOutcome> {
        self.join_worker();
        self.outcome()
    }

    /// Outcome of the last finished session.
    pub fn outcome(&self) -> Option<FeedOutcome> {
        self.shared.lock().outcome
    }

    /// Current control state.
    pub fn status(&self) -> FeederState {
        self.shared.state()
    }

    /// Fraction of the range already written, in `0.0..=1.0`.
    ///
    /// `None` until [`start`](Self::start) has been called.
    pub fn progress(&self) -> Option<f64> {
        if !self.shared.started.load(Ordering::Acquire) {
            return None;
        }
        let done = self.next_index() - self.start;
        Some(done as f64 / self.range_len() as f64)
    }

    /// Index of the next package to be written.
    pub fn current_package(&self) -> usize {
        self.next_index()
    }

    /// Payload bytes written so far in the current or last session.
    pub fn bytes_sent(&self) -> u64 {
        self.shared.bytes_sent.load(Ordering::Acquire)
    }

    /// Address of the endpoint of the current or last session.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// First package index of the range.
    pub fn start_index(&self) -> usize {
        self.start
    }

    /// Last package index of the range (inclusive).
    pub fn end_index(&self) -> usize {
        self.end
    }

    /// Total payload bytes in the range.
    pub fn total_bytes(&self) -> u64 {
        self.container.table().packages()[self.start..=self.end]
            .iter()
            .map(|package| package.payload_len() as u64)
            .sum()
    }

    fn range_len(&self) -> usize {
        self.end - self.start + 1
    }

    fn next_index(&self) -> usize {
        self.shared.next_package.load(Ordering::Acquire)
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        if handle.join().is_err() {
            log::error!("Feeder thread panicked");
            self.shared.lock().state = FeederState::Idle;
        }
    }
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind with linear port probing. Port 0 gets one ephemeral attempt.
fn bind(config: &FeederConfig) -> Result<TcpListener, RtmvError> {
    let attempts = if config.base_port == 0 {
        1
    } else {
        config.bind_attempts.max(1)
    };

    for offset in 0..attempts {
        let Some(port) = config.base_port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind(SocketAddr::new(config.host, port)) {
            Ok(listener) => {
                log::info!("Feeder listening on {}:{port}", config.host);
                return Ok(listener);
            }
            Err(error) => log::debug!("Cannot bind {}:{port}: {error}", config.host),
        }
    }

    Err(RtmvError::PortBindExhausted {
        base_port: config.base_port,
        attempts,
    })
}

/// Everything the feeder thread owns.
struct Session {
    container: Arc<Container>,
    start: usize,
    end: usize,
    config: FeederConfig,
    shared: Arc<Shared>,
}

impl Session {
    fn run(self, listener: TcpListener) {
        let started = Instant::now();
        let outcome = self.feed(&listener);
        drop(listener);

        {
            let mut control = self.shared.lock();
            control.state = FeederState::Idle;
            if let Some(stream) = control.stream.take() {
                if let Err(error) = stream.shutdown(Shutdown::Write) {
                    log::debug!("Consumer connection half-close failed: {error}");
                }
            }
            control.outcome = Some(outcome);
        }
        self.shared.resumed.notify_all();

        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            outcome.bytes_sent() as f64 / elapsed
        } else {
            0.0
        };
        log::info!(
            "Feeder finished: {outcome:?}, {} bytes in {elapsed:.2}s ({:.0} B/s)",
            outcome.bytes_sent(),
            rate,
        );
        self.config.observer.on_event(&FeedEvent::Finished(outcome));
    }

    fn feed(&self, listener: &TcpListener) -> FeedOutcome {
        let Some((mut stream, peer)) = self.accept(listener) else {
            return if self.shared.state() == FeederState::Idle {
                FeedOutcome::Stopped {
                    bytes_sent: 0,
                    packages_sent: 0,
                }
            } else {
                FeedOutcome::ConnectTimeout
            };
        };

        if let Err(error) = stream.set_nonblocking(false) {
            log::warn!("Cannot make consumer connection blocking: {error}");
            return FeedOutcome::ConnectionLost {
                bytes_sent: 0,
                packages_sent: 0,
            };
        }
        if let Err(error) = stream.set_nodelay(true) {
            log::debug!("Cannot disable Nagle on consumer connection: {error}");
        }

        if let Some(outcome) = self.register_stop_handle(stream.try_clone()) {
            return outcome;
        }
        log::info!("Consumer connected from {peer}");
        self.config.observer.on_event(&FeedEvent::Connected { peer });

        let total = (self.end - self.start + 1) as u64;
        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.config.progress),
            OperationType::Feeding,
            Some(total),
            self.config.batch_size,
        );
        let mut bytes_sent = 0u64;
        let mut packages_sent = 0usize;

        for index in self.start..=self.end {
            if !self.wait_while_paused() {
                return FeedOutcome::Stopped {
                    bytes_sent,
                    packages_sent,
                };
            }
            let Some(payload) = self.container.payload(index) else {
                break;
            };

            if let Err(error) = stream.write_all(payload) {
                if self.shared.state() == FeederState::Idle {
                    return FeedOutcome::Stopped {
                        bytes_sent,
                        packages_sent,
                    };
                }
                log::warn!("Consumer connection lost at package {index}: {error}");
                return FeedOutcome::ConnectionLost {
                    bytes_sent,
                    packages_sent,
                };
            }

            let len = payload.len() as u64;
            bytes_sent += len;
            packages_sent += 1;
            self.shared.bytes_sent.fetch_add(len, Ordering::AcqRel);
            self.shared.next_package.store(index + 1, Ordering::Release);
            tracker.advance(len);
        }

        if let Err(error) = stream.flush() {
            log::debug!("Final flush to consumer failed: {error}");
        }
        tracker.finish();
        log::debug!(
            "Sent packages {}..={} in {:.2}s",
            self.start,
            self.end,
            tracker.elapsed().as_secs_f64()
        );
        FeedOutcome::Completed {
            bytes_sent,
            packages_sent,
        }
    }

    /// Store the handle `stop()` shuts down. A session without one ends as
    /// `ConnectionLost`.
    fn register_stop_handle(&self, handle: io::Result<TcpStream>) -> Option<FeedOutcome> {
        let mut control = self.shared.lock();
        if control.state == FeederState::Idle {
            return Some(FeedOutcome::Stopped {
                bytes_sent: 0,
                packages_sent: 0,
            });
        }
        match handle {
            Ok(handle) => {
                control.stream = Some(handle);
                None
            }
            Err(error) => {
                log::warn!("Cannot keep a stop handle for the consumer connection: {error}");
                Some(FeedOutcome::ConnectionLost {
                    bytes_sent: 0,
                    packages_sent: 0,
                })
            }
        }
    }

    /// Poll the non-blocking listener until a consumer connects, the
    /// deadline passes, or the feeder is stopped.
    ///
    /// A timeout too large to represent as an `Instant` never expires.
    fn accept(&self, listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
        let deadline = Instant::now().checked_add(self.config.accept_timeout);
        loop {
            if self.shared.state() == FeederState::Idle {
                return None;
            }
            match listener.accept() {
                Ok(pair) => return Some(pair),
                Err(error) if error.kind() == ErrorKind::WouldBlock => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        log::warn!(
                            "No consumer connected within {:?}",
                            self.config.accept_timeout
                        );
                        return None;
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => {
                    log::warn!("Accept failed: {error}");
                    return None;
                }
            }
        }
    }

    /// Block while paused. Returns `false` once stopped.
    fn wait_while_paused(&self) -> bool {
        let mut control = self.shared.lock();
        while control.state == FeederState::Paused {
            control = self
                .shared
                .resumed
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
        control.state == FeederState::Sending
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::config::ParseOptions;
    use crate::header::{ByteOrder, PackageHeader, encode_package};

    fn container(payload_lens: &[usize]) -> Arc<Container> {
        let mut bytes = Vec::new();
        for (i, &len) in payload_lens.iter().enumerate() {
            let header = PackageHeader {
                vid_codec: 4,
                ..PackageHeader::default()
            };
            bytes.extend(encode_package(&header, &vec![i as u8; len], ByteOrder::Big));
        }
        Arc::new(Container::new(bytes, &ParseOptions::default()).unwrap())
    }

    fn config() -> FeederConfig {
        FeederConfig::new()
            .with_base_port(0)
            .with_accept_timeout(Duration::from_secs(5))
    }

    #[test]
    fn rejects_bad_ranges() {
        let container = container(&[1, 2]);
        assert!(matches!(
            Feeder::new(Arc::clone(&container), 1, 0, config()),
            Err(RtmvError::InvalidRange { .. })
        ));
        assert!(matches!(
            Feeder::new(container, 0, 2, config()),
            Err(RtmvError::PackageOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn progress_is_none_before_start() {
        let feeder = Feeder::new(container(&[1]), 0, 0, config()).unwrap();
        assert_eq!(feeder.progress(), None);
        assert_eq!(feeder.status(), FeederState::Idle);
        assert_eq!(feeder.outcome(), None);
    }

    #[test]
    fn pause_and_resume_are_noops_when_idle() {
        let feeder = Feeder::new(container(&[1]), 0, 0, config()).unwrap();
        feeder.pause();
        assert_eq!(feeder.status(), FeederState::Idle);
        feeder.resume();
        assert_eq!(feeder.status(), FeederState::Idle);
    }

    #[test]
    fn streams_whole_range() {
        let container = container(&[10, 20, 30]);
        let mut feeder = Feeder::new(container, 0, 2, config()).unwrap();
        let addr = feeder.start().unwrap();

        let mut received = Vec::new();
        TcpStream::connect(addr)
            .unwrap()
            .read_to_end(&mut received)
            .unwrap();

        let outcome = feeder.wait().unwrap();
        assert_eq!(received.len(), 60);
        assert_eq!(
            outcome,
            FeedOutcome::Completed {
                bytes_sent: 60,
                packages_sent: 3
            }
        );
        assert_eq!(feeder.progress(), Some(1.0));
        assert_eq!(feeder.status(), FeederState::Idle);
    }

    fn session(feeder: &Feeder) -> Session {
        Session {
            container: Arc::clone(&feeder.container),
            start: feeder.start,
            end: feeder.end,
            config: feeder.config.clone(),
            shared: Arc::clone(&feeder.shared),
        }
    }

    #[test]
    fn missing_stop_handle_ends_the_session() {
        let feeder = Feeder::new(container(&[4]), 0, 0, config()).unwrap();
        feeder.shared.lock().state = FeederState::Sending;

        let outcome = session(&feeder).register_stop_handle(Err(io::Error::other("no fd")));
        assert_eq!(
            outcome,
            Some(FeedOutcome::ConnectionLost {
                bytes_sent: 0,
                packages_sent: 0
            })
        );
        assert!(feeder.shared.lock().stream.is_none());
    }

    #[test]
    fn stop_handle_is_not_kept_once_stopped() {
        let feeder = Feeder::new(container(&[4]), 0, 0, config()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let outcome = session(&feeder).register_stop_handle(Ok(stream));
        assert!(matches!(outcome, Some(FeedOutcome::Stopped { .. })));
        assert!(feeder.shared.lock().stream.is_none());
    }
}

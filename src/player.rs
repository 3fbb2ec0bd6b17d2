//! Playback state machine.
//!
//! A [`Player`] plays one [`PayloadSection`] at a time: it starts a
//! [`Feeder`] over the section, connects to it once, and runs a
//! [`DecodeStage`] on a dedicated thread that reads the stream.
//!
//! ```text
//! Stopped --play--> Playing --pause--> Paused --resume--> Playing
//! Playing | Paused --stop--> Stopped
//! ```
//!
//! Exactly one decode thread exists per `Playing` period. Pausing pauses the
//! feeder and then joins the decode thread; resuming starts a fresh decode
//! thread on the same connection, so bytes that were in flight at the pause
//! are read after the resume. Stopping halts and joins the decode thread
//! before stopping the feeder.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//!
//! use rtmv::{LoadOptions, Player, PlayerConfig, RtmvFile, WriterStage};
//!
//! let file = RtmvFile::load("flight.rtmv", &LoadOptions::default())?;
//! let stage = WriterStage::new(File::create("section0.h264")?);
//! let mut player = Player::new(stage, PlayerConfig::default());
//!
//! player.play(file.container(), &file.sections()[0])?;
//! player.wait()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config::PlayerConfig;
use crate::error::RtmvError;
use crate::feeder::Feeder;
use crate::parser::Container;
use crate::section::PayloadSection;

/// State of a [`Player`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Nothing is playing.
    Stopped,
    /// The feeder is sending and a decode thread is reading.
    Playing,
    /// The feeder is suspended and no decode thread exists.
    Paused,
}

impl PlayerState {
    fn name(self) -> &'static str {
        match self {
            PlayerState::Stopped => "stopped",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
        }
    }
}

/// The external decode/consume stage driven by a [`Player`].
///
/// `consume` is called once per `Playing` period on the decode thread. It
/// should read `input` until it returns `Ok(0)` and then return. A zero read
/// means either the stream really ended ([`StageInput::is_drained`]) or the
/// player asked the period to end ([`StageInput::halted`]); in the second
/// case `consume` will be called again with the rest of the stream after a
/// resume.
pub trait DecodeStage: Send + 'static {
    /// Read from `input` until it reports end of data.
    fn consume(&mut self, input: &mut StageInput<'_>) -> Result<(), RtmvError>;
}

/// The stream handed to a [`DecodeStage`].
pub struct StageInput<'a> {
    stream: &'a mut TcpStream,
    halt: &'a AtomicBool,
    halted: bool,
    drained: bool,
}

impl<'a> StageInput<'a> {
    fn new(stream: &'a mut TcpStream, halt: &'a AtomicBool) -> Self {
        Self {
            stream,
            halt,
            halted: false,
            drained: false,
        }
    }

    /// `true` once a pause or stop ended this period.
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// `true` once the feeder closed the stream.
    pub fn is_drained(&self) -> bool {
        self.drained
    }
}

impl Read for StageInput<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.drained {
            return Ok(0);
        }
        loop {
            if self.halt.load(Ordering::Acquire) {
                self.halted = true;
                return Ok(0);
            }
            match self.stream.read(buf) {
                Ok(0) => {
                    self.drained = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(error)
                    if matches!(
                        error.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(error) => return Err(error),
            }
        }
    }
}

/// What the decode thread hands back when it is joined.
struct Period<S> {
    stage: S,
    stream: TcpStream,
    result: Result<(), RtmvError>,
}

/// Stage and stream on their way to a decode thread. The player takes them
/// back if the thread never starts.
type Handoff<S> = Arc<Mutex<Option<(S, TcpStream)>>>;

fn take_handoff<S>(handoff: &Mutex<Option<(S, TcpStream)>>) -> Option<(S, TcpStream)> {
    handoff
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

/// Plays payload sections through a [`DecodeStage`].
///
/// Dropping a `Player` stops it.
pub struct Player<S: DecodeStage> {
    config: PlayerConfig,
    state: PlayerState,
    stage: Option<S>,
    halt: Arc<AtomicBool>,
    drained: Arc<AtomicBool>,
    feeder: Option<Feeder>,
    stream: Option<TcpStream>,
    worker: Option<JoinHandle<Option<Period<S>>>>,
    section: Option<PayloadSection>,
    stage_error: Option<RtmvError>,
}

impl<S: DecodeStage> Debug for Player<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Player")
            .field("state", &self.state)
            .field("section", &self.section)
            .field("feeder", &self.feeder)
            .finish_non_exhaustive()
    }
}

impl<S: DecodeStage> Player<S> {
    /// Create a stopped player around `stage`.
    pub fn new(stage: S, config: PlayerConfig) -> Self {
        Self {
            config,
            state: PlayerState::Stopped,
            stage: Some(stage),
            halt: Arc::new(AtomicBool::new(false)),
            drained: Arc::new(AtomicBool::new(false)),
            feeder: None,
            stream: None,
            worker: None,
            section: None,
            stage_error: None,
        }
    }

    /// Start playing `section` of `container`.
    ///
    /// When paused, this resumes instead.
    ///
    /// # Errors
    ///
    /// [`RtmvError::InvalidTransition`] while already playing; feeder and
    /// connection errors otherwise.
    pub fn play(
        &mut self,
        container: &Arc<Container>,
        section: &PayloadSection,
    ) -> Result<(), RtmvError> {
        match self.state {
            PlayerState::Paused => return self.resume(),
            PlayerState::Playing => return Err(self.misuse("play")),
            PlayerState::Stopped => {}
        }
        if self.stage.is_none() {
            return Err(self.misuse("play"));
        }

        let mut feeder = Feeder::new(
            Arc::clone(container),
            section.start_index,
            section.end_index,
            self.config.feeder.clone(),
        )?;
        let addr = feeder.start()?;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)?;
        stream.set_read_timeout(Some(self.config.read_poll))?;

        self.halt.store(false, Ordering::Release);
        self.drained.store(false, Ordering::Release);
        self.stage_error = None;
        self.feeder = Some(feeder);
        self.section = Some(section.clone());
        self.spawn_decode(stream)?;
        self.state = PlayerState::Playing;
        log::debug!(
            "Playing section {}..={} ({})",
            section.start_index,
            section.end_index,
            section.kind
        );
        Ok(())
    }

    /// Pause the feeder and join the decode thread.
    ///
    /// # Errors
    ///
    /// [`RtmvError::InvalidTransition`] unless playing.
    pub fn pause(&mut self) -> Result<(), RtmvError> {
        if self.state != PlayerState::Playing {
            return Err(self.misuse("pause"));
        }
        if let Some(feeder) = &self.feeder {
            feeder.pause();
        }
        self.halt.store(true, Ordering::Release);
        self.join_decode();
        self.state = PlayerState::Paused;
        log::debug!("Player paused");
        Ok(())
    }

    /// Resume the feeder and start a fresh decode thread.
    ///
    /// # Errors
    ///
    /// [`RtmvError::InvalidTransition`] unless paused.
    pub fn resume(&mut self) -> Result<(), RtmvError> {
        if self.state != PlayerState::Paused {
            return Err(self.misuse("resume"));
        }
        let Some(stream) = self.stream.take() else {
            return Err(self.misuse("resume"));
        };

        self.halt.store(false, Ordering::Release);
        if let Some(feeder) = &self.feeder {
            feeder.resume();
        }
        self.spawn_decode(stream)?;
        self.state = PlayerState::Playing;
        log::debug!("Player resumed");
        Ok(())
    }

    /// Halt and join the decode thread, then stop the feeder.
    ///
    /// A no-op when already stopped.
    pub fn stop(&mut self) -> Result<(), RtmvError> {
        if self.state == PlayerState::Stopped {
            return Ok(());
        }
        self.halt.store(true, Ordering::Release);
        self.join_decode();
        if let Some(mut feeder) = self.feeder.take() {
            feeder.stop();
        }
        self.stream = None;
        self.state = PlayerState::Stopped;
        log::debug!("Player stopped");
        Ok(())
    }

    /// Block until the decode stage reaches the end of the stream, then stop.
    ///
    /// # Errors
    ///
    /// [`RtmvError::InvalidTransition`] while paused, or the error the
    /// decode stage returned.
    pub fn wait(&mut self) -> Result<(), RtmvError> {
        match self.state {
            PlayerState::Paused => return Err(self.misuse("wait")),
            PlayerState::Playing => {
                self.join_decode();
                self.stop()?;
            }
            PlayerState::Stopped => {}
        }
        match self.stage_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Stop and forget the current section.
    pub fn free_section(&mut self) -> Result<(), RtmvError> {
        self.stop()?;
        self.section = None;
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Feed progress of the current section in `0.0..=1.0`.
    pub fn progress(&self) -> Option<f64> {
        self.feeder.as_ref().and_then(Feeder::progress)
    }

    /// `true` once the decode stage saw the end of the current stream.
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    /// The section being played, if any.
    pub fn section(&self) -> Option<&PayloadSection> {
        self.section.as_ref()
    }

    /// The decode stage, unless a decode thread currently owns it.
    pub fn stage(&self) -> Option<&S> {
        self.stage.as_ref()
    }

    /// Stop and give the decode stage back.
    pub fn into_stage(mut self) -> Option<S> {
        let _ = self.stop();
        self.stage.take()
    }

    fn spawn_decode(&mut self, stream: TcpStream) -> Result<(), RtmvError> {
        let Some(stage) = self.stage.take() else {
            return Err(self.misuse("decode"));
        };
        let handoff: Handoff<S> = Arc::new(Mutex::new(Some((stage, stream))));
        let slot = Arc::clone(&handoff);
        let halt = Arc::clone(&self.halt);
        let drained = Arc::clone(&self.drained);

        let spawned = thread::Builder::new()
            .name("rtmv-decode".to_string())
            .spawn(move || {
                let (mut stage, mut stream) = take_handoff(&slot)?;
                let mut input = StageInput::new(&mut stream, &halt);
                let result = stage.consume(&mut input);
                if input.is_drained() {
                    drained.store(true, Ordering::Release);
                }
                Some(Period {
                    stage,
                    stream,
                    result,
                })
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(error) => Err(self.abandon_session(&handoff, error)),
        }
    }

    /// Ends the session after the decode thread failed to start, keeping
    /// the stage for a later `play`.
    fn abandon_session(
        &mut self,
        handoff: &Mutex<Option<(S, TcpStream)>>,
        error: io::Error,
    ) -> RtmvError {
        log::error!("Could not start the decode thread: {error}");
        if let Some((stage, _stream)) = take_handoff(handoff) {
            self.stage = Some(stage);
        }
        self.halt.store(true, Ordering::Release);
        if let Some(mut feeder) = self.feeder.take() {
            feeder.stop();
        }
        self.stream = None;
        self.state = PlayerState::Stopped;
        RtmvError::IoError(error)
    }

    fn join_decode(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        match handle.join() {
            Ok(None) => log::error!("Decode thread started without its stage"),
            Ok(Some(period)) => {
                self.stage = Some(period.stage);
                self.stream = Some(period.stream);
                if let Err(error) = period.result {
                    log::warn!("Decode stage failed: {error}");
                    self.stage_error = Some(error);
                }
            }
            Err(_) => log::error!("Decode thread panicked; its stage is lost"),
        }
    }

    fn misuse(&self, action: &'static str) -> RtmvError {
        RtmvError::InvalidTransition {
            from: self.state.name(),
            action,
        }
    }
}

impl<S: DecodeStage> Drop for Player<S> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Copies the stream into any writer: a file, or the stdin of an external
/// player process.
#[derive(Debug)]
pub struct WriterStage<W> {
    writer: W,
    bytes: u64,
}

impl<W: Write + Send + 'static> WriterStage<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer, bytes: 0 }
    }

    /// Bytes written so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Borrow the writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send + 'static> DecodeStage for WriterStage<W> {
    fn consume(&mut self, input: &mut StageInput<'_>) -> Result<(), RtmvError> {
        self.bytes += io::copy(input, &mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads and discards the stream, counting bytes.
#[derive(Debug, Default)]
pub struct CountingStage {
    bytes: u64,
    periods: usize,
}

impl CountingStage {
    /// A fresh counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes read across all periods.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Number of decode periods run.
    pub fn periods(&self) -> usize {
        self.periods
    }
}

impl DecodeStage for CountingStage {
    fn consume(&mut self, input: &mut StageInput<'_>) -> Result<(), RtmvError> {
        self.periods += 1;
        self.bytes += io::copy(input, &mut io::sink())?;
        Ok(())
    }
}

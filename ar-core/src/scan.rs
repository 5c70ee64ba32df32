//! Throttled QR decode loop over a live camera stream.
//!
//! ```text
//!  Idle ──start──▶ Requesting ──ok──▶ Streaming ◀──miss── Decoding
//!                      │                  │ every Nth ready frame ▲
//!                      └─err─▶ Failed     └───────────────────────┘
//!                                          Decoding ──hit──▶ Found
//!  any ──stop──▶ Stopped (Found is kept)
//! ```
//!
//! The pipeline is single-threaded: state lives behind `Rc<RefCell<_>>` and
//! every continuation re-checks a generation counter after each suspension,
//! so `stop()` takes effect even from inside a pending frame callback.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capture::FrameBuffer;
use crate::config::{CameraConstraints, ScanConfig};
use crate::error::CameraError;
use crate::event::ScanEvent;

/// A point in video-frame pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The four corners of a detected code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    /// Top-left corner.
    pub top_left: Point,
    /// Top-right corner.
    pub top_right: Point,
    /// Bottom-right corner.
    pub bottom_right: Point,
    /// Bottom-left corner.
    pub bottom_left: Point,
}

impl Quad {
    /// Axis-aligned quad covering `(x, y)`..`(x + w, y + h)`.
    #[must_use]
    pub const fn from_rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            top_left: Point::new(x, y),
            top_right: Point::new(x + w, y),
            bottom_right: Point::new(x + w, y + h),
            bottom_left: Point::new(x, y + h),
        }
    }

    /// Centroid of the four corners.
    #[must_use]
    pub fn center(&self) -> Point {
        let corners = [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ];
        let (sx, sy) = corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / 4.0, sy / 4.0)
    }
}

/// Polarity handling requested from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Inversion {
    /// Try dark-on-light, then light-on-dark.
    AttemptBoth,
    /// Dark-on-light only.
    DontInvert,
    /// Light-on-dark only.
    OnlyInvert,
}

impl Inversion {
    /// Option string understood by jsQR-style decoders.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttemptBoth => "attemptBoth",
            Self::DontInvert => "dontInvert",
            Self::OnlyInvert => "onlyInvert",
        }
    }
}

/// A code found by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct QrMatch {
    /// Decoded text.
    pub text: String,
    /// Corner positions in the frame.
    pub quad: Quad,
}

/// The single terminal result of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedPayload {
    /// Decoded text.
    pub raw_text: String,
    /// Where the code was in the frame.
    pub frame_location: Quad,
    /// Clock time of the decode, in milliseconds.
    pub captured_at_millis: u64,
    /// The decoded frame as a JPEG data URI, if encoding succeeded.
    pub photo: Option<String>,
    /// Frame width in pixels.
    pub video_width: u32,
    /// Frame height in pixels.
    pub video_height: u32,
}

/// Scan pipeline lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Not started.
    #[default]
    Idle,
    /// Waiting for the camera.
    Requesting,
    /// Stream open, waiting for the next decode tick.
    Streaming,
    /// A decode attempt is in flight.
    Decoding,
    /// A code was decoded. Terminal.
    Found,
    /// Stopped by the caller.
    Stopped,
    /// Camera acquisition failed.
    Failed(String),
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Requesting => write!(f, "requesting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Decoding => write!(f, "decoding"),
            Self::Found => write!(f, "found"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Source of camera streams.
#[async_trait(?Send)]
pub trait Camera {
    /// Acquire a stream matching `constraints`.
    async fn open(&self, constraints: &CameraConstraints)
        -> Result<Box<dyn CameraStream>, CameraError>;
}

/// An open camera stream attached to a hidden video sink.
pub trait CameraStream {
    /// Whether the sink has enough data for a snapshot.
    fn is_ready(&self) -> bool;

    /// Draw the current frame into an RGBA buffer.
    fn snapshot(&mut self) -> Option<FrameBuffer>;

    /// Stop every track and detach the sink. Must be idempotent.
    fn stop(&mut self);
}

/// The external QR decode primitive.
#[async_trait(?Send)]
pub trait QrDecoder {
    /// Look for a code in `frame`. `None` when nothing is found.
    async fn decode(&self, frame: &FrameBuffer, inversion: Inversion) -> Option<QrMatch>;
}

/// Display-frame and timer scheduling.
#[async_trait(?Send)]
pub trait FrameClock {
    /// Resolve on the next display frame.
    async fn next_frame(&self);

    /// Resolve after `duration`.
    async fn sleep(&self, duration: Duration);

    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;
}

/// Presentation sink for scan progress.
pub trait ScanFeedback {
    /// Called for every scan event, outside any internal borrow.
    fn on_event(&self, event: &ScanEvent);
}

/// Feedback sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFeedback;

impl ScanFeedback for LogFeedback {
    fn on_event(&self, event: &ScanEvent) {
        tracing::debug!(?event, "Scan event");
    }
}

type CompletionCallback = Box<dyn FnOnce(DecodedPayload)>;

#[derive(Default)]
struct Inner {
    state: ScanState,
    stream: Option<Box<dyn CameraStream>>,
    generation: u64,
    ticks: u64,
    attempts: u32,
    help_shown: bool,
    on_complete: Option<CompletionCallback>,
}

/// Camera-to-payload scan pipeline.
///
/// Cloning yields another handle to the same pipeline, so a host can drive
/// [`ScanPipeline::run`] on a spawned task and call [`ScanPipeline::stop`]
/// from an event handler.
#[derive(Clone)]
pub struct ScanPipeline {
    inner: Rc<RefCell<Inner>>,
    camera: Rc<dyn Camera>,
    decoder: Rc<dyn QrDecoder>,
    clock: Rc<dyn FrameClock>,
    feedback: Rc<dyn ScanFeedback>,
    config: ScanConfig,
}

impl fmt::Debug for ScanPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ScanPipeline")
            .field("state", &inner.state)
            .field("attempts", &inner.attempts)
            .field("streaming", &inner.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl ScanPipeline {
    /// Create an idle pipeline.
    #[must_use]
    pub fn new(
        camera: Rc<dyn Camera>,
        decoder: Rc<dyn QrDecoder>,
        clock: Rc<dyn FrameClock>,
        feedback: Rc<dyn ScanFeedback>,
        config: ScanConfig,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::default())),
            camera,
            decoder,
            clock,
            feedback,
            config,
        }
    }

    /// Register the completion callback, replacing any previous one.
    ///
    /// It runs at most once per registration, after the success feedback.
    pub fn on_complete(&self, callback: impl FnOnce(DecodedPayload) + 'static) {
        self.inner.borrow_mut().on_complete = Some(Box::new(callback));
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.inner.borrow().state.clone()
    }

    /// Failed decode attempts since the last start.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.inner.borrow().attempts
    }

    /// Whether a camera stream is currently held.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.inner.borrow().stream.is_some()
    }

    /// Acquire the camera.
    ///
    /// Any stream held from an earlier start is released first. Drive the
    /// decode loop with [`ScanPipeline::run`] once this returns.
    ///
    /// # Errors
    ///
    /// Returns the [`CameraError`] from acquisition. The pipeline is left in
    /// [`ScanState::Failed`] with nothing held.
    pub async fn start(&self) -> Result<(), CameraError> {
        self.stop();
        let generation = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            inner.generation
        };
        self.set_state(ScanState::Requesting);

        match self.camera.open(&self.config.camera).await {
            Ok(mut stream) => {
                if self.inner.borrow().generation != generation {
                    tracing::debug!("Camera acquired after stop, releasing");
                    stream.stop();
                    return Ok(());
                }
                self.inner.borrow_mut().stream = Some(stream);
                tracing::info!("Camera stream started");
                self.set_state(ScanState::Streaming);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Camera acquisition failed: {e}");
                if self.inner.borrow().generation == generation {
                    self.set_state(ScanState::Failed(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Run the decode loop until a code is found or the pipeline is stopped.
    ///
    /// Returns immediately if no stream is held.
    pub async fn run(&self) {
        let generation = self.inner.borrow().generation;
        let frame_skip = u64::from(self.config.frame_skip.max(1));

        loop {
            self.clock.next_frame().await;
            if !self.is_live(generation) {
                return;
            }

            let frame = {
                let mut guard = self.inner.borrow_mut();
                let inner = &mut *guard;
                let Some(stream) = inner.stream.as_mut() else {
                    return;
                };
                if !stream.is_ready() {
                    continue;
                }
                inner.ticks += 1;
                if inner.ticks % frame_skip != 0 {
                    continue;
                }
                stream.snapshot()
            };
            let Some(frame) = frame else {
                continue;
            };

            self.set_state(ScanState::Decoding);
            let found = self.decoder.decode(&frame, Inversion::AttemptBoth).await;
            if !self.is_live(generation) {
                return;
            }

            match found {
                Some(qr) => {
                    self.finish(generation, qr, &frame).await;
                    return;
                }
                None => self.record_miss(),
            }
        }
    }

    /// Start the camera and run the decode loop to completion.
    ///
    /// # Errors
    ///
    /// Returns the [`CameraError`] from acquisition.
    pub async fn scan(&self) -> Result<(), CameraError> {
        self.start().await?;
        self.run().await;
        Ok(())
    }

    /// Release the camera and reset counters. Idempotent.
    ///
    /// A [`ScanState::Found`] state is kept so callers can still tell a
    /// successful scan apart from a cancelled one.
    pub fn stop(&self) {
        let stream = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            inner.ticks = 0;
            inner.attempts = 0;
            inner.help_shown = false;
            inner.stream.take()
        };
        let had_stream = stream.is_some();
        if let Some(mut stream) = stream {
            stream.stop();
            tracing::info!("Camera stream stopped");
        }

        let state = self.state();
        if (had_stream || state == ScanState::Requesting) && state != ScanState::Found {
            self.set_state(ScanState::Stopped);
        }
    }

    fn is_live(&self, generation: u64) -> bool {
        let inner = self.inner.borrow();
        inner.generation == generation && inner.stream.is_some()
    }

    fn record_miss(&self) {
        let help_at = {
            let mut inner = self.inner.borrow_mut();
            inner.attempts += 1;
            let attempts = inner.attempts;
            if attempts >= self.config.help_after_attempts && !inner.help_shown {
                inner.help_shown = true;
                Some(attempts)
            } else {
                None
            }
        };
        self.set_state(ScanState::Streaming);
        if let Some(attempts) = help_at {
            tracing::info!(attempts, "No code found yet, showing scan tips");
            self.emit(&ScanEvent::RetryHelp { attempts });
        }
    }

    async fn finish(&self, generation: u64, qr: QrMatch, frame: &FrameBuffer) {
        self.set_state(ScanState::Found);

        let photo = match frame.to_jpeg_data_uri(self.config.jpeg_quality) {
            Ok(uri) => Some(uri),
            Err(e) => {
                tracing::warn!("Failed to capture scan photo: {e}");
                None
            }
        };
        let payload = DecodedPayload {
            raw_text: qr.text,
            frame_location: qr.quad,
            captured_at_millis: self.clock.now_millis(),
            photo,
            video_width: frame.width(),
            video_height: frame.height(),
        };
        tracing::info!(text = %payload.raw_text, "QR code decoded");

        self.emit(&ScanEvent::HapticPulse {
            duration_ms: self.config.haptic_pulse_ms,
        });
        self.emit(&ScanEvent::Success {
            text: payload.raw_text.clone(),
        });

        self.clock.sleep(self.config.success_feedback()).await;
        if !self.is_live(generation) {
            tracing::debug!("Pipeline stopped during success feedback, dropping result");
            return;
        }

        self.stop();
        let callback = self.inner.borrow_mut().on_complete.take();
        if let Some(callback) = callback {
            callback(payload);
        }
    }

    fn set_state(&self, state: ScanState) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == state {
                false
            } else {
                inner.state = state.clone();
                true
            }
        };
        if changed {
            tracing::debug!(%state, "Scan state changed");
            self.emit(&ScanEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: &ScanEvent) {
        self.feedback.on_event(event);
    }
}

//! Scripted host capabilities for integration tests.
//!
//! Every fake records what the core asked of it so tests can assert on
//! side effects (tracks stopped, sources set, homes returned to).

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use ar_core::{
    ArActivationError, ArViewer, Camera, CameraConstraints, CameraError, CameraStream,
    FrameBuffer, FrameClock, HostNavigator, Inversion, ModelViewerElement, QrDecoder, QrMatch,
    Quad, ScanEvent, ScanFeedback, SourceLoad, Vec3, ViewerEvent, ViewerObserver,
};
use async_trait::async_trait;

pub const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
pub const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

// ============================================================================
// Camera
// ============================================================================

/// Camera whose streams carry two tracks each.
#[derive(Default)]
pub struct FakeCamera {
    pub opened: Cell<u32>,
    /// Liveness flag of every track ever handed out.
    pub tracks: RefCell<Vec<Rc<Cell<bool>>>>,
    /// Frames the sink needs before it reports ready.
    pub warmup_frames: u32,
    pub frames: Rc<Cell<u32>>,
    pub deny: Cell<bool>,
}

impl FakeCamera {
    pub fn live_tracks(&self) -> usize {
        self.tracks.borrow().iter().filter(|t| t.get()).count()
    }
}

struct FakeStream {
    tracks: Vec<Rc<Cell<bool>>>,
    warmup_frames: u32,
    frames: Rc<Cell<u32>>,
}

impl CameraStream for FakeStream {
    fn is_ready(&self) -> bool {
        self.frames.get() >= self.warmup_frames
    }

    fn snapshot(&mut self) -> Option<FrameBuffer> {
        Some(FrameBuffer::solid(8, 6, [30, 30, 30, 255]))
    }

    fn stop(&mut self) {
        for track in &self.tracks {
            track.set(false);
        }
    }
}

#[async_trait(?Send)]
impl Camera for FakeCamera {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        assert_eq!(constraints.facing_mode.as_str(), "environment");
        if self.deny.get() {
            return Err(CameraError::PermissionDenied);
        }
        self.opened.set(self.opened.get() + 1);
        let tracks: Vec<_> = (0..2).map(|_| Rc::new(Cell::new(true))).collect();
        self.tracks.borrow_mut().extend(tracks.iter().cloned());
        Ok(Box::new(FakeStream {
            tracks,
            warmup_frames: self.warmup_frames,
            frames: Rc::clone(&self.frames),
        }))
    }
}

// ============================================================================
// Decoder and clock
// ============================================================================

/// Decoder that misses a fixed number of times, then returns `text`.
pub struct ScriptedDecoder {
    pub misses: Cell<u32>,
    pub text: String,
    pub calls: Cell<u32>,
}

impl ScriptedDecoder {
    pub fn new(misses: u32, text: &str) -> Self {
        Self {
            misses: Cell::new(misses),
            text: text.to_string(),
            calls: Cell::new(0),
        }
    }
}

#[async_trait(?Send)]
impl QrDecoder for ScriptedDecoder {
    async fn decode(&self, _frame: &FrameBuffer, inversion: Inversion) -> Option<QrMatch> {
        assert_eq!(inversion, Inversion::AttemptBoth);
        self.calls.set(self.calls.get() + 1);
        if self.misses.get() > 0 {
            self.misses.set(self.misses.get() - 1);
            return None;
        }
        Some(QrMatch {
            text: self.text.clone(),
            quad: Quad::from_rect(1.0, 1.0, 4.0, 4.0),
        })
    }
}

/// Clock that never waits; frames and sleeps are only counted.
#[derive(Default)]
pub struct InstantClock {
    pub frames: Rc<Cell<u32>>,
    pub slept: RefCell<Vec<Duration>>,
}

#[async_trait(?Send)]
impl FrameClock for InstantClock {
    async fn next_frame(&self) {
        self.frames.set(self.frames.get() + 1);
    }

    async fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }

    fn now_millis(&self) -> u64 {
        u64::from(self.frames.get()) * 16
    }
}

/// Feedback sink that records events and can run a hook on each one.
#[derive(Default)]
pub struct RecordingFeedback {
    pub events: RefCell<Vec<ScanEvent>>,
    pub hook: RefCell<Option<Box<dyn Fn(&ScanEvent)>>>,
}

impl RecordingFeedback {
    pub fn help_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, ScanEvent::RetryHelp { .. }))
            .count()
    }
}

impl ScanFeedback for RecordingFeedback {
    fn on_event(&self, event: &ScanEvent) {
        self.events.borrow_mut().push(event.clone());
        if let Some(hook) = self.hook.borrow().as_ref() {
            hook(event);
        }
    }
}

// ============================================================================
// Viewer
// ============================================================================

/// Viewer element that records attribute writes and fetches.
#[derive(Default)]
pub struct RecordingElement {
    pub sources: Vec<(ArViewer, String)>,
    pub prefetched: Vec<String>,
    pub scale: Option<Vec3>,
    pub ar_enabled: bool,
    pub activations: u32,
    pub queue: VecDeque<Result<(), ArActivationError>>,
}

impl RecordingElement {
    /// Every URI this element was asked to fetch, for display or prefetch.
    pub fn requested_uris(&self) -> Vec<&str> {
        self.sources
            .iter()
            .map(|(_, uri)| uri.as_str())
            .chain(self.prefetched.iter().map(String::as_str))
            .collect()
    }
}

impl ModelViewerElement for RecordingElement {
    fn set_source(&mut self, viewer: ArViewer, uri: &str) -> SourceLoad {
        self.sources.push((viewer, uri.to_string()));
        SourceLoad::Pending
    }

    fn set_ar_enabled(&mut self, enabled: bool) {
        self.ar_enabled = enabled;
    }

    fn set_placement_scale(&mut self, scale: Vec3) {
        self.scale = Some(scale);
    }

    fn activate_ar(&mut self) -> Result<(), ArActivationError> {
        self.activations += 1;
        self.queue.pop_front().unwrap_or(Ok(()))
    }

    fn prefetch(&mut self, uri: &str) {
        self.prefetched.push(uri.to_string());
    }
}

/// Observer and navigator in one.
#[derive(Default)]
pub struct Host {
    pub events: RefCell<Vec<ViewerEvent>>,
    pub homes: Cell<u32>,
}

impl ViewerObserver for Host {
    fn on_event(&self, event: &ViewerEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

impl HostNavigator for Host {
    fn return_to_home(&self) {
        self.homes.set(self.homes.get() + 1);
    }
}

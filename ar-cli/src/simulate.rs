//! Scripted end-to-end run: scan, resolve, launch AR, return home.
//!
//! The real [`ScanPipeline`] and [`ViewerSession`] are driven against
//! simulated host capabilities. Time is virtual unless `--realtime` is set.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use ar_core::{
    decode_data_uri, ArActivationError, ArStatus, ArViewer, Camera, CameraConstraints,
    CameraError, CameraStream, DecodedPayload, ExperienceFlags, FrameBuffer, FrameClock,
    HostNavigator, Inversion, ModelResolver, ModelViewerElement, PlatformFacts, QrDecoder,
    QrMatch, Quad, ScanEvent, ScanFeedback, ScanPipeline, SessionStore, SourceLoad, Vec3,
    ViewerEvent, ViewerObserver, ViewerSession, ViewerState,
};
use async_trait::async_trait;
use clap::Args;
use serde::Serialize;

use crate::commands::{self, PhotoInfo, ResolveReport};
use crate::CliConfig;

const FRAME_MILLIS: u64 = 16;
const SIM_WIDTH: u32 = 320;
const SIM_HEIGHT: u32 = 240;

/// Arguments for `simulate`.
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Text the decoder finds once the misses are used up
    pub payload: String,

    /// Decode attempts that find nothing before the payload is found
    #[arg(long, default_value_t = 0)]
    pub misses: u32,

    /// Display frames before the camera sink reports ready
    #[arg(long, default_value_t = 0)]
    pub warmup_frames: u32,

    /// User agent of the simulated device
    #[arg(long, default_value = "")]
    pub user_agent: String,

    /// Refuse camera access
    #[arg(long)]
    pub deny_camera: bool,

    /// Make the model load fail with this message
    #[arg(long)]
    pub load_error: Option<String>,

    /// Make AR activation fail with this message
    #[arg(long)]
    pub ar_error: Option<String>,

    /// Wait in real time instead of advancing a virtual clock
    #[arg(long)]
    pub realtime: bool,
}

/// Everything observed during a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Final scan pipeline state.
    pub scan_state: String,
    /// Camera failure, if acquisition failed.
    pub camera_error: Option<String>,
    /// Calls into the decoder.
    pub decode_calls: u32,
    /// Display frames waited for.
    pub frames: u32,
    /// Virtual or wall-clock milliseconds elapsed.
    pub elapsed_ms: u64,
    /// Resolution of the decoded payload.
    pub resolution: Option<ResolveReport>,
    /// Final viewer state.
    pub viewer_state: Option<ViewerState>,
    /// Times the host was asked to return home.
    pub returned_home: u32,
    /// Payload of the record saved for the next page.
    pub saved_payload: Option<String>,
    /// Photo of the saved record.
    pub saved_photo: Option<PhotoInfo>,
    /// Whether the AR guide flag was already set.
    pub ar_guide_shown: bool,
    /// Scan events in order.
    pub scan_events: Vec<ScanEvent>,
    /// Viewer events in order.
    pub viewer_events: Vec<ViewerEvent>,
}

// ============================================================================
// Simulated capabilities
// ============================================================================

/// Clock counting frames and virtual milliseconds.
struct SimClock {
    frames: Rc<Cell<u32>>,
    now: Cell<u64>,
    realtime: bool,
}

#[async_trait(?Send)]
impl FrameClock for SimClock {
    async fn next_frame(&self) {
        self.frames.set(self.frames.get() + 1);
        self.now.set(self.now.get() + FRAME_MILLIS);
        if self.realtime {
            tokio::time::sleep(Duration::from_millis(FRAME_MILLIS)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    async fn sleep(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.now.set(self.now.get().saturating_add(millis));
        if self.realtime {
            tokio::time::sleep(duration).await;
        }
    }

    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}

struct SimCamera {
    frames: Rc<Cell<u32>>,
    warmup_frames: u32,
    deny: bool,
}

struct SimStream {
    frames: Rc<Cell<u32>>,
    warmup_frames: u32,
    live: bool,
}

#[async_trait(?Send)]
impl Camera for SimCamera {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        if self.deny {
            return Err(CameraError::PermissionDenied);
        }
        tracing::debug!(
            facing = constraints.facing_mode.as_str(),
            "Simulated camera opened"
        );
        Ok(Box::new(SimStream {
            frames: Rc::clone(&self.frames),
            warmup_frames: self.warmup_frames,
            live: true,
        }))
    }
}

impl CameraStream for SimStream {
    fn is_ready(&self) -> bool {
        self.live && self.frames.get() >= self.warmup_frames
    }

    fn snapshot(&mut self) -> Option<FrameBuffer> {
        self.live
            .then(|| FrameBuffer::solid(SIM_WIDTH, SIM_HEIGHT, [200, 200, 200, 255]))
    }

    fn stop(&mut self) {
        self.live = false;
    }
}

struct SimDecoder {
    misses: Cell<u32>,
    payload: String,
    calls: Cell<u32>,
}

#[async_trait(?Send)]
impl QrDecoder for SimDecoder {
    async fn decode(&self, _frame: &FrameBuffer, _inversion: Inversion) -> Option<QrMatch> {
        self.calls.set(self.calls.get() + 1);
        if self.misses.get() > 0 {
            self.misses.set(self.misses.get() - 1);
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (SIM_WIDTH as f32, SIM_HEIGHT as f32);
        Some(QrMatch {
            text: self.payload.clone(),
            quad: Quad::from_rect(w / 4.0, h / 4.0, w / 2.0, h / 2.0),
        })
    }
}

/// Viewer element that loads whatever it is given.
struct SimElement {
    source: Option<String>,
    ar_error: Option<String>,
}

impl ModelViewerElement for SimElement {
    fn set_source(&mut self, viewer: ArViewer, uri: &str) -> SourceLoad {
        self.source = Some(uri.to_string());
        match viewer {
            ArViewer::QuickLook => SourceLoad::Ready,
            ArViewer::SceneViewer | ArViewer::Generic => SourceLoad::Pending,
        }
    }

    fn set_ar_enabled(&mut self, enabled: bool) {
        tracing::debug!(enabled, "AR attribute");
    }

    fn set_placement_scale(&mut self, scale: Vec3) {
        tracing::debug!(%scale, "Placement scale");
    }

    fn activate_ar(&mut self) -> Result<(), ArActivationError> {
        match &self.ar_error {
            Some(message) => Err(ArActivationError::ActivationFailed(message.clone())),
            None => Ok(()),
        }
    }

    fn prefetch(&mut self, uri: &str) {
        tracing::debug!(%uri, "Prefetch");
    }
}

#[derive(Default)]
struct Recorder {
    scan_events: RefCell<Vec<ScanEvent>>,
    viewer_events: RefCell<Vec<ViewerEvent>>,
    homes: Cell<u32>,
}

impl ScanFeedback for Recorder {
    fn on_event(&self, event: &ScanEvent) {
        tracing::info!(?event, "Scan");
        self.scan_events.borrow_mut().push(event.clone());
    }
}

impl ViewerObserver for Recorder {
    fn on_event(&self, event: &ViewerEvent) {
        tracing::info!(?event, "Viewer");
        self.viewer_events.borrow_mut().push(event.clone());
    }
}

impl HostNavigator for Recorder {
    fn return_to_home(&self) {
        self.homes.set(self.homes.get() + 1);
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Finish any pending load the way the element would.
fn settle_load(session: &mut ViewerSession<SimElement>, load_error: Option<&str>) {
    if session.is_loaded() {
        return;
    }
    let Some(src) = session.element().source.clone() else {
        return;
    };
    match load_error {
        Some(message) => session.on_model_error(&src, message),
        None => session.on_model_loaded(&src),
    }
}

/// Run one scripted scan and AR session.
///
/// # Errors
///
/// Returns an error if the catalog or storage cannot be set up, or if the
/// stored record cannot be read back.
pub async fn simulate(config: &CliConfig, args: &SimulateArgs) -> anyhow::Result<SimulationReport> {
    let catalog = config.catalog()?;
    let storage = config.storage()?;
    let store = SessionStore::new(Rc::clone(&storage));
    let flags = ExperienceFlags::new(storage);
    let recorder = Rc::new(Recorder::default());

    let frames = Rc::new(Cell::new(0));
    let clock = Rc::new(SimClock {
        frames: Rc::clone(&frames),
        now: Cell::new(0),
        realtime: args.realtime,
    });
    let decoder = Rc::new(SimDecoder {
        misses: Cell::new(args.misses),
        payload: args.payload.clone(),
        calls: Cell::new(0),
    });
    let pipeline = ScanPipeline::new(
        Rc::new(SimCamera {
            frames: Rc::clone(&frames),
            warmup_frames: args.warmup_frames,
            deny: args.deny_camera,
        }),
        decoder.clone(),
        clock.clone(),
        recorder.clone(),
        config.experience.scan.clone(),
    );

    let delivered: Rc<RefCell<Option<DecodedPayload>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&delivered);
    pipeline.on_complete(move |payload| *sink.borrow_mut() = Some(payload));

    let mut report = SimulationReport {
        scan_state: String::new(),
        camera_error: None,
        decode_calls: 0,
        frames: 0,
        elapsed_ms: 0,
        resolution: None,
        viewer_state: None,
        returned_home: 0,
        saved_payload: None,
        saved_photo: None,
        ar_guide_shown: flags.ar_guide_shown(),
        scan_events: Vec::new(),
        viewer_events: Vec::new(),
    };

    let scanned = pipeline.scan().await;
    report.scan_state = pipeline.state().to_string();
    report.decode_calls = decoder.calls.get();
    report.frames = frames.get();
    if let Err(e) = scanned {
        tracing::warn!("Simulated scan failed: {e}");
        report.camera_error = Some(e.to_string());
        report.elapsed_ms = clock.now_millis();
        report.scan_events = recorder.scan_events.take();
        return Ok(report);
    }
    let payload = delivered
        .borrow_mut()
        .take()
        .context("scan ended without delivering a payload")?;

    let resolution = commands::resolve(catalog.clone(), Some(&payload.raw_text), &args.user_agent);
    let descriptor = ModelResolver::new(catalog.clone())
        .resolve(Some(&payload.raw_text))
        .clone();

    let mut session = ViewerSession::new(
        SimElement {
            source: None,
            ar_error: args.ar_error.clone(),
        },
        PlatformFacts::from_user_agent(&args.user_agent),
        catalog,
        store.clone(),
        recorder.clone(),
    )
    .with_observer(recorder.clone())
    .with_config(config.experience.viewer.clone());

    session.initialize(None);
    settle_load(&mut session, None);

    let now = clock.now_millis();
    session.scan_resolved(&descriptor, Some(payload), now);
    settle_load(&mut session, args.load_error.as_deref());
    // a failed load re-applies the previous model
    settle_load(&mut session, None);

    let guide_end = now + config.experience.viewer.guide_duration_ms;
    session.tick(guide_end);
    session.request_ar(guide_end);
    if session.state() == ViewerState::ArActive {
        if let Err(e) = flags.mark_ar_guide_shown() {
            tracing::warn!("Failed to set AR guide flag: {e}");
        }
        session.on_ar_status(ArStatus::SessionStarted);
        // the user closes the native viewer
        session.on_ar_status(ArStatus::NotPresenting);
    }

    let record = store.load()?;
    report.saved_photo = record
        .as_ref()
        .and_then(|r| r.photo.as_deref())
        .map(decode_data_uri)
        .transpose()?
        .map(|(mime, bytes)| PhotoInfo {
            mime,
            bytes: bytes.len(),
        });
    report.saved_payload = record.map(|r| r.payload);
    report.resolution = Some(resolution);
    report.viewer_state = Some(session.state());
    report.returned_home = recorder.homes.get();
    report.elapsed_ms = clock.now_millis();
    report.scan_events = recorder.scan_events.take();
    report.viewer_events = recorder.viewer_events.take();
    Ok(report)
}

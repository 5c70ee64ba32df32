//! Viewer session around the platform-native AR hand-off.
//!
//! ```text
//!  Uninitialized ──initialize──▶ Ready ◀─────────────┐
//!                                  │ scan_resolved    │ model_loaded / load error
//!                                  ▼                  │
//!                       GuideShowing / Switching ─────┘
//!  Ready ──request_ar──▶ ArLaunching ──activated──▶ ArActive
//!                          │ timeout / error          │ not-presenting | page visible
//!                          ▼                          ▼
//!                        Ready ◀──────────────────  Restoring
//! ```
//!
//! The session is a synchronous state machine. Element callbacks are fed in
//! through the `on_*` methods and time-based transitions through
//! [`ViewerSession::tick`]; everything observable goes out as
//! [`ViewerEvent`]s.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelCatalog, ModelDescriptor, Vec3};
use crate::config::ViewerConfig;
use crate::error::{ArActivationError, ArError, ModelLoadError};
use crate::event::ViewerEvent;
use crate::platform::{ArViewer, PlatformFacts};
use crate::scan::DecodedPayload;
use crate::store::{PersistedQrRecord, SessionStore};

/// Viewer session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerState {
    /// No model configured yet.
    #[default]
    Uninitialized,
    /// Idle with a model applied.
    Ready,
    /// A model switch is loading behind a blocking indicator.
    Switching,
    /// The AR controls guide is on screen.
    GuideShowing,
    /// Waiting for the model or the native viewer to start.
    ArLaunching,
    /// The native AR viewer owns the screen.
    ArActive,
    /// Persisting and handing back to the host after AR.
    Restoring,
}

impl fmt::Display for ViewerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Switching => "switching",
            Self::GuideShowing => "guide_showing",
            Self::ArLaunching => "ar_launching",
            Self::ArActive => "ar_active",
            Self::Restoring => "restoring",
        };
        f.write_str(name)
    }
}

/// Whether a newly set source still has to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLoad {
    /// A load-complete or error signal will follow.
    Pending,
    /// Usable immediately (e.g. a Quick Look source fetched on activation).
    Ready,
}

/// Values of the viewer's AR status signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArStatus {
    /// The native session started.
    SessionStarted,
    /// The user placed the model.
    ObjectPlaced,
    /// The native session ended or was never entered.
    NotPresenting,
    /// The native session failed.
    Failed,
}

impl ArStatus {
    /// Parse the element's status string.
    #[must_use]
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "session-started" => Some(Self::SessionStarted),
            "object-placed" => Some(Self::ObjectPlaced),
            "not-presenting" => Some(Self::NotPresenting),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The native model viewer element.
pub trait ModelViewerElement {
    /// Point the element at `uri` using the attribute for `viewer`.
    fn set_source(&mut self, viewer: ArViewer, uri: &str) -> SourceLoad;

    /// Enable or disable the AR button.
    fn set_ar_enabled(&mut self, enabled: bool);

    /// Set the AR placement scale.
    fn set_placement_scale(&mut self, scale: Vec3);

    /// Hand off to the native AR viewer.
    ///
    /// # Errors
    ///
    /// Returns [`ArActivationError::ActivationFailed`] if the element refuses.
    fn activate_ar(&mut self) -> Result<(), ArActivationError>;

    /// Warm the HTTP cache for `uri` without displaying it.
    fn prefetch(&mut self, uri: &str);
}

/// Host page navigation.
pub trait HostNavigator {
    /// Show the host's home view.
    fn return_to_home(&self);
}

/// Presentation sink for viewer events.
pub trait ViewerObserver {
    /// Called for every viewer event.
    fn on_event(&self, event: &ViewerEvent);
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ViewerObserver for LogObserver {
    fn on_event(&self, event: &ViewerEvent) {
        tracing::debug!(?event, "Viewer event");
    }
}

const AR_UNAVAILABLE_MARKERS: [&str; 4] = [
    "ARCore",
    "AR session",
    "AR not available",
    "not supported",
];

/// Whether a viewer error means the device has no AR runtime.
///
/// Only Android reports this; elsewhere the same words are ordinary failures.
#[must_use]
pub fn is_ar_unavailable_error(platform: &PlatformFacts, message: &str) -> bool {
    platform.is_android && AR_UNAVAILABLE_MARKERS.iter().any(|m| message.contains(m))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Idle,
    Launching {
        deadline: Option<u64>,
        restore_loading: bool,
    },
    /// Control has passed to the native viewer. `confirmed` once the
    /// session is known to have started.
    Active {
        confirmed: bool,
    },
    Restoring,
}

/// Owns the viewer element and the active model.
pub struct ViewerSession<E: ModelViewerElement> {
    element: E,
    platform: PlatformFacts,
    catalog: ModelCatalog,
    store: SessionStore,
    navigator: Rc<dyn HostNavigator>,
    observer: Rc<dyn ViewerObserver>,
    config: ViewerConfig,
    phase: Phase,
    state: ViewerState,
    active: Option<ModelDescriptor>,
    loaded: Option<ModelDescriptor>,
    pending_src: Option<String>,
    loading_visible: bool,
    guide_until: Option<u64>,
    notice_visible: bool,
    pending_record: Option<PersistedQrRecord>,
}

impl<E: ModelViewerElement> fmt::Debug for ViewerSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerSession")
            .field("state", &self.state)
            .field("active", &self.active.as_ref().map(|m| &m.key))
            .field("pending_src", &self.pending_src)
            .finish_non_exhaustive()
    }
}

impl<E: ModelViewerElement> ViewerSession<E> {
    /// Create an uninitialized session.
    #[must_use]
    pub fn new(
        element: E,
        platform: PlatformFacts,
        catalog: ModelCatalog,
        store: SessionStore,
        navigator: Rc<dyn HostNavigator>,
    ) -> Self {
        Self {
            element,
            platform,
            catalog,
            store,
            navigator,
            observer: Rc::new(LogObserver),
            config: ViewerConfig::default(),
            phase: Phase::Uninitialized,
            state: ViewerState::Uninitialized,
            active: None,
            loaded: None,
            pending_src: None,
            loading_visible: false,
            guide_until: None,
            notice_visible: false,
            pending_record: None,
        }
    }

    /// Replace the event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Rc<dyn ViewerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the timing configuration.
    #[must_use]
    pub fn with_config(mut self, config: ViewerConfig) -> Self {
        self.config = config;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ViewerState {
        self.state
    }

    /// The viewer element.
    #[must_use]
    pub const fn element(&self) -> &E {
        &self.element
    }

    /// Mutable access to the viewer element.
    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    /// Platform facts the session was built with.
    #[must_use]
    pub const fn platform(&self) -> &PlatformFacts {
        &self.platform
    }

    /// The most recently requested model.
    #[must_use]
    pub const fn active_model(&self) -> Option<&ModelDescriptor> {
        self.active.as_ref()
    }

    /// Whether the active model has finished loading.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.pending_src.is_none()
            && matches!((&self.active, &self.loaded), (Some(a), Some(l)) if a.key == l.key)
    }

    /// Whether the "device unsupported" notice is up.
    #[must_use]
    pub const fn notice_visible(&self) -> bool {
        self.notice_visible
    }

    /// Apply `initial` (or the catalog default) and queue background prefetch
    /// of the other models' platform assets.
    pub fn initialize(&mut self, initial: Option<&ModelDescriptor>) {
        if self.phase != Phase::Uninitialized {
            tracing::warn!("Viewer session already initialized");
            return;
        }
        let descriptor = initial
            .cloned()
            .unwrap_or_else(|| self.catalog.default_model().clone());

        self.element.set_ar_enabled(true);
        self.phase = Phase::Idle;
        self.apply(descriptor, false);

        let viewer = self.platform.ar_viewer;
        let active_key = self.active.as_ref().map(|m| m.key.clone());
        for model in self.catalog.preload_models() {
            if Some(&model.key) != active_key.as_ref() {
                self.element.prefetch(model.asset_for(viewer));
            }
        }

        tracing::info!(viewer = %viewer, "Viewer session initialized");
        self.refresh_state();
    }

    /// Handle a resolved scan: show the model toast and guide, remember the
    /// payload for persistence, and switch to `descriptor`.
    pub fn scan_resolved(
        &mut self,
        descriptor: &ModelDescriptor,
        payload: Option<DecodedPayload>,
        now_millis: u64,
    ) {
        if self.in_ar() {
            tracing::warn!(key = %descriptor.key, "Ignoring scan while AR is active");
            return;
        }

        self.pending_record = payload.map(PersistedQrRecord::from);
        if let Err(e) = self.store.clear() {
            tracing::warn!("Failed to invalidate previous QR record: {e}");
        }

        self.emit(&ViewerEvent::ModelToast {
            display_name: descriptor.display_name.clone(),
            description: descriptor.description.clone(),
        });
        self.guide_until = Some(now_millis + self.config.guide_duration_ms);
        self.emit(&ViewerEvent::GuideShown {
            image: self.platform.guide_image_path().map(str::to_string),
        });

        self.change_model(descriptor);
        self.refresh_state();
    }

    /// Switch to `descriptor`. A no-op when it is already the requested model.
    pub fn change_model(&mut self, descriptor: &ModelDescriptor) {
        match self.phase {
            Phase::Uninitialized => {
                self.initialize(Some(descriptor));
                return;
            }
            Phase::Idle => {}
            Phase::Launching { .. } | Phase::Active { .. } | Phase::Restoring => {
                tracing::warn!(key = %descriptor.key, "Ignoring model change during AR");
                return;
            }
        }

        if self.active.as_ref().is_some_and(|m| m.key == descriptor.key) {
            tracing::debug!(key = %descriptor.key, "Model already requested");
            return;
        }

        self.apply(descriptor.clone(), true);
        self.refresh_state();
    }

    /// The element finished loading `src`. Signals for superseded sources are ignored.
    pub fn on_model_loaded(&mut self, src: &str) {
        if self.pending_src.as_deref() != Some(src) {
            tracing::debug!(src, "Ignoring stale load signal");
            return;
        }
        self.mark_loaded();
        self.refresh_state();
    }

    /// The element failed to load `src`; the previous model is re-applied.
    pub fn on_model_error(&mut self, src: &str, message: &str) {
        if is_ar_unavailable_error(&self.platform, message) {
            self.ar_unavailable(message);
            return;
        }
        if self.pending_src.as_deref() != Some(src) {
            tracing::debug!(src, "Ignoring stale load error");
            return;
        }

        let key = self
            .active
            .as_ref()
            .map(|m| m.key.clone())
            .unwrap_or_default();
        let error = ModelLoadError {
            key: key.clone(),
            message: message.to_string(),
        };
        tracing::warn!("{error}");

        self.pending_src = None;
        self.abort_launch(&error.to_string());
        self.set_loading(false);
        self.emit(&ViewerEvent::ModelLoadFailed {
            key: key.clone(),
            message: message.to_string(),
        });

        if let Some(previous) = self.loaded.clone().filter(|prev| prev.key != key) {
            tracing::info!(key = %previous.key, "Restoring previous model");
            self.apply(previous, false);
        } else {
            self.active.clone_from(&self.loaded);
        }
        self.refresh_state();
    }

    /// Launch native AR, waiting up to the launch timeout for the model to load.
    pub fn request_ar(&mut self, now_millis: u64) {
        if self.phase != Phase::Idle {
            tracing::warn!(state = %self.state, "AR launch requested in wrong state");
            return;
        }
        if self.notice_visible {
            tracing::debug!("AR launch blocked by unsupported notice");
            return;
        }

        self.hide_guide();
        let restore_loading = self.loading_visible;
        self.emit(&ViewerEvent::ArLaunching);

        if self.is_loaded() {
            self.phase = Phase::Launching {
                deadline: None,
                restore_loading,
            };
            self.activate();
        } else {
            tracing::info!("Waiting for model to load before AR launch");
            self.phase = Phase::Launching {
                deadline: Some(now_millis + self.config.ar_launch_timeout_ms),
                restore_loading,
            };
            self.set_loading(true);
        }
        self.refresh_state();
    }

    /// Feed the element's AR status signal.
    pub fn on_ar_status(&mut self, status: ArStatus) {
        match status {
            ArStatus::SessionStarted => {
                if let Phase::Launching { .. } = self.phase {
                    self.enter_active();
                }
                self.confirm_active();
                self.refresh_state();
            }
            ArStatus::ObjectPlaced => {
                tracing::debug!("AR object placed");
                self.confirm_active();
            }
            ArStatus::NotPresenting => self.end_ar_session("not-presenting"),
            ArStatus::Failed => {
                let reason =
                    ArActivationError::ActivationFailed("AR session failed".into()).to_string();
                match self.phase {
                    Phase::Launching { .. } => self.abort_launch(&reason),
                    Phase::Active { .. } => self.fail_hand_off(&reason),
                    _ => tracing::debug!("Ignoring AR failure outside a launch"),
                }
                self.refresh_state();
            }
        }
    }

    /// Feed a page visibility change. Becoming visible ends an active AR
    /// session; becoming hidden confirms the native viewer took over.
    pub fn on_visibility_change(&mut self, visible: bool) {
        if visible {
            self.end_ar_session("page visible");
        } else {
            self.confirm_active();
        }
    }

    /// Feed an AR error reported by the element, or the rejection of an
    /// activation request.
    ///
    /// An error that arrives after activation was requested but before the
    /// native viewer confirmed it took over is a failed launch.
    pub fn on_ar_error(&mut self, message: &str) {
        if is_ar_unavailable_error(&self.platform, message) {
            self.ar_unavailable(message);
            return;
        }
        match self.phase {
            Phase::Launching { .. } => self.abort_launch(message),
            Phase::Active { confirmed: false } => {
                let reason = ArActivationError::ActivationFailed(message.into()).to_string();
                self.fail_hand_off(&reason);
            }
            _ => tracing::warn!("AR error outside launch: {message}"),
        }
        self.refresh_state();
    }

    /// Dismiss the "device unsupported" notice.
    pub fn acknowledge_notice(&mut self) {
        if self.notice_visible {
            self.notice_visible = false;
            self.emit(&ViewerEvent::NoticeDismissed);
        }
    }

    /// Advance time-based transitions: guide expiry and the launch timeout.
    pub fn tick(&mut self, now_millis: u64) {
        if self.guide_until.is_some_and(|until| now_millis >= until) {
            self.hide_guide();
        }
        if let Phase::Launching {
            deadline: Some(deadline),
            ..
        } = self.phase
        {
            if now_millis >= deadline {
                self.abort_launch(&ArActivationError::Timeout.to_string());
            }
        }
        self.refresh_state();
    }

    fn in_ar(&self) -> bool {
        matches!(
            self.phase,
            Phase::Launching { .. } | Phase::Active { .. } | Phase::Restoring
        )
    }

    fn apply(&mut self, descriptor: ModelDescriptor, blocking: bool) {
        let uri = descriptor.asset_for(self.platform.ar_viewer).to_string();
        tracing::info!(key = %descriptor.key, %uri, "Applying model");

        self.element.set_placement_scale(descriptor.placement_scale);
        let load = self.element.set_source(self.platform.ar_viewer, &uri);
        self.active = Some(descriptor);

        match load {
            SourceLoad::Ready => {
                self.pending_src = None;
                self.mark_loaded();
            }
            SourceLoad::Pending => {
                self.pending_src = Some(uri);
                self.set_loading(blocking);
            }
        }
    }

    fn mark_loaded(&mut self) {
        self.pending_src = None;
        self.loaded.clone_from(&self.active);
        self.set_loading(false);
        if let Some(model) = &self.active {
            let key = model.key.clone();
            tracing::debug!(%key, "Model loaded");
            self.emit(&ViewerEvent::ModelLoaded { key });
        }
        if let Phase::Launching { .. } = self.phase {
            self.activate();
        }
    }

    fn activate(&mut self) {
        match self.element.activate_ar() {
            Ok(()) => self.enter_active(),
            Err(ArActivationError::ActivationFailed(message))
                if is_ar_unavailable_error(&self.platform, &message) =>
            {
                self.ar_unavailable(&message);
            }
            Err(e) => self.abort_launch(&e.to_string()),
        }
    }

    fn enter_active(&mut self) {
        tracing::info!("Native AR viewer active");
        self.phase = Phase::Active { confirmed: false };
        self.set_loading(false);
        self.emit(&ViewerEvent::ArStarted);
    }

    fn confirm_active(&mut self) {
        if self.phase == (Phase::Active { confirmed: false }) {
            tracing::debug!("Native AR session confirmed");
            self.phase = Phase::Active { confirmed: true };
        }
    }

    /// Return to idle after the native viewer failed to present. Nothing is
    /// persisted and the page stays where it is.
    fn fail_hand_off(&mut self, reason: &str) {
        tracing::warn!("Native AR viewer failed: {reason}");
        self.phase = Phase::Idle;
        self.set_loading(false);
        self.emit(&ViewerEvent::ArLaunchFailed {
            reason: reason.to_string(),
        });
    }

    fn abort_launch(&mut self, reason: &str) {
        let Phase::Launching {
            restore_loading, ..
        } = self.phase
        else {
            return;
        };
        tracing::warn!("AR launch abandoned: {reason}");
        self.phase = Phase::Idle;
        self.set_loading(restore_loading && self.pending_src.is_some());
        self.emit(&ViewerEvent::ArLaunchFailed {
            reason: reason.to_string(),
        });
    }

    fn end_ar_session(&mut self, trigger: &str) {
        if !matches!(self.phase, Phase::Active { .. }) {
            tracing::debug!(trigger, "Ignoring AR end signal");
            return;
        }
        tracing::info!(trigger, "Native AR session ended");
        self.phase = Phase::Restoring;
        self.refresh_state();

        if let Some(record) = self.pending_record.take().filter(|r| r.photo.is_some()) {
            if let Err(e) = self.store.save(&record) {
                tracing::warn!("Failed to persist QR record: {e}");
            }
        }
        self.navigator.return_to_home();

        self.phase = Phase::Idle;
        self.emit(&ViewerEvent::ArEnded);
        self.refresh_state();
    }

    fn ar_unavailable(&mut self, message: &str) {
        tracing::warn!("{}: {message}", ArError::ArCoreUnavailable);
        if let Phase::Launching {
            restore_loading, ..
        } = self.phase
        {
            self.set_loading(restore_loading && self.pending_src.is_some());
        }
        if self.phase != Phase::Uninitialized {
            self.phase = Phase::Idle;
        }
        self.notice_visible = true;
        self.emit(&ViewerEvent::ArUnsupported);
        self.refresh_state();
    }

    fn hide_guide(&mut self) {
        if self.guide_until.take().is_some() {
            self.emit(&ViewerEvent::GuideHidden);
        }
    }

    fn set_loading(&mut self, visible: bool) {
        if self.loading_visible != visible {
            self.loading_visible = visible;
            self.emit(&ViewerEvent::Loading { visible });
        }
    }

    fn derived_state(&self) -> ViewerState {
        match self.phase {
            Phase::Uninitialized => ViewerState::Uninitialized,
            Phase::Launching { .. } => ViewerState::ArLaunching,
            Phase::Active { .. } => ViewerState::ArActive,
            Phase::Restoring => ViewerState::Restoring,
            Phase::Idle if self.guide_until.is_some() => ViewerState::GuideShowing,
            Phase::Idle if self.loading_visible => ViewerState::Switching,
            Phase::Idle => ViewerState::Ready,
        }
    }

    fn refresh_state(&mut self) {
        let state = self.derived_state();
        if state != self.state {
            tracing::info!(from = %self.state, to = %state, "Viewer state changed");
            self.state = state;
            self.emit(&ViewerEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: &ViewerEvent) {
        self.observer.on_event(event);
    }
}

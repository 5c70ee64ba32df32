//! The page-facing entry point wiring browser adapters to the core.

use std::cell::RefCell;
use std::rc::Rc;

use ar_core::{
    ArStatus, DecodedPayload, ExperienceConfig, ExperienceFlags, KeyValueStorage, MemoryStorage,
    ModelResolver, PlatformFacts, ScanPipeline, SessionStore, ViewerSession,
};
use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{CustomEvent, Document, Event, VisibilityState, Window};

use crate::camera::WebCamera;
use crate::clock::{performance_now, AnimationFrameClock};
use crate::decoder::JsQrDecoder;
use crate::error::{js_error_text, WebError, WebResult};
use crate::host::PageBridge;
use crate::listener::{Interval, Listener};
use crate::storage::LocalStorage;
use crate::viewer::ModelViewer;

/// How often time-based viewer transitions are evaluated.
const TICK_PERIOD_MS: i32 = 200;

type Session = ViewerSession<ModelViewer>;

struct Shared {
    window: Window,
    session: RefCell<Session>,
    resolver: ModelResolver,
}

/// Run `f` against the session, then watch any activation it started.
///
/// Input arriving while the session is borrowed is dropped with a warning.
fn with_session(shared: &Rc<Shared>, f: impl FnOnce(&mut Session)) {
    let activation = match shared.session.try_borrow_mut() {
        Ok(mut session) => {
            f(&mut *session);
            session.element_mut().take_pending_activation()
        }
        Err(_) => {
            tracing::warn!("Viewer session busy, dropping input");
            return;
        }
    };
    if let Some(promise) = activation {
        watch_activation(shared, promise);
    }
}

fn watch_activation(shared: &Rc<Shared>, promise: Promise) {
    let shared = Rc::clone(shared);
    wasm_bindgen_futures::spawn_local(async move {
        if let Err(e) = JsFuture::from(promise).await {
            let message = js_error_text(&e);
            tracing::warn!("activateAR rejected: {message}");
            with_session(&shared, |session| session.on_ar_error(&message));
        }
    });
}

fn scan_completed(shared: &Rc<Shared>, payload: DecodedPayload) {
    let resolution = shared.resolver.resolve_with_reason(Some(&payload.raw_text));
    tracing::info!(
        key = %resolution.descriptor.key,
        matched_by = ?resolution.matched_by,
        "Scan resolved"
    );
    let descriptor = resolution.descriptor.clone();
    let now = performance_now(&shared.window);
    with_session(shared, |session| {
        session.scan_resolved(&descriptor, Some(payload), now);
    });
}

/// Text of a `<model-viewer>` error event.
fn model_error_message(event: &Event) -> String {
    let Some(detail) = event.dyn_ref::<CustomEvent>().map(CustomEvent::detail) else {
        return "model load failed".to_string();
    };
    if let Ok(source) = Reflect::get(&detail, &"sourceError".into()) {
        if !source.is_undefined() && !source.is_null() {
            return js_error_text(&source);
        }
    }
    Reflect::get(&detail, &"type".into())
        .ok()
        .and_then(|t| t.as_string())
        .unwrap_or_else(|| "model load failed".to_string())
}

/// URL a `<model-viewer>` load event reports, made origin-relative so it
/// compares equal to the source that was set.
fn loaded_url(event: &Event, window: &Window) -> Option<String> {
    let detail = event.dyn_ref::<CustomEvent>()?.detail();
    let url = Reflect::get(&detail, &"url".into()).ok()?.as_string()?;
    let origin = window.location().origin().unwrap_or_default();
    Some(relative_to_origin(url, &origin))
}

fn relative_to_origin(url: String, origin: &str) -> String {
    if origin.is_empty() {
        return url;
    }
    match url.strip_prefix(origin) {
        Some(path) if path.starts_with('/') => path.to_string(),
        _ => url,
    }
}

fn ar_status(event: &Event) -> Option<ArStatus> {
    let detail = event.dyn_ref::<CustomEvent>()?.detail();
    let status = Reflect::get(&detail, &"status".into()).ok()?.as_string()?;
    ArStatus::parse(&status)
}

/// Scan-to-AR experience bound to one page.
///
/// ```javascript
/// const experience = new WebExperience('viewer', null, onEvent, () => {
///     location.href = '/';
/// });
/// experience.initialize(null);
/// await experience.startScan();
/// experience.launchAr();
/// ```
#[wasm_bindgen]
pub struct WebExperience {
    shared: Rc<Shared>,
    pipeline: ScanPipeline,
    store: SessionStore,
    flags: ExperienceFlags,
    _listeners: Vec<Listener>,
    _ticker: Interval,
}

#[wasm_bindgen]
impl WebExperience {
    /// Attach to the `<model-viewer>` element with id `viewer_id`.
    ///
    /// `on_event` receives every scan and viewer event as a JSON string;
    /// `on_return_home` is called once when an AR session ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is missing or the configuration JSON
    /// is invalid.
    #[wasm_bindgen(constructor)]
    pub fn new(
        viewer_id: &str,
        config_json: Option<String>,
        on_event: Function,
        on_return_home: Function,
    ) -> Result<WebExperience, JsValue> {
        Ok(Self::build(viewer_id, config_json.as_deref(), on_event, on_return_home)?)
    }

    /// Load the model with catalog key `key` (or the default) and start
    /// prefetching the others.
    pub fn initialize(&self, key: Option<String>) {
        let shared = &self.shared;
        let initial = key.and_then(|key| shared.resolver.catalog().get(&key).cloned());
        with_session(shared, |session| session.initialize(initial.as_ref()));
    }

    /// Open the camera and scan until a code is found.
    ///
    /// The promise resolves once the decode loop ends and rejects with the
    /// camera error text if acquisition fails.
    #[wasm_bindgen(js_name = startScan)]
    pub fn start_scan(&self) -> Promise {
        let pipeline = self.pipeline.clone();
        let shared = Rc::clone(&self.shared);
        pipeline.on_complete(move |payload| scan_completed(&shared, payload));
        future_to_promise(async move {
            pipeline
                .start()
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            pipeline.run().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Stop scanning and release the camera.
    #[wasm_bindgen(js_name = stopScan)]
    pub fn stop_scan(&self) {
        self.pipeline.stop();
    }

    /// Switch to the model with catalog key `key`. Returns `false` if unknown.
    #[wasm_bindgen(js_name = selectModel)]
    pub fn select_model(&self, key: &str) -> bool {
        let Some(descriptor) = self.shared.resolver.catalog().get(key).cloned() else {
            tracing::warn!(%key, "Unknown model key");
            return false;
        };
        with_session(&self.shared, |session| session.change_model(&descriptor));
        true
    }

    /// Launch the native AR viewer on the current model.
    #[wasm_bindgen(js_name = launchAr)]
    pub fn launch_ar(&self) {
        let now = performance_now(&self.shared.window);
        with_session(&self.shared, |session| session.request_ar(now));
    }

    /// Dismiss the "device unsupported" notice.
    #[wasm_bindgen(js_name = acknowledgeNotice)]
    pub fn acknowledge_notice(&self) {
        with_session(&self.shared, Session::acknowledge_notice);
    }

    /// Current viewer state name.
    #[must_use]
    pub fn state(&self) -> String {
        self.shared
            .session
            .try_borrow()
            .map(|session| session.state().to_string())
            .unwrap_or_default()
    }

    /// Current scan state name.
    #[wasm_bindgen(js_name = scanState)]
    #[must_use]
    pub fn scan_state(&self) -> String {
        self.pipeline.state().to_string()
    }

    /// Consume the scan saved by the last AR session, as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    #[wasm_bindgen(js_name = takeSavedScan)]
    pub fn take_saved_scan(&self) -> Result<Option<String>, JsValue> {
        let record = self.store.take().map_err(WebError::from)?;
        record
            .map(|r| serde_json::to_string(&r))
            .transpose()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Whether the onboarding screens were already completed.
    #[wasm_bindgen(js_name = onboardingSeen)]
    #[must_use]
    pub fn onboarding_seen(&self) -> bool {
        self.flags.onboarding_seen()
    }

    /// Remember that onboarding was completed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written.
    #[wasm_bindgen(js_name = markOnboardingSeen)]
    pub fn mark_onboarding_seen(&self) -> Result<(), JsValue> {
        Ok(self.flags.mark_onboarding_seen().map_err(WebError::from)?)
    }

    /// Whether the AR usage guide was already shown.
    #[wasm_bindgen(js_name = arGuideShown)]
    #[must_use]
    pub fn ar_guide_shown(&self) -> bool {
        self.flags.ar_guide_shown()
    }

    /// Remember that the AR usage guide was shown.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written.
    #[wasm_bindgen(js_name = markArGuideShown)]
    pub fn mark_ar_guide_shown(&self) -> Result<(), JsValue> {
        Ok(self.flags.mark_ar_guide_shown().map_err(WebError::from)?)
    }
}

impl WebExperience {
    fn build(
        viewer_id: &str,
        config_json: Option<&str>,
        on_event: Function,
        on_return_home: Function,
    ) -> WebResult<Self> {
        let window = web_sys::window().ok_or(WebError::NoWindow)?;
        let document = window.document().ok_or(WebError::NoDocument)?;
        let element = document
            .get_element_by_id(viewer_id)
            .ok_or_else(|| WebError::ElementNotFound(viewer_id.to_string()))?;

        let config = match config_json {
            Some(json) => ExperienceConfig::from_json(json)?,
            None => ExperienceConfig::default(),
        };
        let catalog = config.build_catalog()?;
        let user_agent = window.navigator().user_agent().unwrap_or_default();
        let platform = PlatformFacts::from_user_agent(&user_agent);
        tracing::info!("Platform: {}", platform.summary());

        let storage: Rc<dyn KeyValueStorage> = match LocalStorage::open(&window) {
            Ok(storage) => Rc::new(storage),
            Err(e) => {
                tracing::warn!("{e}; scan records will not survive navigation");
                Rc::new(MemoryStorage::new())
            }
        };
        let store = SessionStore::new(Rc::clone(&storage));
        let flags = ExperienceFlags::new(storage);

        let bridge = Rc::new(PageBridge::new(window.clone(), on_event, on_return_home));
        let session = ViewerSession::new(
            ModelViewer::new(element.clone(), document.clone()),
            platform,
            catalog.clone(),
            store.clone(),
            bridge.clone(),
        )
        .with_observer(bridge.clone())
        .with_config(config.viewer.clone());

        let decoder = JsQrDecoder::new();
        if !decoder.is_available() {
            tracing::warn!("jsQR is not loaded yet; decoding will wait for it");
        }
        let pipeline = ScanPipeline::new(
            Rc::new(WebCamera::new(document.clone())),
            Rc::new(decoder),
            Rc::new(AnimationFrameClock::new(window.clone())),
            bridge,
            config.scan.clone(),
        );

        let shared = Rc::new(Shared {
            window: window.clone(),
            session: RefCell::new(session),
            resolver: ModelResolver::new(catalog),
        });
        let listeners = Self::listen(&shared, &element, &document)?;
        let ticker = {
            let shared = Rc::clone(&shared);
            Interval::new(&window, TICK_PERIOD_MS, move || {
                let now = performance_now(&shared.window);
                with_session(&shared, |session| session.tick(now));
            })?
        };

        Ok(Self {
            shared,
            pipeline,
            store,
            flags,
            _listeners: listeners,
            _ticker: ticker,
        })
    }

    fn listen(
        shared: &Rc<Shared>,
        element: &web_sys::Element,
        document: &Document,
    ) -> WebResult<Vec<Listener>> {
        let on_load = {
            let shared = Rc::clone(shared);
            Listener::new(element, "load", move |event| {
                let Some(url) = loaded_url(&event, &shared.window) else {
                    tracing::debug!("Load event without a url");
                    return;
                };
                with_session(&shared, |session| session.on_model_loaded(&url));
            })?
        };
        let on_error = {
            let shared = Rc::clone(shared);
            Listener::new(element, "error", move |event| {
                let message = model_error_message(&event);
                with_session(&shared, |session| {
                    let viewer = session.platform().ar_viewer;
                    let src = session.element().current_source(viewer).unwrap_or_default();
                    session.on_model_error(&src, &message);
                });
            })?
        };
        let on_status = {
            let shared = Rc::clone(shared);
            Listener::new(element, "ar-status", move |event| {
                if let Some(status) = ar_status(&event) {
                    with_session(&shared, |session| session.on_ar_status(status));
                }
            })?
        };
        let on_visibility = {
            let shared = Rc::clone(shared);
            let doc = document.clone();
            Listener::new(document, "visibilitychange", move |_event| {
                let visible = doc.visibility_state() == VisibilityState::Visible;
                with_session(&shared, |session| session.on_visibility_change(visible));
            })?
        };
        Ok(vec![on_load, on_error, on_status, on_visibility])
    }
}

impl Drop for WebExperience {
    fn drop(&mut self) {
        self.pipeline.stop();
    }
}

//! Viewer Session Integration Tests
//!
//! Tests the viewer session against recording hosts:
//! - Platform-conditional asset loading and prefetch
//! - Idempotent AR session end
//! - Persistence across the AR hand-off
//! - Full scan → resolve → AR → home flow

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use ar_core::{
    ArActivationError, ArStatus, ArViewer, DecodedPayload, KeyValueStorage, MatchKind,
    MemoryStorage, ModelCatalog, ModelResolver, PlatformFacts, Quad, ScanConfig, ScanPipeline,
    SessionStore, ViewerEvent, ViewerSession, ViewerState,
};
use common::{
    FakeCamera, Host, InstantClock, RecordingElement, RecordingFeedback, ScriptedDecoder,
    ANDROID_UA, IPHONE_UA,
};

struct Rig {
    session: ViewerSession<RecordingElement>,
    host: Rc<Host>,
    store: SessionStore,
    storage: Rc<MemoryStorage>,
}

fn rig(user_agent: &str) -> Rig {
    let host = Rc::new(Host::default());
    let storage = Rc::new(MemoryStorage::new());
    let store = SessionStore::new(storage.clone());
    let session = ViewerSession::new(
        RecordingElement::default(),
        PlatformFacts::from_user_agent(user_agent),
        ModelCatalog::builtin(),
        store.clone(),
        host.clone(),
    )
    .with_observer(host.clone());
    Rig {
        session,
        host,
        store,
        storage,
    }
}

fn payload(text: &str) -> DecodedPayload {
    DecodedPayload {
        raw_text: text.to_string(),
        frame_location: Quad::from_rect(10.0, 10.0, 50.0, 50.0),
        captured_at_millis: 1_234,
        photo: Some("data:image/jpeg;base64,AAAA".to_string()),
        video_width: 640,
        video_height: 480,
    }
}

/// Initialize, load the first model and enter native AR.
fn enter_ar(rig: &mut Rig) {
    rig.session.initialize(None);
    let src = rig.session.element().sources[0].1.clone();
    rig.session.on_model_loaded(&src);
    rig.session.request_ar(0);
    assert_eq!(rig.session.state(), ViewerState::ArActive);
}

// ============================================================================
// Bandwidth-conditional loading
// ============================================================================

#[test]
fn test_ios_initialize_requests_only_usdz_assets() {
    let mut rig = rig(IPHONE_UA);
    rig.session.initialize(None);

    let element = rig.session.element();
    assert_eq!(
        element.sources,
        [(
            ArViewer::QuickLook,
            "/assets/models/church-model-01-rescale.usdz".to_string()
        )]
    );
    assert_eq!(
        element.prefetched,
        [
            "/assets/models/church-model-02.usdz",
            "/assets/models/church-model-03.usdz"
        ]
    );
    assert!(element
        .requested_uris()
        .iter()
        .all(|uri| !uri.ends_with(".glb")));
    assert!(element.ar_enabled);
    assert_eq!(rig.session.state(), ViewerState::Ready);
}

#[test]
fn test_android_initialize_requests_only_glb_assets() {
    let mut rig = rig(ANDROID_UA);
    let second = ModelCatalog::builtin().get("MODEL_CHURCH_02").cloned();
    rig.session.initialize(second.as_ref());

    let element = rig.session.element();
    assert_eq!(element.sources[0].1, "/assets/models/church-model-02.glb");
    assert_eq!(element.prefetched.len(), 2);
    assert!(element
        .requested_uris()
        .iter()
        .all(|uri| uri.ends_with(".glb")));
}

#[test]
fn test_switch_applies_scale_of_new_model() {
    let mut rig = rig(IPHONE_UA);
    rig.session.initialize(None);
    let first_scale = rig.session.element().scale.expect("scale set");
    assert!((first_scale.x - 0.3).abs() < f32::EPSILON);

    let third = ModelCatalog::builtin()
        .get("MODEL_CHURCH_03")
        .cloned()
        .expect("model");
    rig.session.change_model(&third);
    let scale = rig.session.element().scale.expect("scale set");
    assert!((scale.x - 1.0).abs() < f32::EPSILON);
}

// ============================================================================
// AR session end
// ============================================================================

#[test]
fn test_duplicate_visibility_returns_home_once() {
    let mut rig = rig(IPHONE_UA);
    rig.session
        .scan_resolved(&ModelCatalog::builtin().default_model().clone(), Some(payload("1")), 0);
    enter_ar(&mut rig);

    rig.session.on_visibility_change(true);
    rig.session.on_visibility_change(true);

    assert_eq!(rig.host.homes.get(), 1);
    assert_eq!(rig.session.state(), ViewerState::Ready);
    let ended = rig
        .host
        .events
        .borrow()
        .iter()
        .filter(|e| **e == ViewerEvent::ArEnded)
        .count();
    assert_eq!(ended, 1);
}

#[test]
fn test_status_and_visibility_signals_share_one_transition() {
    let mut rig = rig(ANDROID_UA);
    enter_ar(&mut rig);

    rig.session.on_ar_status(ArStatus::NotPresenting);
    rig.session.on_visibility_change(true);
    rig.session.on_ar_status(ArStatus::NotPresenting);
    assert_eq!(rig.host.homes.get(), 1);
}

#[test]
fn test_hidden_page_does_not_end_session() {
    let mut rig = rig(ANDROID_UA);
    enter_ar(&mut rig);
    rig.session.on_visibility_change(false);
    assert_eq!(rig.session.state(), ViewerState::ArActive);
    assert_eq!(rig.host.homes.get(), 0);
}

#[test]
fn test_session_end_persists_pending_scan_once() {
    let mut rig = rig(IPHONE_UA);
    let catalog = ModelCatalog::builtin();
    let model = catalog.get("MODEL_CHURCH_02").cloned().expect("model");
    rig.session
        .scan_resolved(&model, Some(payload("MODEL_CHURCH_02")), 0);
    let src = rig.session.element().sources[0].1.clone();
    rig.session.on_model_loaded(&src);
    rig.session.request_ar(10);
    assert_eq!(rig.session.state(), ViewerState::ArActive);
    assert!(rig.store.load().expect("load").is_none());

    rig.session.on_visibility_change(true);
    let record = rig.store.load().expect("load").expect("record saved");
    assert_eq!(record.payload, "MODEL_CHURCH_02");
    assert_eq!(record.captured_at_millis, 1_234);

    // a later end signal must not rewrite a consumed record
    rig.store.take().expect("take");
    rig.session.on_visibility_change(true);
    assert!(rig.store.load().expect("load").is_none());
}

#[test]
fn test_new_scan_invalidates_stored_record() {
    let mut rig = rig(ANDROID_UA);
    rig.store
        .save(&payload("MODEL_CHURCH_03").into())
        .expect("seed record");
    rig.session.initialize(None);
    rig.session
        .scan_resolved(&ModelCatalog::builtin().default_model().clone(), None, 0);
    assert!(rig.store.load().expect("load").is_none());
    assert!(rig.storage.get("qrLocation").expect("get").is_none());
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_activation_failure_restores_ready_and_allows_retry() {
    let mut rig = rig(IPHONE_UA);
    rig.session.initialize(None);
    let src = rig.session.element().sources[0].1.clone();
    rig.session.on_model_loaded(&src);
    rig.session
        .element_mut()
        .queue
        .push_back(Err(ArActivationError::ActivationFailed("blocked".into())));

    rig.session.request_ar(0);
    assert_eq!(rig.session.state(), ViewerState::Ready);
    assert!(rig
        .host
        .events
        .borrow()
        .iter()
        .any(|e| matches!(e, ViewerEvent::ArLaunchFailed { reason } if reason.contains("blocked"))));

    rig.session.request_ar(0);
    assert_eq!(rig.session.state(), ViewerState::ArActive);
    assert_eq!(rig.session.element().activations, 2);
}

#[test]
fn test_rejected_activation_after_hand_off_restores_ready() {
    let mut rig = rig(ANDROID_UA);
    rig.session
        .scan_resolved(&ModelCatalog::builtin().default_model().clone(), Some(payload("1")), 0);
    enter_ar(&mut rig);

    rig.session.on_ar_error("NotAllowedError: user gesture required");
    assert_eq!(rig.session.state(), ViewerState::Ready);
    assert!(!rig.session.notice_visible());
    assert_eq!(rig.host.homes.get(), 0);
    assert!(rig.store.load().expect("load").is_none());
    assert!(rig.host.events.borrow().iter().any(|e| matches!(
        e,
        ViewerEvent::ArLaunchFailed { reason } if reason.contains("user gesture")
    )));

    // a stale end signal does nothing, and the user can launch again
    rig.session.on_visibility_change(true);
    assert_eq!(rig.host.homes.get(), 0);
    rig.session.request_ar(0);
    assert_eq!(rig.session.state(), ViewerState::ArActive);
    assert_eq!(rig.session.element().activations, 2);
}

#[test]
fn test_errors_after_confirmed_session_keep_ar_active() {
    let mut rig = rig(ANDROID_UA);
    enter_ar(&mut rig);
    rig.session.on_ar_status(ArStatus::SessionStarted);

    rig.session.on_ar_error("texture decode warning");
    assert_eq!(rig.session.state(), ViewerState::ArActive);

    rig.session.on_ar_status(ArStatus::NotPresenting);
    assert_eq!(rig.host.homes.get(), 1);
}

#[test]
fn test_hidden_page_confirms_hand_off() {
    let mut rig = rig(IPHONE_UA);
    enter_ar(&mut rig);
    rig.session.on_visibility_change(false);

    rig.session.on_ar_error("late rejection");
    assert_eq!(rig.session.state(), ViewerState::ArActive);
    rig.session.on_visibility_change(true);
    assert_eq!(rig.host.homes.get(), 1);
}

#[test]
fn test_failed_status_on_android_is_not_reported_as_unsupported() {
    let mut rig = rig(ANDROID_UA);
    rig.session
        .scan_resolved(&ModelCatalog::builtin().default_model().clone(), Some(payload("1")), 0);
    enter_ar(&mut rig);
    rig.session.on_ar_status(ArStatus::SessionStarted);

    rig.session.on_ar_status(ArStatus::Failed);
    assert_eq!(rig.session.state(), ViewerState::Ready);
    assert!(!rig.session.notice_visible());
    assert!(!rig.host.events.borrow().contains(&ViewerEvent::ArUnsupported));
    assert!(rig
        .host
        .events
        .borrow()
        .iter()
        .any(|e| matches!(e, ViewerEvent::ArLaunchFailed { .. })));
    assert_eq!(rig.host.homes.get(), 0);
    assert!(rig.store.load().expect("load").is_none());
}

#[test]
fn test_session_end_without_photo_persists_nothing() {
    let mut rig = rig(ANDROID_UA);
    let mut scanned = payload("MODEL_CHURCH_01");
    scanned.photo = None;
    rig.session
        .scan_resolved(&ModelCatalog::builtin().default_model().clone(), Some(scanned), 0);
    enter_ar(&mut rig);

    rig.session.on_ar_status(ArStatus::NotPresenting);
    assert_eq!(rig.host.homes.get(), 1);
    assert!(rig.store.load().expect("load").is_none());
    assert!(rig.storage.is_empty());
}

#[test]
fn test_arcore_unavailable_notice_blocks_until_acknowledged() {
    let mut rig = rig(ANDROID_UA);
    enter_ar(&mut rig);
    rig.session.on_visibility_change(true);

    rig.session
        .element_mut()
        .queue
        .push_back(Err(ArActivationError::ActivationFailed(
            "AR not available on this device".into(),
        )));
    rig.session.request_ar(0);
    assert!(rig.session.notice_visible());
    assert!(rig.host.events.borrow().contains(&ViewerEvent::ArUnsupported));

    rig.session.request_ar(0);
    assert_eq!(rig.session.element().activations, 2);

    rig.session.acknowledge_notice();
    rig.session.request_ar(0);
    assert_eq!(rig.session.element().activations, 3);
    assert_eq!(rig.session.state(), ViewerState::ArActive);
}

#[test]
fn test_superseded_guide_extends_display() {
    let mut rig = rig(ANDROID_UA);
    rig.session.initialize(None);
    let model = ModelCatalog::builtin().default_model().clone();
    rig.session.scan_resolved(&model, None, 0);
    rig.session.scan_resolved(&model, None, 2_000);

    rig.session.tick(3_000);
    assert_eq!(rig.session.state(), ViewerState::GuideShowing);
    rig.session.tick(5_000);
    assert_ne!(rig.session.state(), ViewerState::GuideShowing);
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_scan_resolve_launch_and_return() {
    let clock = Rc::new(InstantClock::default());
    let camera = Rc::new(FakeCamera {
        frames: Rc::clone(&clock.frames),
        ..FakeCamera::default()
    });
    let decoder = Rc::new(ScriptedDecoder::new(
        4,
        "https://example.com/?model=MODEL_CHURCH_02",
    ));
    let pipeline = ScanPipeline::new(
        camera.clone(),
        decoder,
        clock,
        Rc::new(RecordingFeedback::default()),
        ScanConfig::default(),
    );
    let scanned = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&scanned);
    pipeline.on_complete(move |payload| *sink.borrow_mut() = Some(payload));
    pipeline.scan().await.expect("scan");
    assert_eq!(camera.live_tracks(), 0);

    let payload = scanned.borrow_mut().take().expect("payload delivered");
    let resolver = ModelResolver::default();
    let resolution = resolver.resolve_with_reason(Some(&payload.raw_text));
    assert_eq!(resolution.matched_by, MatchKind::UrlModelKey);
    assert_eq!(resolution.descriptor.key, "MODEL_CHURCH_02");
    let descriptor = resolution.descriptor.clone();

    let mut rig = rig(ANDROID_UA);
    rig.session.initialize(None);
    rig.session.scan_resolved(&descriptor, Some(payload), 100);
    assert_eq!(rig.session.state(), ViewerState::GuideShowing);

    // launch before the switch finishes loading
    rig.session.request_ar(200);
    assert_eq!(rig.session.state(), ViewerState::ArLaunching);
    rig.session
        .on_model_loaded("/assets/models/church-model-02.glb");
    assert_eq!(rig.session.state(), ViewerState::ArActive);

    rig.session.on_ar_status(ArStatus::NotPresenting);
    assert_eq!(rig.host.homes.get(), 1);

    let record = rig.store.take().expect("take").expect("record");
    assert_eq!(record.payload, "https://example.com/?model=MODEL_CHURCH_02");
    assert!(record
        .photo
        .is_some_and(|p| p.starts_with("data:image/jpeg;base64,")));
    assert!(rig.store.take().expect("take").is_none());
}

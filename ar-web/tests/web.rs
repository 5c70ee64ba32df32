//! Browser Adapter Tests
//!
//! Run with `wasm-pack test --headless --chrome ar-web`.

#![cfg(target_arch = "wasm32")]

use ar_core::{
    ArViewer, FrameBuffer, Inversion, KeyValueStorage, ModelViewerElement, QrDecoder, SourceLoad,
    Vec3,
};
use ar_web::{JsQrDecoder, LocalStorage, ModelViewer};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn document() -> web_sys::Document {
    web_sys::window()
        .and_then(|w| w.document())
        .expect("document")
}

// ============================================================================
// Storage
// ============================================================================

#[wasm_bindgen_test]
fn test_local_storage_roundtrip() {
    let window = web_sys::window().expect("window");
    let storage = LocalStorage::open(&window).expect("localStorage");
    storage.set("ar-web-test", "value").expect("set");
    assert_eq!(
        storage.get("ar-web-test").expect("get").as_deref(),
        Some("value")
    );
    storage.remove("ar-web-test").expect("remove");
    assert!(storage.get("ar-web-test").expect("get").is_none());
}

// ============================================================================
// Viewer element
// ============================================================================

#[wasm_bindgen_test]
fn test_quick_look_source_is_ready_and_clears_src() {
    let doc = document();
    let element = doc.create_element("model-viewer").expect("element");
    element.set_attribute("src", "/old.glb").expect("attr");
    let mut viewer = ModelViewer::new(element.clone(), doc);

    let load = viewer.set_source(ArViewer::QuickLook, "/assets/models/a.usdz");
    assert_eq!(load, SourceLoad::Ready);
    assert_eq!(
        element.get_attribute("ios-src").as_deref(),
        Some("/assets/models/a.usdz")
    );
    assert!(element.get_attribute("src").is_none());
}

#[wasm_bindgen_test]
fn test_scene_viewer_source_waits_for_load() {
    let doc = document();
    let element = doc.create_element("model-viewer").expect("element");
    let mut viewer = ModelViewer::new(element.clone(), doc);

    assert_eq!(
        viewer.set_source(ArViewer::SceneViewer, "/assets/models/a.glb"),
        SourceLoad::Pending
    );
    viewer.set_placement_scale(Vec3::uniform(0.3));
    viewer.set_ar_enabled(true);
    assert_eq!(element.get_attribute("scale").as_deref(), Some("0.3 0.3 0.3"));
    assert!(element.has_attribute("ar"));
}

#[wasm_bindgen_test]
fn test_activation_without_model_viewer_script_fails() {
    let doc = document();
    let element = doc.create_element("div").expect("element");
    let mut viewer = ModelViewer::new(element, doc);
    assert!(viewer.activate_ar().is_err());
}

// ============================================================================
// Decoder
// ============================================================================

#[wasm_bindgen_test]
async fn test_missing_decoder_finds_nothing() {
    let decoder = JsQrDecoder::with_global("__no_such_decoder__");
    assert!(!decoder.is_available());
    let frame = FrameBuffer::solid(4, 4, [255, 255, 255, 255]);
    assert!(decoder.decode(&frame, Inversion::AttemptBoth).await.is_none());
}

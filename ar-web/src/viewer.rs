//! The `<model-viewer>` element as a [`ModelViewerElement`].

use ar_core::{ArActivationError, ArViewer, ModelViewerElement, SourceLoad, Vec3};
use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element};

use crate::error::js_error_text;

/// Attribute that carries the asset for `viewer`.
///
/// Quick Look reads `ios-src` and never loads it in the page, so on iOS the
/// 3D preview stays empty and only the USDZ is ever fetched.
#[must_use]
pub const fn source_attribute(viewer: ArViewer) -> &'static str {
    match viewer {
        ArViewer::QuickLook => "ios-src",
        ArViewer::SceneViewer | ArViewer::Generic => "src",
    }
}

/// Wraps a `<model-viewer>` element already present in the page.
#[derive(Debug)]
pub struct ModelViewer {
    element: Element,
    document: Document,
    pending_activation: Option<Promise>,
}

impl ModelViewer {
    /// Adapter over `element`.
    #[must_use]
    pub fn new(element: Element, document: Document) -> Self {
        Self {
            element,
            document,
            pending_activation: None,
        }
    }

    /// The wrapped element, for attaching listeners.
    #[must_use]
    pub const fn element(&self) -> &Element {
        &self.element
    }

    /// Current value of the source attribute used on `viewer`.
    #[must_use]
    pub fn current_source(&self, viewer: ArViewer) -> Option<String> {
        self.element.get_attribute(source_attribute(viewer))
    }

    /// The promise returned by the last `activateAR()` call, if any.
    ///
    /// Activation can reject asynchronously; the host awaits this and routes
    /// a rejection back to the session.
    pub fn take_pending_activation(&mut self) -> Option<Promise> {
        self.pending_activation.take()
    }

    fn set_attr(&self, name: &str, value: &str) {
        if let Err(e) = self.element.set_attribute(name, value) {
            tracing::warn!(%name, "Failed to set viewer attribute: {}", js_error_text(&e));
        }
    }

    fn remove_attr(&self, name: &str) {
        if let Err(e) = self.element.remove_attribute(name) {
            tracing::warn!(%name, "Failed to remove viewer attribute: {}", js_error_text(&e));
        }
    }
}

impl ModelViewerElement for ModelViewer {
    fn set_source(&mut self, viewer: ArViewer, uri: &str) -> SourceLoad {
        self.set_attr(source_attribute(viewer), uri);
        match viewer {
            ArViewer::QuickLook => {
                // a stale GLB would be fetched by the in-page renderer
                self.remove_attr("src");
                SourceLoad::Ready
            }
            ArViewer::SceneViewer | ArViewer::Generic => SourceLoad::Pending,
        }
    }

    fn set_ar_enabled(&mut self, enabled: bool) {
        if enabled {
            self.set_attr("ar", "");
            self.set_attr("ar-modes", "scene-viewer quick-look webxr");
        } else {
            self.remove_attr("ar");
        }
    }

    fn set_placement_scale(&mut self, scale: Vec3) {
        self.set_attr("scale", &scale.to_string());
    }

    fn activate_ar(&mut self) -> Result<(), ArActivationError> {
        let activate = Reflect::get(&self.element, &JsValue::from_str("activateAR"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| {
                ArActivationError::ActivationFailed("activateAR is not available".to_string())
            })?;
        let result = activate
            .call0(&self.element)
            .map_err(|e| ArActivationError::ActivationFailed(js_error_text(&e)))?;
        self.pending_activation = result.dyn_into::<Promise>().ok();
        Ok(())
    }

    fn prefetch(&mut self, uri: &str) {
        let link = match self.document.create_element("link") {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!("Prefetch link not created: {}", js_error_text(&e));
                return;
            }
        };
        let attached = link
            .set_attribute("rel", "prefetch")
            .and_then(|()| link.set_attribute("as", "fetch"))
            .and_then(|()| link.set_attribute("href", uri))
            .and_then(|()| match self.document.head() {
                Some(head) => head.append_child(&link).map(|_| ()),
                None => Err(JsValue::from_str("document has no head")),
            });
        match attached {
            Ok(()) => tracing::debug!(%uri, "Prefetch queued"),
            Err(e) => tracing::debug!(%uri, "Prefetch skipped: {}", js_error_text(&e)),
        }
    }
}

//! `getUserMedia` camera with a hidden video sink.

use ar_core::{Camera, CameraConstraints, CameraError, CameraStream, FrameBuffer};
use async_trait::async_trait;
use js_sys::{Object, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    CanvasRenderingContext2d, Document, HtmlCanvasElement, HtmlVideoElement, MediaStream,
    MediaStreamConstraints, MediaStreamTrack,
};

use crate::error::{js_error_message, js_error_name};

/// `HTMLMediaElement.HAVE_ENOUGH_DATA`
const HAVE_ENOUGH_DATA: u16 = 4;

/// Rear-camera source backed by `navigator.mediaDevices`.
#[derive(Debug, Clone)]
pub struct WebCamera {
    document: Document,
}

impl WebCamera {
    /// Create a camera that attaches its sinks to `document`.
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn video_constraints(constraints: &CameraConstraints) -> Result<JsValue, JsValue> {
        let ideal = |value: u32| -> Result<Object, JsValue> {
            let obj = Object::new();
            Reflect::set(&obj, &"ideal".into(), &JsValue::from(value))?;
            Ok(obj)
        };
        let video = Object::new();
        Reflect::set(
            &video,
            &"facingMode".into(),
            &constraints.facing_mode.as_str().into(),
        )?;
        Reflect::set(&video, &"width".into(), &ideal(constraints.ideal_width)?.into())?;
        Reflect::set(&video, &"height".into(), &ideal(constraints.ideal_height)?.into())?;
        Ok(video.into())
    }

    async fn acquire(&self, constraints: &CameraConstraints) -> Result<MediaStream, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window object"))?;
        let devices = window.navigator().media_devices()?;

        let request = MediaStreamConstraints::new();
        request.set_audio(&JsValue::FALSE);
        request.set_video(&Self::video_constraints(constraints)?);

        let stream = JsFuture::from(devices.get_user_media_with_constraints(&request)?).await?;
        stream.dyn_into::<MediaStream>()
    }

    fn attach_sink(&self, stream: &MediaStream) -> Result<HtmlVideoElement, JsValue> {
        let video = self
            .document
            .create_element("video")?
            .dyn_into::<HtmlVideoElement>()?;
        // iOS refuses inline playback without these
        video.set_attribute("playsinline", "true")?;
        video.set_attribute("aria-hidden", "true")?;
        video.set_muted(true);
        video.set_autoplay(true);
        video.style().set_property("display", "none")?;
        video.set_src_object(Some(stream));
        if let Some(body) = self.document.body() {
            body.append_child(&video)?;
        }
        // play() may reject before the first frame; readiness is polled anyway
        let _ = video.play();
        Ok(video)
    }
}

#[async_trait(?Send)]
impl Camera for WebCamera {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        let stream = self.acquire(constraints).await.map_err(|e| {
            CameraError::from_dom_name(&js_error_name(&e), &js_error_message(&e))
        })?;

        match self.attach_sink(&stream) {
            Ok(video) => {
                tracing::info!("Camera stream attached to hidden video sink");
                Ok(Box::new(WebCameraStream::new(
                    stream,
                    video,
                    self.document.clone(),
                )))
            }
            Err(e) => {
                stop_tracks(&stream);
                Err(CameraError::Other(crate::error::js_error_text(&e)))
            }
        }
    }
}

/// An acquired stream and the scratch canvas used to read its frames.
pub struct WebCameraStream {
    stream: MediaStream,
    video: HtmlVideoElement,
    document: Document,
    canvas: Option<(HtmlCanvasElement, CanvasRenderingContext2d)>,
    stopped: bool,
}

impl WebCameraStream {
    fn new(stream: MediaStream, video: HtmlVideoElement, document: Document) -> Self {
        Self {
            stream,
            video,
            document,
            canvas: None,
            stopped: false,
        }
    }

    fn scratch_canvas(&mut self) -> Option<&(HtmlCanvasElement, CanvasRenderingContext2d)> {
        if self.canvas.is_none() {
            let canvas = self
                .document
                .create_element("canvas")
                .ok()?
                .dyn_into::<HtmlCanvasElement>()
                .ok()?;
            let ctx = canvas
                .get_context("2d")
                .ok()??
                .dyn_into::<CanvasRenderingContext2d>()
                .ok()?;
            self.canvas = Some((canvas, ctx));
        }
        self.canvas.as_ref()
    }
}

impl CameraStream for WebCameraStream {
    fn is_ready(&self) -> bool {
        !self.stopped && self.video.ready_state() >= HAVE_ENOUGH_DATA
    }

    fn snapshot(&mut self) -> Option<FrameBuffer> {
        let width = self.video.video_width();
        let height = self.video.video_height();
        if width == 0 || height == 0 {
            return None;
        }
        let video = self.video.clone();
        let (canvas, ctx) = self.scratch_canvas()?;
        if canvas.width() != width || canvas.height() != height {
            canvas.set_width(width);
            canvas.set_height(height);
        }
        ctx.draw_image_with_html_video_element(&video, 0.0, 0.0)
            .ok()?;
        let data = ctx
            .get_image_data(0.0, 0.0, f64::from(width), f64::from(height))
            .ok()?;
        match FrameBuffer::new(width, height, data.data().0) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {e}");
                None
            }
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        stop_tracks(&self.stream);
        self.video.set_src_object(None);
        self.video.remove();
        self.canvas = None;
        tracing::info!("Camera tracks stopped");
    }
}

impl Drop for WebCameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_tracks(stream: &MediaStream) {
    for track in stream.get_tracks().iter() {
        if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
            track.stop();
        }
    }
}

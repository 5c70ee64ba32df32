//! Adapter for the page-global `jsQR` decode function.

use ar_core::{FrameBuffer, Inversion, Point, QrDecoder, QrMatch, Quad};
use async_trait::async_trait;
use js_sys::{Array, Function, Object, Reflect, Uint8ClampedArray};
use wasm_bindgen::{JsCast, JsValue};

/// Calls `jsQR(data, width, height, { inversionAttempts })`.
///
/// The library is loaded by the page; this adapter looks it up on the global
/// object at each call so a late-loading script still works.
#[derive(Debug, Clone, Default)]
pub struct JsQrDecoder {
    global_name: String,
}

impl JsQrDecoder {
    /// Decoder bound to the global function `jsQR`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_global("jsQR")
    }

    /// Decoder bound to a differently named global function.
    #[must_use]
    pub fn with_global(name: &str) -> Self {
        Self {
            global_name: name.to_string(),
        }
    }

    /// Whether the decode function is currently present.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.function().is_some()
    }

    fn function(&self) -> Option<Function> {
        Reflect::get(&js_sys::global(), &JsValue::from_str(&self.global_name))
            .ok()?
            .dyn_into::<Function>()
            .ok()
    }

    fn call(
        &self,
        decode: &Function,
        frame: &FrameBuffer,
        inversion: Inversion,
    ) -> Result<JsValue, JsValue> {
        let options = Object::new();
        Reflect::set(
            &options,
            &"inversionAttempts".into(),
            &inversion.as_str().into(),
        )?;
        let args = Array::new();
        args.push(&Uint8ClampedArray::from(frame.pixels()));
        args.push(&JsValue::from(frame.width()));
        args.push(&JsValue::from(frame.height()));
        args.push(&options);
        decode.apply(&JsValue::NULL, &args)
    }
}

#[async_trait(?Send)]
impl QrDecoder for JsQrDecoder {
    async fn decode(&self, frame: &FrameBuffer, inversion: Inversion) -> Option<QrMatch> {
        let Some(decode) = self.function() else {
            tracing::warn!(name = %self.global_name, "QR decode function not loaded");
            return None;
        };
        let result = match self.call(&decode, frame, inversion) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!("Decoder threw: {e:?}");
                return None;
            }
        };
        if result.is_null() || result.is_undefined() {
            return None;
        }
        let text = Reflect::get(&result, &"data".into()).ok()?.as_string()?;
        let quad = Reflect::get(&result, &"location".into())
            .ok()
            .and_then(|location| parse_location(&location))
            .unwrap_or_default();
        Some(QrMatch { text, quad })
    }
}

fn parse_location(location: &JsValue) -> Option<Quad> {
    let corner = |name: &str| -> Option<Point> {
        let p = Reflect::get(location, &JsValue::from_str(name)).ok()?;
        let x = Reflect::get(&p, &"x".into()).ok()?.as_f64()?;
        let y = Reflect::get(&p, &"y".into()).ok()?.as_f64()?;
        #[allow(clippy::cast_possible_truncation)]
        Some(Point::new(x as f32, y as f32))
    };
    Some(Quad {
        top_left: corner("topLeftCorner")?,
        top_right: corner("topRightCorner")?,
        bottom_right: corner("bottomRightCorner")?,
        bottom_left: corner("bottomLeftCorner")?,
    })
}

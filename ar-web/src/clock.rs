//! Display-frame clock on `requestAnimationFrame` and `setTimeout`.

use std::time::Duration;

use ar_core::FrameClock;
use async_trait::async_trait;
use js_sys::{Function, Promise};
use wasm_bindgen_futures::JsFuture;
use web_sys::Window;

/// Frame clock driven by the browser's rendering loop.
#[derive(Debug, Clone)]
pub struct AnimationFrameClock {
    window: Window,
}

impl AnimationFrameClock {
    /// Create a clock bound to `window`.
    #[must_use]
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    async fn wait_for(&self, schedule: impl Fn(&Window, &Function)) {
        let window = self.window.clone();
        let promise = Promise::new(&mut |resolve, _reject| schedule(&window, &resolve));
        // the promise only ever resolves
        let _ = JsFuture::from(promise).await;
    }
}

#[async_trait(?Send)]
impl FrameClock for AnimationFrameClock {
    async fn next_frame(&self) {
        self.wait_for(|window, resolve| {
            if let Err(e) = window.request_animation_frame(resolve) {
                tracing::warn!("requestAnimationFrame failed: {e:?}");
                let _ = resolve.call0(&wasm_bindgen::JsValue::NULL);
            }
        })
        .await;
    }

    async fn sleep(&self, duration: Duration) {
        let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        self.wait_for(|window, resolve| {
            if let Err(e) =
                window.set_timeout_with_callback_and_timeout_and_arguments_0(resolve, millis)
            {
                tracing::warn!("setTimeout failed: {e:?}");
                let _ = resolve.call0(&wasm_bindgen::JsValue::NULL);
            }
        })
        .await;
    }

    fn now_millis(&self) -> u64 {
        performance_now(&self.window)
    }
}

/// Milliseconds since navigation start, or 0 without a `Performance` object.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn performance_now(window: &Window) -> u64 {
    window
        .performance()
        .map_or(0, |p| p.now().max(0.0) as u64)
}

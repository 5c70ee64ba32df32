//! WebAssembly bindings for ar-core.
//!
//! Exposes payload resolution and platform detection to plain JavaScript
//! pages that do not use the full web host.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::{ExperienceConfig, ModelResolver, PlatformFacts};

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[derive(Serialize)]
struct ResolutionJson<'a> {
    key: &'a str,
    display_name: &'a str,
    asset: &'a str,
    placement_scale: String,
    matched_by: crate::MatchKind,
}

/// Resolver instance for WASM.
#[wasm_bindgen]
pub struct WasmResolver {
    resolver: ModelResolver,
    platform: PlatformFacts,
}

#[wasm_bindgen]
impl WasmResolver {
    /// Create a resolver over the built-in catalog for `user_agent`.
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new(user_agent: &str) -> Self {
        Self {
            resolver: ModelResolver::default(),
            platform: PlatformFacts::from_user_agent(user_agent),
        }
    }

    /// Create a resolver from an experience configuration JSON.
    ///
    /// # Errors
    ///
    /// Returns an error string if the configuration is invalid.
    #[wasm_bindgen(js_name = fromConfigJson)]
    pub fn from_config_json(user_agent: &str, json: &str) -> Result<WasmResolver, String> {
        let config = ExperienceConfig::from_json(json).map_err(|e| e.to_string())?;
        let catalog = config.build_catalog().map_err(|e| e.to_string())?;
        Ok(Self {
            resolver: ModelResolver::new(catalog),
            platform: PlatformFacts::from_user_agent(user_agent),
        })
    }

    /// Resolve a QR payload to JSON describing the model and platform asset.
    #[wasm_bindgen(js_name = resolveJson)]
    #[must_use]
    pub fn resolve_json(&self, payload: Option<String>) -> String {
        let resolution = self.resolver.resolve_with_reason(payload.as_deref());
        let model = resolution.descriptor;
        let json = ResolutionJson {
            key: &model.key,
            display_name: &model.display_name,
            asset: model.asset_for(self.platform.ar_viewer),
            placement_scale: model.placement_scale.to_string(),
            matched_by: resolution.matched_by,
        };
        serde_json::to_string(&json).unwrap_or_default()
    }
}

/// Platform facts for WASM.
#[wasm_bindgen]
pub struct WasmPlatform {
    facts: PlatformFacts,
}

#[wasm_bindgen]
impl WasmPlatform {
    /// Detect the platform from a user-agent string.
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new(user_agent: &str) -> Self {
        Self {
            facts: PlatformFacts::from_user_agent(user_agent),
        }
    }

    /// All facts as JSON.
    #[wasm_bindgen(js_name = toJson)]
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.facts).unwrap_or_default()
    }

    /// Whether a native AR viewer is available.
    #[wasm_bindgen(js_name = supportsNativeAr)]
    #[must_use]
    pub fn supports_native_ar(&self) -> bool {
        self.facts.supports_native_ar()
    }

    /// Human-readable platform summary.
    #[must_use]
    pub fn summary(&self) -> String {
        self.facts.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

    #[test]
    fn resolve_json_uses_platform_asset() {
        let resolver = WasmResolver::new(IPHONE_UA);
        let json = resolver.resolve_json(Some("https://example.com/?code=3".into()));
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(value["key"], "MODEL_CHURCH_03");
        assert_eq!(value["asset"], "/assets/models/church-model-03.usdz");
        assert_eq!(value["matched_by"], "url_code_alias");
    }

    #[test]
    fn from_config_json_rejects_bad_config() {
        assert!(WasmResolver::from_config_json(IPHONE_UA, "{ nope").is_err());
    }

    #[test]
    fn platform_json_contains_viewer() {
        let platform = WasmPlatform::new(IPHONE_UA);
        assert!(platform.to_json().contains("\"ar_viewer\":\"quick_look\""));
        assert!(platform.supports_native_ar());
    }
}

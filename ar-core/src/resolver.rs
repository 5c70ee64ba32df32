//! Resolution of decoded QR text to a catalog model.
//!
//! Precedence, first hit wins:
//!
//! ```text
//! 1. exact key                         "MODEL_CHURCH_02"
//! 2. URL ?code= key, then ?code= alias  "https://x/?code=2"
//!    URL ?model= key                   "https://x/?model=MODEL_CHURCH_02"
//! 3. trimmed alias                     " 2 "
//! 4. case-insensitive substring        "...church_02..."
//! 5. default model
//! ```
//!
//! Legacy plain-text codes, numeric-only codes and URL-embedded codes are all
//! in circulation, so the order above must not change.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::{ModelCatalog, ModelDescriptor};

/// Which precedence rule produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Payload is exactly a catalog key.
    ExactKey,
    /// URL `code` parameter is a catalog key.
    UrlCodeKey,
    /// URL `code` parameter is a numeric alias.
    UrlCodeAlias,
    /// URL `model` parameter is a catalog key.
    UrlModelKey,
    /// Trimmed payload is a numeric alias.
    Alias,
    /// Payload contains a key or internal id.
    Substring,
    /// Nothing matched.
    Default,
}

/// A resolved model and the rule that selected it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    /// Selected descriptor.
    pub descriptor: &'a ModelDescriptor,
    /// Rule that matched.
    pub matched_by: MatchKind,
}

impl<'a> Resolution<'a> {
    const fn new(descriptor: &'a ModelDescriptor, matched_by: MatchKind) -> Self {
        Self {
            descriptor,
            matched_by,
        }
    }
}

/// Maps QR payloads to catalog entries. Never fails.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    catalog: ModelCatalog,
}

impl ModelResolver {
    /// Create a resolver over a catalog.
    #[must_use]
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    /// The underlying catalog.
    #[must_use]
    pub const fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Resolve a payload to a descriptor; `None` and `""` give the default.
    #[must_use]
    pub fn resolve(&self, payload: Option<&str>) -> &ModelDescriptor {
        self.resolve_with_reason(payload).descriptor
    }

    /// Resolve a payload and report which rule matched.
    #[must_use]
    pub fn resolve_with_reason(&self, payload: Option<&str>) -> Resolution<'_> {
        let resolution = self.match_payload(payload);
        tracing::debug!(
            payload = payload.unwrap_or_default(),
            key = %resolution.descriptor.key,
            matched_by = ?resolution.matched_by,
            "Resolved QR payload"
        );
        resolution
    }

    fn match_payload(&self, payload: Option<&str>) -> Resolution<'_> {
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            return Resolution::new(self.catalog.default_model(), MatchKind::Default);
        };

        if let Some(m) = self.catalog.get(payload) {
            return Resolution::new(m, MatchKind::ExactKey);
        }

        if let Some(resolution) = self.match_url(payload) {
            return resolution;
        }

        if let Some(m) = self.catalog.by_alias(payload.trim()) {
            return Resolution::new(m, MatchKind::Alias);
        }

        let lower = payload.to_lowercase();
        if let Some(m) = self.catalog.all().find(|m| {
            lower.contains(&m.key.to_lowercase()) || lower.contains(&m.id.to_lowercase())
        }) {
            return Resolution::new(m, MatchKind::Substring);
        }

        tracing::info!(payload, "No model matched QR payload, using default");
        Resolution::new(self.catalog.default_model(), MatchKind::Default)
    }

    fn match_url(&self, payload: &str) -> Option<Resolution<'_>> {
        let url = Url::parse(payload).ok()?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(code) = param("code") {
            if let Some(m) = self.catalog.get(&code) {
                return Some(Resolution::new(m, MatchKind::UrlCodeKey));
            }
            if let Some(m) = self.catalog.by_alias(&code) {
                return Some(Resolution::new(m, MatchKind::UrlCodeAlias));
            }
        }

        param("model")
            .and_then(|model| self.catalog.get(&model))
            .map(|m| Resolution::new(m, MatchKind::UrlModelKey))
    }
}

impl Default for ModelResolver {
    fn default() -> Self {
        Self::new(ModelCatalog::builtin())
    }
}

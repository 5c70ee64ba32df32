//! One-shot inspection commands.

use ar_core::{
    decode_data_uri, ArViewer, CatalogConfig, ExperienceFlags, MatchKind, ModelCatalog,
    ModelResolver, PersistedQrRecord, PlatformFacts, SessionStore,
};
use serde::Serialize;

/// Result of `resolve`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveReport {
    /// The payload as given.
    pub payload: Option<String>,
    /// Selected catalog key.
    pub key: String,
    /// Name shown to the user.
    pub display_name: String,
    /// Rule that matched.
    pub matched_by: MatchKind,
    /// Native viewer for the user agent.
    pub viewer: ArViewer,
    /// The only asset that platform would fetch.
    pub asset: String,
    /// Placement scale attribute.
    pub placement_scale: String,
}

/// Resolve `payload` against `catalog` for the platform of `user_agent`.
#[must_use]
pub fn resolve(catalog: ModelCatalog, payload: Option<&str>, user_agent: &str) -> ResolveReport {
    let viewer = PlatformFacts::from_user_agent(user_agent).ar_viewer;
    let resolver = ModelResolver::new(catalog);
    let resolution = resolver.resolve_with_reason(payload);
    let model = resolution.descriptor;
    tracing::debug!(key = %model.key, matched_by = ?resolution.matched_by, "Resolved");
    ResolveReport {
        payload: payload.map(str::to_string),
        key: model.key.clone(),
        display_name: model.display_name.clone(),
        matched_by: resolution.matched_by,
        viewer,
        asset: model.asset_for(viewer).to_string(),
        placement_scale: model.placement_scale.to_string(),
    }
}

/// Result of `platform`.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformReport {
    /// Raw detection flags.
    pub facts: PlatformFacts,
    /// Human-readable one-liner.
    pub summary: String,
    /// Whether a native AR viewer exists.
    pub supports_native_ar: bool,
    /// Host app of an in-app browser.
    pub in_app_host: Option<&'static str>,
    /// iOS major version, 0 when not iOS.
    pub ios_major_version: u32,
    /// Chrome major version, 0 when not Chrome.
    pub chrome_major_version: u32,
    /// Android version, 0.0 when not Android.
    pub android_version: f32,
    /// Whether Chrome is new enough for Scene Viewer.
    pub chrome_sufficient: bool,
    /// Whether Android is new enough for Scene Viewer.
    pub android_sufficient: bool,
    /// Platform AR guide image.
    pub guide_image: Option<&'static str>,
}

/// Platform facts for `user_agent`.
#[must_use]
pub fn platform(user_agent: &str) -> PlatformReport {
    let facts = PlatformFacts::from_user_agent(user_agent);
    PlatformReport {
        summary: facts.summary(),
        supports_native_ar: facts.supports_native_ar(),
        in_app_host: facts.in_app_host(),
        ios_major_version: facts.ios_major_version(),
        chrome_major_version: facts.chrome_major_version(),
        android_version: facts.android_version(),
        chrome_sufficient: facts.is_chrome_sufficient(),
        android_sufficient: facts.is_android_version_sufficient(),
        guide_image: facts.guide_image_path(),
        facts,
    }
}

/// The catalog in its serializable form.
#[must_use]
pub fn catalog(catalog: &ModelCatalog) -> CatalogConfig {
    catalog.to_config()
}

/// Decoded form of a stored photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoInfo {
    /// MIME type from the data URI.
    pub mime: String,
    /// Decoded byte count.
    pub bytes: usize,
}

/// Result of `session show`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// The saved QR record, if any.
    pub record: Option<PersistedQrRecord>,
    /// Stored photo details, when requested.
    pub photo: Option<PhotoInfo>,
    /// Onboarding completed.
    pub onboarding_seen: bool,
    /// AR guide shown.
    pub ar_guide_shown: bool,
}

/// Read the saved record and flags without consuming anything.
///
/// # Errors
///
/// Returns an error if storage cannot be read or the stored photo is not a
/// valid data URI.
pub fn session_show(
    store: &SessionStore,
    flags: &ExperienceFlags,
    decode_photo: bool,
) -> anyhow::Result<SessionReport> {
    let record = store.load()?;
    let photo = match record.as_ref().and_then(|r| r.photo.as_deref()) {
        Some(uri) if decode_photo => {
            let (mime, bytes) = decode_data_uri(uri)?;
            Some(PhotoInfo {
                mime,
                bytes: bytes.len(),
            })
        }
        _ => None,
    };
    Ok(SessionReport {
        record,
        photo,
        onboarding_seen: flags.onboarding_seen(),
        ar_guide_shown: flags.ar_guide_shown(),
    })
}

/// Remove the saved record, and the flags when `reset_flags` is set.
///
/// # Errors
///
/// Returns an error if storage cannot be written.
pub fn session_clear(
    store: &SessionStore,
    flags: &ExperienceFlags,
    reset_flags: bool,
) -> anyhow::Result<String> {
    let had_record = store.load()?.is_some();
    store.clear()?;
    if reset_flags {
        flags.reset()?;
    }
    tracing::info!(had_record, reset_flags, "Session cleared");
    Ok(match (had_record, reset_flags) {
        (true, true) => "Cleared QR record and flags".to_string(),
        (true, false) => "Cleared QR record".to_string(),
        (false, true) => "No QR record; flags reset".to_string(),
        (false, false) => "No QR record".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

    #[test]
    fn resolve_reports_ios_asset() {
        let report = resolve(ModelCatalog::builtin(), Some("2"), IPHONE_UA);
        assert_eq!(report.key, "MODEL_CHURCH_02");
        assert_eq!(report.matched_by, MatchKind::Alias);
        assert_eq!(report.viewer, ArViewer::QuickLook);
        assert!(report.asset.ends_with(".usdz"));
    }

    #[test]
    fn resolve_without_payload_uses_default() {
        let report = resolve(ModelCatalog::builtin(), None, "");
        assert_eq!(report.key, "MODEL_CHURCH_01");
        assert_eq!(report.matched_by, MatchKind::Default);
        assert_eq!(report.viewer, ArViewer::Generic);
    }

    #[test]
    fn platform_report_for_iphone() {
        let report = platform(IPHONE_UA);
        assert!(report.supports_native_ar);
        assert_eq!(report.ios_major_version, 17);
        assert!(report.in_app_host.is_none());
    }

    #[test]
    fn catalog_lists_models_in_order() {
        let config = catalog(&ModelCatalog::builtin());
        let keys: Vec<_> = config.models.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["MODEL_CHURCH_01", "MODEL_CHURCH_02", "MODEL_CHURCH_03"]);
    }
}

//! Platform facts derived from the browser user-agent.
//!
//! Everything here is computed once per page load and never changes. The
//! scan and viewer components only consume the boolean facts and the
//! [`ArViewer`] choice; the remaining helpers feed guidance screens.

use serde::{Deserialize, Serialize};

/// Minimum Chrome major version that hands off to Scene Viewer.
pub const MIN_SCENE_VIEWER_CHROME: u32 = 90;

/// Minimum Android version (Nougat, API 24) with Scene Viewer support.
pub const MIN_SCENE_VIEWER_ANDROID: f32 = 7.0;

/// In-app browser tokens and the host app they belong to.
const IN_APP_TOKENS: [(&str, &str); 5] = [
    ("kakaotalk", "KakaoTalk"),
    ("instagram", "Instagram"),
    ("fban", "Facebook"),
    ("fbav", "Facebook"),
    ("line/", "LINE"),
];

/// The native AR presentation surface for a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArViewer {
    /// AR Quick Look (iOS, USDZ assets).
    QuickLook,
    /// Scene Viewer (Android, GLB assets).
    SceneViewer,
    /// No known native viewer.
    Generic,
}

impl ArViewer {
    /// User-facing name of the viewer.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::QuickLook => "AR Quick Look",
            Self::SceneViewer => "Scene Viewer",
            Self::Generic => "AR Viewer",
        }
    }
}

impl std::fmt::Display for ArViewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Immutable facts about the running browser and OS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PlatformFacts {
    /// iPhone, iPad or iPod.
    pub is_ios: bool,
    /// Any Android device.
    pub is_android: bool,
    /// Embedded webview of another app (KakaoTalk, Instagram, ...).
    pub is_in_app_browser: bool,
    /// Chrome proper (not Edge, not a webview).
    pub is_chrome: bool,
    /// Safari proper.
    pub is_safari: bool,
    /// Firefox.
    pub is_firefox: bool,
    /// Any mobile browser.
    pub is_mobile: bool,
    /// Native AR viewer for this platform.
    pub ar_viewer: ArViewer,
    user_agent: String,
}

impl PlatformFacts {
    /// Derive platform facts from a user-agent string.
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();

        let is_android = ua.contains("android");
        let is_ios = ["iphone", "ipad", "ipod"].iter().any(|t| ua.contains(t));
        let is_in_app_browser = detect_webview(&ua, is_android, is_ios);

        let ar_viewer = if is_ios {
            ArViewer::QuickLook
        } else if is_android {
            ArViewer::SceneViewer
        } else {
            ArViewer::Generic
        };

        Self {
            is_ios,
            is_android,
            is_in_app_browser,
            is_chrome: ua.contains("chrome") && !ua.contains("edge") && !is_in_app_browser,
            is_safari: ua.contains("safari") && !ua.contains("chrome"),
            is_firefox: ua.contains("firefox"),
            is_mobile: [
                "android",
                "webos",
                "iphone",
                "ipad",
                "ipod",
                "blackberry",
                "iemobile",
                "opera mini",
            ]
            .iter()
            .any(|t| ua.contains(t)),
            ar_viewer,
            user_agent: user_agent.to_string(),
        }
    }

    /// The user-agent these facts were derived from.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Whether AR Quick Look or Scene Viewer can be used at all.
    #[must_use]
    pub const fn supports_native_ar(&self) -> bool {
        self.is_ios || self.is_android
    }

    /// Name of the app hosting the in-app browser, if recognisable.
    #[must_use]
    pub fn in_app_host(&self) -> Option<&'static str> {
        if !self.is_in_app_browser {
            return None;
        }
        let ua = self.user_agent.to_lowercase();
        IN_APP_TOKENS
            .iter()
            .find(|(token, _)| ua.contains(token))
            .map(|(_, name)| *name)
    }

    /// iOS major version (`OS 17_2` → 17), 0 when unknown.
    #[must_use]
    pub fn ios_major_version(&self) -> u32 {
        self.user_agent
            .split("OS ")
            .skip(1)
            .find_map(|rest| {
                let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
                let after = rest[digits.len()..].chars().next();
                (after == Some('_')).then(|| digits.parse().ok()).flatten()
            })
            .unwrap_or(0)
    }

    /// Chrome major version, 0 when not Chrome.
    #[must_use]
    pub fn chrome_major_version(&self) -> u32 {
        let ua = self.user_agent.to_lowercase();
        ua.split_once("chrome/")
            .map(|(_, rest)| leading_digits(rest))
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0)
    }

    /// Android version as `major.minor`, 0.0 when not Android.
    #[must_use]
    pub fn android_version(&self) -> f32 {
        if !self.is_android {
            return 0.0;
        }
        let ua = self.user_agent.to_lowercase();
        let Some((_, rest)) = ua.split_once("android") else {
            return 0.0;
        };
        let version: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        // "7.1.2" reads as 7.1
        let mut parts = version.split('.');
        let major = parts.next().unwrap_or_default();
        let minor = parts.next().unwrap_or_default();
        let joined = if minor.is_empty() {
            major.to_string()
        } else {
            format!("{major}.{minor}")
        };
        joined.parse().unwrap_or(0.0)
    }

    /// Chrome is new enough to hand off to Scene Viewer.
    #[must_use]
    pub fn is_chrome_sufficient(&self) -> bool {
        self.is_chrome && self.chrome_major_version() >= MIN_SCENE_VIEWER_CHROME
    }

    /// Android is new enough for Scene Viewer.
    #[must_use]
    pub fn is_android_version_sufficient(&self) -> bool {
        self.android_version() >= MIN_SCENE_VIEWER_ANDROID
    }

    /// Path of the platform-specific AR guide image.
    #[must_use]
    pub const fn guide_image_path(&self) -> Option<&'static str> {
        match self.ar_viewer {
            ArViewer::QuickLook => Some("assets/images/ios-ar-guide.png"),
            ArViewer::SceneViewer => Some("assets/images/android-ar-guide.png"),
            ArViewer::Generic => None,
        }
    }

    /// Short summary such as `"Android Chrome (Mobile)"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let parts = [
            (self.is_android, "Android"),
            (self.is_ios, "iOS"),
            (self.is_chrome, "Chrome"),
            (self.is_safari, "Safari"),
            (self.is_firefox, "Firefox"),
            (self.is_mobile, "(Mobile)"),
        ];
        let info: Vec<&str> = parts
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        if info.is_empty() {
            "Desktop".to_string()
        } else {
            info.join(" ")
        }
    }
}

fn leading_digits(s: &str) -> String {
    s.chars().take_while(char::is_ascii_digit).collect()
}

fn detect_webview(ua: &str, is_android: bool, is_ios: bool) -> bool {
    let has_app_token = IN_APP_TOKENS.iter().any(|(token, _)| ua.contains(token));

    if is_android {
        // Lollipop+ webviews carry a `wv` token
        if ua.contains("; wv)") || ua.contains(" wv ") {
            return true;
        }
        // Older webviews: `Version/x.y` next to `Chrome/n`
        if has_version_token(ua) && ua.contains("chrome/") {
            return true;
        }
        if has_app_token {
            return true;
        }
    }

    if is_ios && (!ua.contains("safari") || has_app_token) {
        return true;
    }

    false
}

fn has_version_token(ua: &str) -> bool {
    ua.match_indices("version/").any(|(idx, m)| {
        let rest = &ua[idx + m.len()..];
        let major = leading_digits(rest);
        !major.is_empty()
            && rest[major.len()..]
                .strip_prefix('.')
                .is_some_and(|minor| minor.starts_with(|c: char| c.is_ascii_digit()))
    })
}

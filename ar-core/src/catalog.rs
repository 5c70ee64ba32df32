//! Static catalog of 3D models that a QR code can select.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::platform::ArViewer;

/// AR placement scale, written `"x y z"` in viewer attributes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Vec3 {
    /// X scale.
    pub x: f32,
    /// Y scale.
    pub y: f32,
    /// Z scale.
    pub z: f32,
}

impl Vec3 {
    /// Uniform scale on all axes.
    #[must_use]
    pub const fn uniform(s: f32) -> Self {
        Self { x: s, y: s, z: s }
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl FromStr for Vec3 {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f32> = s
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| ConfigError::Invalid(format!("bad scale {s:?}: {e}")))?;
        match parts.as_slice() {
            [x, y, z] => Ok(Self { x: *x, y: *y, z: *z }),
            _ => Err(ConfigError::Invalid(format!(
                "scale {s:?} must have three components"
            ))),
        }
    }
}

impl TryFrom<String> for Vec3 {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Vec3> for String {
    fn from(v: Vec3) -> Self {
        v.to_string()
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// One loadable 3D asset and its AR placement metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique catalog key, e.g. `MODEL_CHURCH_01`.
    pub key: String,
    /// Short internal id, also matched as a substring.
    pub id: String,
    /// Name shown to the user.
    pub display_name: String,
    /// One-line description shown in the model toast.
    pub description: String,
    /// GLB asset for Scene Viewer and in-page rendering.
    pub asset_for_android: String,
    /// USDZ asset for AR Quick Look.
    pub asset_for_ios: String,
    /// Placement scale handed to the viewer.
    #[serde(default)]
    pub placement_scale: Vec3,
    /// Whether the asset is prefetched in the background.
    #[serde(default = "default_preload")]
    pub preload: bool,
}

const fn default_preload() -> bool {
    true
}

impl ModelDescriptor {
    /// The asset variant relevant to a viewer. Only this one is ever fetched.
    #[must_use]
    pub fn asset_for(&self, viewer: ArViewer) -> &str {
        match viewer {
            ArViewer::QuickLook => &self.asset_for_ios,
            ArViewer::SceneViewer | ArViewer::Generic => &self.asset_for_android,
        }
    }
}

/// Serializable catalog definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Models in resolution order.
    pub models: Vec<ModelDescriptor>,
    /// Key used when nothing matches.
    pub default_key: String,
    /// Short codes (`"1"`, `"2"`, ...) mapped to keys, in order.
    #[serde(default)]
    pub numeric_aliases: Vec<(String, String)>,
}

/// Ordered, immutable model catalog.
///
/// Insertion order matters: it is the tie-break for substring matching.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
    default_index: usize,
    numeric_aliases: Vec<(String, usize)>,
}

impl ModelCatalog {
    /// Build a catalog, validating keys, default and aliases.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the catalog is empty, keys repeat,
    /// or the default key or an alias target is unknown.
    pub fn from_config(config: CatalogConfig) -> Result<Self, ConfigError> {
        let CatalogConfig {
            models,
            default_key,
            numeric_aliases,
        } = config;

        if models.is_empty() {
            return Err(ConfigError::Invalid("catalog has no models".into()));
        }
        for (i, model) in models.iter().enumerate() {
            if models[..i].iter().any(|m| m.key == model.key) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate model key {}",
                    model.key
                )));
            }
        }

        let index_of = |key: &str| models.iter().position(|m| m.key == key);
        let default_index = index_of(&default_key)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown default key {default_key}")))?;
        let numeric_aliases = numeric_aliases
            .into_iter()
            .map(|(code, key)| {
                index_of(&key)
                    .map(|idx| (code, idx))
                    .ok_or_else(|| ConfigError::Invalid(format!("alias targets unknown key {key}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            models,
            default_index,
            numeric_aliases,
        })
    }

    /// The three church models shipped with the experience.
    #[must_use]
    pub fn builtin() -> Self {
        let church = |n: u8, usdz: &str, scale: f32| ModelDescriptor {
            key: format!("MODEL_CHURCH_{n:02}"),
            id: format!("church_{n:02}"),
            display_name: format!("온누리 교회 {n:02}"),
            description: format!("온누리 교회 40주년 기념 모델 {n}"),
            asset_for_android: format!("/assets/models/church-model-{n:02}.glb"),
            asset_for_ios: format!("/assets/models/{usdz}"),
            placement_scale: Vec3::uniform(scale),
            preload: true,
        };
        let models = vec![
            church(1, "church-model-01-rescale.usdz", 0.3),
            church(2, "church-model-02.usdz", 1.0),
            church(3, "church-model-03.usdz", 1.0),
        ];
        let numeric_aliases = models
            .iter()
            .enumerate()
            .map(|(i, _)| ((i + 1).to_string(), i))
            .collect();
        Self {
            models,
            default_index: 0,
            numeric_aliases,
        }
    }

    /// Look up a descriptor by exact key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.key == key)
    }

    /// Look up a descriptor through the numeric alias table.
    #[must_use]
    pub fn by_alias(&self, code: &str) -> Option<&ModelDescriptor> {
        self.numeric_aliases
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, idx)| &self.models[*idx])
    }

    /// The fallback descriptor.
    #[must_use]
    pub fn default_model(&self) -> &ModelDescriptor {
        &self.models[self.default_index]
    }

    /// All descriptors in catalog order.
    pub fn all(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    /// Descriptors flagged for background prefetch.
    pub fn preload_models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter().filter(|m| m.preload)
    }

    /// Number of models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Always false; a catalog cannot be built empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Serializable form of this catalog.
    #[must_use]
    pub fn to_config(&self) -> CatalogConfig {
        CatalogConfig {
            models: self.models.clone(),
            default_key: self.default_model().key.clone(),
            numeric_aliases: self
                .numeric_aliases
                .iter()
                .map(|(code, idx)| (code.clone(), self.models[*idx].key.clone()))
                .collect(),
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

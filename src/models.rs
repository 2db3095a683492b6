use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::imaging::EncodedImage;

/// Reference style set, in display order.
pub const DEFAULT_STYLES: [&str; 5] = [
    "Maximalist Bohemian",
    "Luxury Art Deco",
    "Modern Farmhouse",
    "European Classic",
    "Contemporary Organic",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleOption(String);

impl StyleOption {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    pub fn name(&self) -> &str { &self.0 }

    /// `Modern Farmhouse` -> `modern-farmhouse`, used for repository paths.
    pub fn slug(&self) -> String {
        self.0.split_whitespace().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("-")
    }

    /// `Modern Farmhouse` -> `Lumina-Modern-Farmhouse`, used for downloads.
    pub fn download_stem(&self) -> String {
        format!("Lumina-{}", self.hyphenated())
    }

    /// Download name from the editor: `Lumina-Edit-Modern-Farmhouse`.
    pub fn edit_download_stem(&self) -> String {
        format!("Lumina-Edit-{}", self.hyphenated())
    }

    fn hyphenated(&self) -> String {
        self.0.split_whitespace().collect::<Vec<_>>().join("-")
    }

    pub fn defaults() -> Vec<StyleOption> {
        DEFAULT_STYLES.iter().map(|s| StyleOption::new(*s)).collect()
    }
}

impl fmt::Display for StyleOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DesignIntensity {
    Subtle,
    #[default]
    Balanced,
    Bold,
}

impl DesignIntensity {
    pub const ALL: [DesignIntensity; 3] = [DesignIntensity::Subtle, DesignIntensity::Balanced, DesignIntensity::Bold];

    pub fn as_str(self) -> &'static str {
        match self {
            DesignIntensity::Subtle => "Subtle",
            DesignIntensity::Balanced => "Balanced",
            DesignIntensity::Bold => "Bold",
        }
    }
}

impl fmt::Display for DesignIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Identifier of a design within a session: `design-<batch>-<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignId(String);

impl DesignId {
    pub fn new(batch: u64, index: usize) -> Self { Self(format!("design-{batch}-{index}")) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<String> for DesignId {
    fn from(value: String) -> Self { Self(value) }
}

impl fmt::Display for DesignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignResult {
    pub id: DesignId,
    pub style: StyleOption,
    pub image: EncodedImage,
    pub updated_at: DateTime<Utc>,
}

impl DesignResult {
    pub fn new(id: DesignId, style: StyleOption, image: EncodedImage) -> Self {
        Self { id, style, image, updated_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppPhase {
    #[default]
    Idle,
    GeneratingInitial,
    SelectingDesign,
    EditingDesign,
    UpdatingDesign,
}

impl fmt::Display for AppPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppPhase::Idle => "idle",
            AppPhase::GeneratingInitial => "generating designs",
            AppPhase::SelectingDesign => "selecting a design",
            AppPhase::EditingDesign => "editing a design",
            AppPhase::UpdatingDesign => "updating a design",
        };
        f.write_str(label)
    }
}

// --- Request bodies ---

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitPhotoRequest {
    /// Data URI or bare base64.
    pub image: String,
    #[serde(default)]
    pub intensity: DesignIntensity,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectDesignRequest {
    pub design_id: DesignId,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EditDesignRequest {
    pub instruction: String,
}

/// Omitted fields fall back to the session's cached credentials and the usual defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct UploadDesignRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// --- Responses ---

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub phase: AppPhase,
    pub intensity: Option<DesignIntensity>,
    pub designs: Vec<DesignResult>,
    pub active_design_id: Option<DesignId>,
    pub error: Option<String>,
    pub styles_total: usize,
    pub has_credentials: bool,
    pub generating: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StylesResponse {
    pub styles: Vec<StyleOption>,
    pub intensities: Vec<DesignIntensity>,
}

//! Editor configuration
//!
//! All tunables of the extraction/rebuild/overlay pipeline, loadable from TOML.
//! Every section and field is optional; missing values take the defaults below.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub canvas: CanvasConfig,
    pub rebuild: RebuildConfig,
    pub edit: EditConfig,
    pub overlay: OverlayConfig,
}

impl EditorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse editor configuration")
    }
}

/// Editor canvas used when laying out extracted pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Pages wider than this are scaled down to fit (default: 800)
    pub width: f64,
    /// Canvas assumed for markup that does not record its own (default: 800 x 1000)
    pub legacy_width: f64,
    pub legacy_height: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            legacy_width: 800.0,
            legacy_height: 1000.0,
        }
    }
}

/// Markup-to-PDF reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    /// Target page size in points (default: A4, 595 x 842)
    pub page_width: f64,
    pub page_height: f64,
    /// Distance kept from the right and bottom edges (default: 50)
    pub clamp_margin: f64,
    pub font_size: f64,
    /// Where elements without usable coordinates are stacked
    pub sequential_x: f64,
    pub sequential_y: f64,
    pub line_advance: f64,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            clamp_margin: 50.0,
            font_size: 10.0,
            sequential_x: 50.0,
            sequential_y: 50.0,
            line_advance: 15.0,
        }
    }
}

/// In-place text replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    pub font_size: f64,
    pub font: String,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            font: "Helvetica".to_string(),
        }
    }
}

/// Watermark and signature composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Gray level of watermark text (0 = black, 1 = white)
    pub text_gray: f64,
    /// Font size as a fraction of the overlay rectangle height
    pub text_height_ratio: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            text_gray: 0.5,
            text_height_ratio: 0.8,
        }
    }
}

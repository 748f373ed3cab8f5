//! Global rendering style per representation type.
//!
//! Styles apply uniformly to every representation of a type unless a segment
//! carries its own override (see the highlight animator). The whole config
//! round-trips through TOML; partial files fill the rest with defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::RepresentationType;
use crate::error::SegmentationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepresentationStyle {
    pub render_fill: bool,
    pub fill_alpha: f32,
    pub fill_alpha_inactive: f32,
    pub render_outline: bool,
    /// Pixels
    pub outline_width_active: f32,
    pub outline_opacity: f32,
    pub outline_opacity_inactive: f32,
    pub render_inactive_segmentations: bool,
}

impl Default for RepresentationStyle {
    fn default() -> Self {
        Self {
            render_fill: true,
            fill_alpha: 0.5,
            fill_alpha_inactive: 0.4,
            render_outline: true,
            outline_width_active: 3.0,
            outline_opacity: 1.0,
            outline_opacity_inactive: 0.85,
            render_inactive_segmentations: true,
        }
    }
}

/// A single style field assignment. Alpha and opacity values may be given as
/// fractions or as percentages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StyleValue {
    RenderFill(bool),
    FillAlpha(f32),
    FillAlphaInactive(f32),
    RenderOutline(bool),
    OutlineWidthActive(f32),
    OutlineOpacity(f32),
    OutlineOpacityInactive(f32),
    RenderInactiveSegmentations(bool),
}

impl RepresentationStyle {
    pub fn apply(&mut self, value: StyleValue) -> Result<(), SegmentationError> {
        match value {
            StyleValue::RenderFill(on) => self.render_fill = on,
            StyleValue::FillAlpha(v) => self.fill_alpha = normalize_fraction(v)?,
            StyleValue::FillAlphaInactive(v) => self.fill_alpha_inactive = normalize_fraction(v)?,
            StyleValue::RenderOutline(on) => self.render_outline = on,
            StyleValue::OutlineWidthActive(width) => {
                if !width.is_finite() || width < 0.0 {
                    return Err(SegmentationError::InvalidArgument(format!(
                        "outline width must be a non-negative number, got {width}"
                    )));
                }
                self.outline_width_active = width;
            }
            StyleValue::OutlineOpacity(v) => self.outline_opacity = normalize_fraction(v)?,
            StyleValue::OutlineOpacityInactive(v) => {
                self.outline_opacity_inactive = normalize_fraction(v)?
            }
            StyleValue::RenderInactiveSegmentations(on) => self.render_inactive_segmentations = on,
        }
        Ok(())
    }
}

/// Values above 1 are read as percentages. 1 itself is a fraction.
pub fn normalize_fraction(value: f32) -> Result<f32, SegmentationError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(SegmentationError::InvalidArgument(format!(
            "expected a fraction in [0, 1] or a percentage in [0, 100], got {value}"
        )));
    }
    let fraction = if value > 1.0 { value / 100.0 } else { value };
    Ok(fraction.clamp(0.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub labelmap: RepresentationStyle,
    pub contour: RepresentationStyle,
}

impl SegmentationConfig {
    pub fn style(&self, representation_type: RepresentationType) -> &RepresentationStyle {
        match representation_type {
            RepresentationType::Labelmap => &self.labelmap,
            RepresentationType::Contour => &self.contour,
        }
    }

    pub fn style_mut(&mut self, representation_type: RepresentationType) -> &mut RepresentationStyle {
        match representation_type {
            RepresentationType::Labelmap => &mut self.labelmap,
            RepresentationType::Contour => &mut self.contour,
        }
    }

    /// Load from a TOML file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Owner of the active [`SegmentationConfig`]. Lives inside the store, which
/// pushes every change to the rendering engine.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationManager {
    config: SegmentationConfig,
}

impl ConfigurationManager {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn style(&self, representation_type: RepresentationType) -> &RepresentationStyle {
        self.config.style(representation_type)
    }

    /// Validate and store one value. Leaves the style untouched on error.
    pub fn set(
        &mut self,
        representation_type: RepresentationType,
        value: StyleValue,
    ) -> Result<RepresentationStyle, SegmentationError> {
        let mut style = *self.config.style(representation_type);
        style.apply(value)?;
        *self.config.style_mut(representation_type) = style;
        Ok(style)
    }

    pub fn replace(&mut self, config: SegmentationConfig) {
        self.config = config;
    }
}

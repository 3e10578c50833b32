//! JSON configuration for the mirror.
//!
//! Everything has a default, so an empty `{}` (or no file at all) runs the
//! camera with stock styles and no swatches. Region names and colors are
//! checked once here; the rest of the crate only sees typed values.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::{Result, TryOnError};
use crate::region::{AttributeRegionMap, Region};
use crate::render::BackendChoice;
use crate::style::{StyleOverride, StyleResolver};
use crate::tracker::TrackerOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Replay a still picture instead of opening a device.
    pub image: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { index: 0, width: 640, height: 480, fps: 30, image: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { width: 960, height: 720 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub stream_ms: u64,
    pub tracker_ready_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { stream_ms: 10_000, tracker_ready_ms: 15_000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecalConfig {
    pub eyelash: Option<String>,
    pub eyeliner: Option<String>,
}

/// One selectable product shade as stored in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwatchConfig {
    pub attribute: String,
    #[serde(default)]
    pub attribute_id: Option<u32>,
    pub name: String,
    pub color: String,
}

/// A swatch with its color parsed and its regions resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Swatch {
    pub name: String,
    pub color: Rgb,
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    pub camera: CameraConfig,
    pub window: WindowConfig,
    pub backend: BackendChoice,
    pub timeouts: Timeouts,
    pub styles: BTreeMap<String, StyleOverride>,
    pub product_opacity: BTreeMap<String, i64>,
    pub decals: DecalConfig,
    pub attributes: BTreeMap<String, String>,
    pub swatches: Vec<SwatchConfig>,
    pub landmarks: Option<PathBuf>,
}

/// The timing knobs a session needs, lifted out of the file format.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub stream_timeout: Duration,
    pub tracker_ready_timeout: Duration,
    pub tracker: TrackerOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let t = Timeouts::default();
        Self {
            stream_timeout: Duration::from_millis(t.stream_ms),
            tracker_ready_timeout: Duration::from_millis(t.tracker_ready_ms),
            tracker: TrackerOptions::default(),
        }
    }
}

fn region_key(key: &str) -> Result<Region> {
    Region::from_str(key).map_err(|e| TryOnError::Config(format!("{key:?}: {e}")))
}

impl TryOnConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: TryOnConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject anything that would only fail later, mid-session.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(TryOnError::Config("window size must be non-zero".into()));
        }
        if self.camera.fps == 0 {
            return Err(TryOnError::Config("camera fps must be non-zero".into()));
        }
        for key in self.styles.keys().chain(self.product_opacity.keys()) {
            region_key(key)?;
        }
        self.attribute_map()?;
        self.swatches()?;
        Ok(())
    }

    /// Widget styles plus product opacity, clamped on the way in.
    pub fn style_resolver(&self) -> Result<StyleResolver> {
        let mut widget = HashMap::new();
        for (key, o) in &self.styles {
            widget.insert(region_key(key)?, *o);
        }
        let mut product = HashMap::new();
        for (key, pct) in &self.product_opacity {
            product.insert(region_key(key)?, (*pct).clamp(0, 100) as u8);
        }
        Ok(StyleResolver::new(widget, product))
    }

    pub fn attribute_map(&self) -> Result<AttributeRegionMap> {
        AttributeRegionMap::from_entries(self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(|e| TryOnError::Config(format!("attributes: {e}")))
    }

    /// Swatches in file order. A swatch whose attribute maps to nothing is
    /// kept; picking it simply selects no region.
    pub fn swatches(&self) -> Result<Vec<Swatch>> {
        let map = self.attribute_map()?;
        self.swatches
            .iter()
            .map(|s| {
                let color = s
                    .color
                    .parse::<Rgb>()
                    .map_err(|e| TryOnError::Config(format!("swatch {:?}: {e}", s.name)))?;
                Ok(Swatch {
                    name: s.name.clone(),
                    color,
                    regions: map.lookup(s.attribute_id, &s.attribute).to_vec(),
                })
            })
            .collect()
    }

    pub fn decal_urls(&self) -> HashMap<Region, String> {
        let mut urls = HashMap::new();
        if let Some(u) = self.decals.eyelash.as_ref().filter(|u| !u.trim().is_empty()) {
            urls.insert(Region::Eyelash, u.trim().to_string());
        }
        if let Some(u) = self.decals.eyeliner.as_ref().filter(|u| !u.trim().is_empty()) {
            urls.insert(Region::Eyeliner, u.trim().to_string());
        }
        urls
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            stream_timeout: Duration::from_millis(self.timeouts.stream_ms),
            tracker_ready_timeout: Duration::from_millis(self.timeouts.tracker_ready_ms),
            tracker: TrackerOptions::default(),
        }
    }
}

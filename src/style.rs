//! Per-region opacity / feather / blend resolution.
//!
//! Precedence: built-in default < widget setting < product override.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    #[serde(alias = "source-over")]
    Normal,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    Darken,
    Lighten,
    Color,
    Hue,
    Saturation,
    Luminosity,
}

impl BlendMode {
    pub fn to_skia(self) -> tiny_skia::BlendMode {
        use tiny_skia::BlendMode as B;
        match self {
            BlendMode::Normal => B::SourceOver,
            BlendMode::Multiply => B::Multiply,
            BlendMode::Screen => B::Screen,
            BlendMode::Overlay => B::Overlay,
            BlendMode::SoftLight => B::SoftLight,
            BlendMode::HardLight => B::HardLight,
            BlendMode::Darken => B::Darken,
            BlendMode::Lighten => B::Lighten,
            BlendMode::Color => B::Color,
            BlendMode::Hue => B::Hue,
            BlendMode::Saturation => B::Saturation,
            BlendMode::Luminosity => B::Luminosity,
        }
    }
}

/// Fully resolved style for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStyle {
    /// 0..1
    pub opacity: f32,
    /// 0..100, percentage of the region's short side used as blur radius.
    pub feather_percent: f32,
    pub blend: BlendMode,
}

impl RegionStyle {
    /// Blur radius in pixels for a region whose bounds have this short side.
    pub fn feather_radius(&self, short_side: f32) -> usize {
        (short_side.max(0.0) * self.feather_percent / 100.0 * 0.5).round() as usize
    }
}

/// Engine defaults.
pub fn default_style(region: Region) -> RegionStyle {
    let (opacity, feather_percent, blend) = match region {
        Region::Lips => (0.70, 6.0, BlendMode::Normal),
        Region::Eyebrows => (0.55, 10.0, BlendMode::Multiply),
        Region::Eyelash => (1.0, 0.0, BlendMode::Normal),
        Region::Eyeshadow => (0.45, 30.0, BlendMode::Multiply),
        Region::Eyeliner => (0.90, 0.0, BlendMode::Normal),
        Region::Blush => (0.35, 0.0, BlendMode::Multiply),
        Region::Concealer => (0.30, 20.0, BlendMode::Normal),
        Region::Foundation => (0.18, 4.0, BlendMode::Normal),
    };
    RegionStyle { opacity, feather_percent, blend }
}

/// Widget-level setting; every field optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleOverride {
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub feather: Option<f32>,
    #[serde(default)]
    pub blend: Option<BlendMode>,
}

/// Live override source read on every resolve; no cached results to
/// invalidate when a setting changes mid-session.
#[derive(Debug, Clone, Default)]
pub struct StyleResolver {
    widget: HashMap<Region, StyleOverride>,
    product_opacity: HashMap<Region, u8>,
}

impl StyleResolver {
    pub fn new(
        widget: HashMap<Region, StyleOverride>,
        product_opacity: HashMap<Region, u8>,
    ) -> Self {
        let mut r = Self::default();
        for (region, o) in widget {
            r.set_widget(region, o);
        }
        for (region, pct) in product_opacity {
            r.set_product_opacity(region, pct);
        }
        r
    }

    /// Values are clamped here, once, not on every draw.
    pub fn set_widget(&mut self, region: Region, o: StyleOverride) {
        let clean = StyleOverride {
            opacity: o.opacity.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 1.0)),
            feather: o.feather.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 100.0)),
            blend: o.blend,
        };
        self.widget.insert(region, clean);
    }

    /// Product opacity in integer percent, clamped to 0..=100.
    pub fn set_product_opacity(&mut self, region: Region, percent: u8) {
        self.product_opacity.insert(region, percent.min(100));
    }

    pub fn clear_product_overrides(&mut self) {
        self.product_opacity.clear();
    }

    pub fn resolve(&self, region: Region) -> RegionStyle {
        let mut style = default_style(region);
        if let Some(w) = self.widget.get(&region) {
            if let Some(o) = w.opacity {
                style.opacity = o;
            }
            if let Some(f) = w.feather {
                style.feather_percent = f;
            }
            if let Some(b) = w.blend {
                style.blend = b;
            }
        }
        if let Some(pct) = self.product_opacity.get(&region) {
            style.opacity = *pct as f32 / 100.0;
        }
        style
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_overrides() {
        let r = StyleResolver::default();
        assert!((r.resolve(Region::Lips).opacity - 0.70).abs() < 1e-6);
        assert!((r.resolve(Region::Foundation).opacity - 0.18).abs() < 1e-6);
        assert_eq!(r.resolve(Region::Eyelash).opacity, 1.0);
    }

    #[test]
    fn product_beats_widget_beats_default() {
        let mut r = StyleResolver::default();
        r.set_widget(
            Region::Lips,
            StyleOverride { opacity: Some(0.5), feather: Some(12.0), blend: Some(BlendMode::Multiply) },
        );
        let s = r.resolve(Region::Lips);
        assert_eq!((s.opacity, s.feather_percent, s.blend), (0.5, 12.0, BlendMode::Multiply));

        r.set_product_opacity(Region::Lips, 80);
        let s = r.resolve(Region::Lips);
        assert!((s.opacity - 0.8).abs() < 1e-6);
        // Product only overrides opacity.
        assert_eq!(s.blend, BlendMode::Multiply);
    }

    #[test]
    fn resolve_reads_live_values() {
        let mut r = StyleResolver::default();
        assert!((r.resolve(Region::Blush).opacity - 0.35).abs() < 1e-6);
        r.set_widget(Region::Blush, StyleOverride { opacity: Some(0.9), ..Default::default() });
        assert!((r.resolve(Region::Blush).opacity - 0.9).abs() < 1e-6);
        r.set_product_opacity(Region::Blush, 250);
        assert_eq!(r.resolve(Region::Blush).opacity, 1.0);
        r.clear_product_overrides();
        assert!((r.resolve(Region::Blush).opacity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn widget_values_are_clamped() {
        let mut r = StyleResolver::default();
        r.set_widget(
            Region::Eyeshadow,
            StyleOverride { opacity: Some(3.0), feather: Some(-5.0), blend: None },
        );
        let s = r.resolve(Region::Eyeshadow);
        assert_eq!(s.opacity, 1.0);
        assert_eq!(s.feather_percent, 0.0);
    }

    #[test]
    fn blend_names_deserialize() {
        let b: BlendMode = serde_json::from_str("\"soft-light\"").unwrap();
        assert_eq!(b, BlendMode::SoftLight);
        let b: BlendMode = serde_json::from_str("\"source-over\"").unwrap();
        assert_eq!(b, BlendMode::Normal);
    }
}

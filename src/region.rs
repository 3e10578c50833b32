//! Face regions, their draw order, and the user's color selection.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::TryOnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Lips,
    Eyebrows,
    Eyelash,
    Eyeshadow,
    Eyeliner,
    Blush,
    Concealer,
    Foundation,
}

/// Back to front.
pub const Z_ORDER: [Region; 8] = [
    Region::Foundation,
    Region::Concealer,
    Region::Blush,
    Region::Eyebrows,
    Region::Eyeshadow,
    Region::Eyeliner,
    Region::Eyelash,
    Region::Lips,
];

impl Region {
    pub fn as_str(self) -> &'static str {
        match self {
            Region::Lips => "lips",
            Region::Eyebrows => "eyebrows",
            Region::Eyelash => "eyelash",
            Region::Eyeshadow => "eyeshadow",
            Region::Eyeliner => "eyeliner",
            Region::Blush => "blush",
            Region::Concealer => "concealer",
            Region::Foundation => "foundation",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = TryOnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lips" => Ok(Region::Lips),
            "eyebrows" => Ok(Region::Eyebrows),
            "eyelash" => Ok(Region::Eyelash),
            "eyeshadow" => Ok(Region::Eyeshadow),
            "eyeliner" => Ok(Region::Eyeliner),
            "blush" => Ok(Region::Blush),
            "concealer" => Ok(Region::Concealer),
            "foundation" => Ok(Region::Foundation),
            other => Err(TryOnError::InvalidRegion(other.to_string())),
        }
    }
}

/// Parse a stored mapping value: `"lips"`, `"eyelash,eyeliner"`, or `"none"`.
/// Duplicates collapse; `none` and empty entries contribute nothing.
pub fn parse_region_list(value: &str) -> Result<Vec<Region>, TryOnError> {
    let mut out = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() || part.eq_ignore_ascii_case("none") {
            continue;
        }
        let region: Region = part.parse()?;
        if !out.contains(&region) {
            out.push(region);
        }
    }
    Ok(out)
}

/// Region -> color, filled only by explicit user action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSelection {
    colors: BTreeMap<Region, Rgb>,
}

impl RegionSelection {
    pub fn set(&mut self, region: Region, color: Rgb) {
        self.colors.insert(region, color);
    }

    pub fn remove(&mut self, region: Region) {
        self.colors.remove(&region);
    }

    pub fn clear(&mut self) {
        self.colors.clear();
    }

    pub fn get(&self, region: Region) -> Option<Rgb> {
        self.colors.get(&region).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Selected regions in z-order with their colors.
    pub fn in_draw_order(&self) -> impl Iterator<Item = (Region, Rgb)> + '_ {
        Z_ORDER.iter().filter_map(|r| self.get(*r).map(|c| (*r, c)))
    }
}

/// Lowercase, spaces and underscores to dashes, drop everything else that is
/// not alphanumeric. Matches how catalog attribute slugs are stored.
pub fn sanitize_attribute_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if (c == ' ' || c == '_' || c == '-') && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Catalog attribute -> face regions.
///
/// Entries are keyed either by numeric attribute id (`"12"`) or by
/// sanitized name (`"name:pa_lip-shade"` or a bare name). Lookup tries the
/// id first and falls back to the name.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegionMap {
    by_id: HashMap<u32, Vec<Region>>,
    by_name: HashMap<String, Vec<Region>>,
}

impl AttributeRegionMap {
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, TryOnError> {
        let mut map = Self::default();
        for (key, value) in entries {
            let regions = parse_region_list(value)?;
            if let Ok(id) = key.trim().parse::<u32>() {
                map.by_id.insert(id, regions);
            } else {
                let name = key.strip_prefix("name:").unwrap_or(key);
                map.by_name.insert(sanitize_attribute_name(name), regions);
            }
        }
        Ok(map)
    }

    pub fn lookup(&self, id: Option<u32>, name: &str) -> &[Region] {
        if let Some(regions) = id.and_then(|id| self.by_id.get(&id)) {
            return regions;
        }
        self.by_name
            .get(&sanitize_attribute_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_list_handles_none_and_duplicates() {
        assert!(parse_region_list("none").unwrap().is_empty());
        assert!(parse_region_list("").unwrap().is_empty());
        assert_eq!(
            parse_region_list("eyelash, Eyeliner,eyelash").unwrap(),
            vec![Region::Eyelash, Region::Eyeliner]
        );
        assert!(parse_region_list("lips,cheeks").is_err());
    }

    #[test]
    fn selection_iterates_in_z_order() {
        let mut sel = RegionSelection::default();
        sel.set(Region::Lips, Rgb::new(1, 2, 3));
        sel.set(Region::Foundation, Rgb::new(4, 5, 6));
        sel.set(Region::Eyeshadow, Rgb::new(7, 8, 9));
        let order: Vec<Region> = sel.in_draw_order().map(|(r, _)| r).collect();
        assert_eq!(order, vec![Region::Foundation, Region::Eyeshadow, Region::Lips]);
    }

    #[test]
    fn attribute_lookup_prefers_id_then_name() {
        let map = AttributeRegionMap::from_entries([
            ("7", "lips"),
            ("name:Lip Shade", "eyeshadow"),
            ("pa_mascara", "eyelash,eyeliner"),
        ])
        .unwrap();
        assert_eq!(map.lookup(Some(7), "Lip Shade"), &[Region::Lips]);
        assert_eq!(map.lookup(Some(99), "lip shade"), &[Region::Eyeshadow]);
        assert_eq!(map.lookup(None, "PA_Mascara"), &[Region::Eyelash, Region::Eyeliner]);
        assert!(map.lookup(None, "unknown").is_empty());
    }

    #[test]
    fn sanitize_collapses_separators() {
        assert_eq!(sanitize_attribute_name("  Lip  Shade_2 "), "lip-shade-2");
        assert_eq!(sanitize_attribute_name("pa_lip-shade"), "pa-lip-shade");
    }
}

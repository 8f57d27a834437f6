use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category and icon key given to sites that do not name one.
pub const DEFAULT_SITE_TYPE: &str = "tower";

/// Icon keys the map knows how to draw, in layer-menu order.
pub const ICON_KEYS: [&str; 5] = ["tower", "radio", "signal", "database", "map-pin"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    pub fn is_valid(self) -> bool {
        self.is_finite() && (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A tracked point of interest.
///
/// Top-level JSON fields this struct does not know about are kept in `extra`
/// and written back untouched, so exports survive a round trip through
/// another tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type")]
    pub site_type: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Site {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Form submission for a new site. Coordinates arrive as numbers or as the
/// raw text typed into the form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lng: Option<f64>,
    #[serde(default, rename = "type")]
    pub site_type: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Partial edit of a site. Absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::present_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub lat: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::present_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub lng: Option<f64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub site_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl SitePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Folds a later patch into this one; fields set in `later` win.
    pub fn merge(&mut self, later: SitePatch) {
        let SitePatch {
            name,
            lat,
            lng,
            site_type,
            icon,
            category,
            notes,
            metadata,
        } = later;
        self.name = name.or(self.name.take());
        self.lat = lat.or(self.lat);
        self.lng = lng.or(self.lng);
        self.site_type = site_type.or(self.site_type.take());
        self.icon = icon.or(self.icon.take());
        self.category = category.or(self.category.take());
        self.notes = notes.or(self.notes.take());
        self.metadata = metadata.or(self.metadata.take());
    }

    /// Writes every present field onto `site`. Does not validate.
    pub fn apply_to(&self, site: &mut Site) {
        if let Some(name) = &self.name {
            site.name = name.clone();
        }
        if let Some(lat) = self.lat {
            site.lat = lat;
        }
        if let Some(lng) = self.lng {
            site.lng = lng;
        }
        if let Some(site_type) = &self.site_type {
            site.site_type = site_type.clone();
        }
        if let Some(icon) = &self.icon {
            site.icon = icon.clone();
        }
        if let Some(category) = &self.category {
            site.category = Some(category.clone());
        }
        if let Some(notes) = &self.notes {
            site.notes = Some(notes.clone());
        }
        if let Some(metadata) = &self.metadata {
            site.metadata = Some(metadata.clone());
        }
    }
}

/// A named map viewpoint. `center` is `[lat, lng]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub code: String,
    pub center: [f64; 2],
    pub zoom: u32,
}

impl Region {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.center[0], self.center[1])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub zoom: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl UserLocation {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CustomerLocation {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Append,
    Replace,
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown import mode {other:?} (expected append or replace)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
    Fr,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
            Self::Fr => "fr",
        }
    }

    pub fn is_rtl(self) -> bool {
        matches!(self, Self::Ar)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ar" => Ok(Self::Ar),
            "fr" => Ok(Self::Fr),
            other => Err(format!("unsupported language {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardinalDirection {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl CardinalDirection {
    /// Clockwise from north; index `i` is centered on `i * 45` degrees.
    pub const ALL: [CardinalDirection; 8] = [
        Self::N,
        Self::NE,
        Self::E,
        Self::SE,
        Self::S,
        Self::SW,
        Self::W,
        Self::NW,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::N => "N",
            Self::NE => "NE",
            Self::E => "E",
            Self::SE => "SE",
            Self::S => "S",
            Self::SW => "SW",
            Self::W => "W",
            Self::NW => "NW",
        }
    }
}

impl fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Distance and initial compass heading from one point to another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub distance_km: f64,
    pub bearing_deg: f64,
    pub cardinal: CardinalDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProximity {
    pub site: Site,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_customer: Option<Heading>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementResponse {
    pub measuring: bool,
    pub path: Vec<Coordinate>,
    pub distance_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpx_base64: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub mode: ImportMode,
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapClickOutcome {
    MeasurePoint { points: usize, distance_km: f64 },
    LocationPicked { coordinate: Coordinate },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub language: Language,
    pub rtl: bool,
    pub site_count: usize,
    pub selected_site: Option<Site>,
    pub editing: Option<String>,
    pub selected_region: Option<Region>,
    pub user_location: Option<UserLocation>,
    pub customer_location: Option<CustomerLocation>,
    pub picked_location: Option<Coordinate>,
    pub visible_types: Vec<String>,
    pub measurement: MeasurementResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

/// Decoding helpers for form-style numeric fields.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Reads a number or numeric string; anything else, including
    /// non-finite values, becomes `None`.
    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(as_number))
    }

    /// Like [`number`], but a value that is present and not numeric becomes
    /// NaN, so coordinate validation rejects it rather than ignoring it.
    pub fn present_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.map(|v| as_number(&v).unwrap_or(f64::NAN)))
    }

    pub fn as_number(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number.filter(|n| n.is_finite())
    }
}

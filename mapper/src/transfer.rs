//! Bulk import and export of the site collection.
//!
//! JSON is the full-fidelity format: every field, including `metadata` and
//! unknown pass-through fields, survives a round trip. Import is deliberately
//! lenient about individual records.
//!
//! CSV is a flat template format split on bare commas. There is no quoting,
//! so a field containing a comma shifts the remaining columns; such rows
//! usually fail coordinate parsing and are dropped.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use serde_json::{Map, Value};
use shared::{Coordinate, DEFAULT_SITE_TYPE, ImportMode, Site, lenient};

use crate::{
    error::{MapperError, TransferError},
    registry::{SiteRegistry, new_site_id},
};

pub const CSV_HEADER: [&str; 7] = [
    "name",
    "latitude",
    "longitude",
    "type",
    "icon",
    "notes",
    "category",
];
const CSV_SAMPLE_ROW: &str = "Main Hub,26.3351,17.2283,tower,tower,Primary site for region,Hub";
const GPX_CREATOR: &str = "tower_mapper";

/// Sites decoded from an import file plus the number of records dropped.
#[derive(Debug, Clone, Default)]
pub struct ParsedImport {
    pub sites: Vec<Site>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Json,
    Gpx,
    CsvTemplate { sample: bool },
}

impl ExportKind {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Gpx => "application/gpx+xml",
            Self::CsvTemplate { .. } => "text/csv; charset=utf-8",
        }
    }
}

pub fn export_file_name(kind: ExportKind, date: NaiveDate) -> String {
    match kind {
        ExportKind::Json => format!("tower_data_{}.json", date.format("%Y-%m-%d")),
        ExportKind::Gpx => format!("tower_data_{}.gpx", date.format("%Y-%m-%d")),
        ExportKind::CsvTemplate { sample: true } => "tower_template_sample.csv".to_string(),
        ExportKind::CsvTemplate { sample: false } => "tower_template_empty.csv".to_string(),
    }
}

pub fn export_json(sites: &[Site]) -> Result<String, TransferError> {
    Ok(serde_json::to_string_pretty(sites)?)
}

/// Decodes a JSON array of site objects.
///
/// Fails only when the text is not JSON or not an array. Inside the array,
/// missing ids are generated, missing names and categories default, and
/// numeric strings are accepted for coordinates. Entries that are not objects
/// or have no finite coordinates are skipped; coordinates are otherwise taken
/// as given, without a range check.
pub fn import_json(text: &str) -> Result<ParsedImport, MapperError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| MapperError::Parse(err.to_string()))?;
    let Value::Array(items) = value else {
        return Err(MapperError::Parse(
            "expected a JSON array of sites".to_string(),
        ));
    };

    let mut parsed = ParsedImport::default();
    for (index, item) in items.into_iter().enumerate() {
        let site = match item {
            Value::Object(object) => site_from_object(object),
            _ => None,
        };
        match site {
            Some(site) => parsed.sites.push(site),
            None => {
                tracing::warn!("skipping JSON entry {index}: not a site object with coordinates");
                parsed.skipped += 1;
            }
        }
    }
    Ok(parsed)
}

fn site_from_object(mut object: Map<String, Value>) -> Option<Site> {
    let lat = object.remove("lat").as_ref().and_then(lenient::as_number)?;
    let lng = object.remove("lng").as_ref().and_then(lenient::as_number)?;
    if !Coordinate::new(lat, lng).is_finite() {
        return None;
    }

    let id = take_text(&mut object, "id")
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_site_id);
    let name = take_text(&mut object, "name").unwrap_or_default();
    let site_type = take_text(&mut object, "type").unwrap_or_else(|| DEFAULT_SITE_TYPE.to_string());
    let icon = take_text(&mut object, "icon").unwrap_or_else(|| DEFAULT_SITE_TYPE.to_string());
    let category = take_text(&mut object, "category");
    let notes = take_text(&mut object, "notes");
    let metadata = match object.remove("metadata") {
        Some(Value::Object(map)) => Some(map),
        Some(Value::Null) | None => None,
        Some(other) => {
            tracing::warn!("dropping non-object metadata on site {id}: {other}");
            None
        }
    };

    Some(Site {
        id,
        name,
        lat,
        lng,
        site_type,
        icon,
        category,
        notes,
        metadata,
        extra: object,
    })
}

fn take_text(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn export_csv_template(include_sample_row: bool) -> String {
    let mut rows = vec![CSV_HEADER.join(",")];
    if include_sample_row {
        rows.push(CSV_SAMPLE_ROW.to_string());
    }
    rows.join("\n")
}

/// Parses comma-separated rows keyed by the header line.
///
/// Rows need a non-empty `name` and finite in-range coordinates (`latitude`
/// or `lat`, `longitude` or `lng`); other rows are counted in `skipped`.
pub fn import_csv(text: &str) -> ParsedImport {
    let mut lines = text.lines();
    let mut parsed = ParsedImport::default();
    let Some(header_line) = lines.next() else {
        return parsed;
    };
    let headers: Vec<String> = header_line
        .trim_start_matches('\u{feff}')
        .split(',')
        .map(|h| h.trim().to_lowercase())
        .collect();

    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(line.split(',').map(str::trim))
            .collect();
        match site_from_csv_record(&record) {
            Some(site) => parsed.sites.push(site),
            None => {
                tracing::debug!("dropping CSV row {}: {line:?}", line_no + 2);
                parsed.skipped += 1;
            }
        }
    }
    parsed
}

fn site_from_csv_record(record: &HashMap<&str, &str>) -> Option<Site> {
    let field = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| record.get(key).copied())
            .find(|value| !value.is_empty())
    };

    let name = field(&["name"])?;
    let lat = field(&["latitude", "lat"])?.parse::<f64>().ok()?;
    let lng = field(&["longitude", "lng"])?.parse::<f64>().ok()?;
    if !Coordinate::new(lat, lng).is_valid() {
        return None;
    }

    Some(Site {
        id: new_site_id(),
        name: name.to_string(),
        lat,
        lng,
        site_type: field(&["type"]).unwrap_or(DEFAULT_SITE_TYPE).to_string(),
        icon: field(&["icon"]).unwrap_or(DEFAULT_SITE_TYPE).to_string(),
        category: Some(field(&["category"]).unwrap_or_default().to_string()),
        notes: Some(field(&["notes"]).unwrap_or_default().to_string()),
        metadata: None,
        extra: Map::new(),
    })
}

/// Applies decoded sites to `registry` and returns how many were added.
pub fn merge_into(registry: &mut SiteRegistry, sites: Vec<Site>, mode: ImportMode) -> usize {
    match mode {
        ImportMode::Append => registry.extend(sites),
        ImportMode::Replace => registry.replace_all(sites),
    }
}

/// GPX 1.1 document with one waypoint per site.
pub fn export_gpx(sites: &[Site]) -> Result<String, TransferError> {
    let mut gpx = new_document();
    gpx.waypoints.extend(sites.iter().map(site_waypoint));
    write_document(&gpx)
}

/// Base64 GPX track for a measured polyline.
pub fn encode_track_as_gpx(path: &[Coordinate]) -> Result<String, TransferError> {
    let mut gpx = new_document();
    let mut track = Track {
        name: Some("measurement".into()),
        ..Default::default()
    };

    let mut segment = TrackSegment::new();
    for coord in path {
        segment.points.push(Waypoint::new(Point::new(coord.lng, coord.lat)));
    }
    track.segments.push(segment);
    gpx.tracks.push(track);

    Ok(BASE64.encode(write_document(&gpx)?))
}

fn new_document() -> Gpx {
    Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(GPX_CREATOR.into()),
        ..Default::default()
    }
}

fn site_waypoint(site: &Site) -> Waypoint {
    let mut waypoint = Waypoint::new(Point::new(site.lng, site.lat));
    waypoint.name = Some(site.name.clone());
    waypoint.description = site.notes.clone().filter(|notes| !notes.is_empty());
    waypoint.symbol = Some(site.icon.clone());
    waypoint
}

fn write_document(gpx: &Gpx) -> Result<String, TransferError> {
    let mut buffer = Vec::new();
    gpx::write(gpx, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

use std::{
    collections::{BTreeSet, HashSet},
    str::FromStr,
};

use shared::{DEFAULT_SITE_TYPE, Site, SiteDraft, SitePatch};
use uuid::Uuid;

use crate::error::MapperError;

/// Fields a free-text search looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Type,
    Category,
    Notes,
}

impl SearchField {
    pub const ALL: [SearchField; 4] = [Self::Name, Self::Type, Self::Category, Self::Notes];

    fn value(self, site: &Site) -> Option<&str> {
        match self {
            Self::Name => Some(&site.name),
            Self::Type => Some(&site.site_type),
            Self::Category => site.category.as_deref(),
            Self::Notes => site.notes.as_deref(),
        }
    }
}

impl FromStr for SearchField {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "type" => Ok(Self::Type),
            "category" => Ok(Self::Category),
            "notes" => Ok(Self::Notes),
            other => Err(MapperError::validation(
                "fields",
                format!("unknown search field {other:?}"),
            )),
        }
    }
}

pub fn new_site_id() -> String {
    Uuid::new_v4().to_string()
}

/// Ordered collection of sites. Insertion order is display order.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<Site>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from already-decoded sites, repairing duplicate ids.
    pub fn from_sites(sites: Vec<Site>) -> Self {
        let mut registry = Self::new();
        registry.extend(sites);
        registry
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn find(&self, id: &str) -> Option<&Site> {
        self.sites.iter().find(|site| site.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn add(&mut self, draft: SiteDraft) -> Result<Site, MapperError> {
        let name = checked_name(&draft.name)?;
        let lat = checked_latitude(draft.lat)?;
        let lng = checked_longitude(draft.lng)?;

        let site_type = non_empty(draft.site_type).unwrap_or_else(|| DEFAULT_SITE_TYPE.to_string());
        let icon = non_empty(draft.icon).unwrap_or_else(|| DEFAULT_SITE_TYPE.to_string());
        let site = Site {
            id: new_site_id(),
            name,
            lat,
            lng,
            site_type,
            icon,
            category: draft.category,
            notes: Some(draft.notes.unwrap_or_default()),
            metadata: draft.metadata,
            extra: Default::default(),
        };

        self.sites.push(site.clone());
        tracing::debug!("site added: {} ({})", site.name, site.id);
        Ok(site)
    }

    /// Applies `patch` to the site with `id`. Either every field lands or
    /// nothing changes.
    pub fn update(&mut self, id: &str, patch: &SitePatch) -> Result<Site, MapperError> {
        let index = self.index_of(id)?;
        if let Some(name) = &patch.name {
            checked_name(name)?;
        }
        if patch.lat.is_some() {
            checked_latitude(patch.lat)?;
        }
        if patch.lng.is_some() {
            checked_longitude(patch.lng)?;
        }

        let site = &mut self.sites[index];
        patch.apply_to(site);
        if let Some(name) = &patch.name {
            site.name = name.trim().to_string();
        }
        tracing::debug!("site updated: {}", site.id);
        Ok(site.clone())
    }

    pub fn update_notes(&mut self, id: &str, notes: String) -> Result<Site, MapperError> {
        let index = self.index_of(id)?;
        let site = &mut self.sites[index];
        site.notes = Some(notes);
        Ok(site.clone())
    }

    pub fn remove(&mut self, id: &str) -> Result<Site, MapperError> {
        let index = self.index_of(id)?;
        Ok(self.sites.remove(index))
    }

    /// Case-insensitive substring match over the OR of `fields`. An empty
    /// query matches everything.
    pub fn search(&self, query: &str, fields: &[SearchField]) -> Vec<&Site> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return self.sites.iter().collect();
        }
        self.sites
            .iter()
            .filter(|site| {
                fields.iter().any(|field| {
                    field
                        .value(site)
                        .is_some_and(|value| value.to_lowercase().contains(&needle))
                })
            })
            .collect()
    }

    /// Sites whose icon key is in `types`; drives map layer visibility.
    pub fn filter_by_visible_types(&self, types: &BTreeSet<String>) -> Vec<&Site> {
        self.sites
            .iter()
            .filter(|site| types.contains(&site.icon))
            .collect()
    }

    /// Appends `sites`, giving a fresh id to any record whose id is empty or
    /// already taken. Returns the number appended.
    pub fn extend(&mut self, sites: Vec<Site>) -> usize {
        let mut taken: HashSet<String> = self.sites.iter().map(|site| site.id.clone()).collect();
        let count = sites.len();
        for mut site in sites {
            if site.id.trim().is_empty() || taken.contains(&site.id) {
                let fresh = new_site_id();
                tracing::debug!("reassigning site id {:?} -> {}", site.id, fresh);
                site.id = fresh;
            }
            taken.insert(site.id.clone());
            self.sites.push(site);
        }
        count
    }

    pub fn replace_all(&mut self, sites: Vec<Site>) -> usize {
        self.sites.clear();
        self.extend(sites)
    }

    fn index_of(&self, id: &str) -> Result<usize, MapperError> {
        self.sites
            .iter()
            .position(|site| site.id == id)
            .ok_or_else(|| MapperError::site_not_found(id))
    }
}

pub(crate) fn checked_name(name: &str) -> Result<String, MapperError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(MapperError::validation("name", "must not be empty"));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn checked_latitude(value: Option<f64>) -> Result<f64, MapperError> {
    checked_axis("lat", value, 90.0)
}

pub(crate) fn checked_longitude(value: Option<f64>) -> Result<f64, MapperError> {
    checked_axis("lng", value, 180.0)
}

fn checked_axis(field: &'static str, value: Option<f64>, limit: f64) -> Result<f64, MapperError> {
    let value = value.ok_or_else(|| MapperError::validation(field, "missing or not a number"))?;
    if !value.is_finite() {
        return Err(MapperError::validation(field, "must be a finite number"));
    }
    if !(-limit..=limit).contains(&value) {
        return Err(MapperError::validation(
            field,
            format!("{value} is outside [-{limit}, {limit}]"),
        ));
    }
    Ok(value)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, lat: f64, lng: f64) -> SiteDraft {
        SiteDraft {
            name: name.into(),
            lat: Some(lat),
            lng: Some(lng),
            ..Default::default()
        }
    }

    fn registry_with(names: &[&str]) -> SiteRegistry {
        let mut registry = SiteRegistry::new();
        for (i, name) in names.iter().enumerate() {
            registry.add(draft(name, i as f64, i as f64)).expect("valid draft");
        }
        registry
    }

    #[test]
    fn add_assigns_id_and_defaults() {
        let mut registry = SiteRegistry::new();
        let site = registry.add(draft("Main Hub", 26.3351, 17.2283)).unwrap();
        assert!(!site.id.is_empty());
        assert_eq!(site.site_type, "tower");
        assert_eq!(site.icon, "tower");
        assert_eq!(site.notes.as_deref(), Some(""));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_rejects_empty_name_without_change() {
        let mut registry = registry_with(&["A"]);
        let err = registry.add(draft("   ", 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, MapperError::Validation { field: "name", .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_rejects_missing_or_invalid_coordinates() {
        let mut registry = SiteRegistry::new();
        let missing = SiteDraft {
            name: "A".into(),
            lat: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            registry.add(missing),
            Err(MapperError::Validation { field: "lng", .. })
        ));
        assert!(registry.add(draft("B", 91.0, 0.0)).is_err());
        assert!(registry.add(draft("C", f64::NAN, 0.0)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let registry = registry_with(&["A", "B", "C"]);
        let ids: HashSet<_> = registry.sites().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn update_merges_fields_and_keeps_id() {
        let mut registry = registry_with(&["A"]);
        let id = registry.sites()[0].id.clone();
        let patch = SitePatch {
            name: Some("Renamed".into()),
            category: Some("Hub".into()),
            ..Default::default()
        };
        let updated = registry.update(&id, &patch).unwrap();
        assert_eq!(updated.id, id);
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.category.as_deref(), Some("Hub"));
        assert_eq!(updated.lat, 0.0);
    }

    #[test]
    fn update_is_all_or_nothing() {
        let mut registry = registry_with(&["A"]);
        let id = registry.sites()[0].id.clone();
        let patch = SitePatch {
            name: Some("Renamed".into()),
            lat: Some(120.0),
            ..Default::default()
        };
        assert!(registry.update(&id, &patch).is_err());
        assert_eq!(registry.find(&id).unwrap().name, "A");
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let mut registry = registry_with(&["A"]);
        let err = registry.update("nope", &SitePatch::default()).unwrap_err();
        assert!(matches!(err, MapperError::NotFound { kind: "site", .. }));
    }

    #[test]
    fn remove_reports_missing_id() {
        let mut registry = registry_with(&["A", "B"]);
        assert!(matches!(
            registry.remove("missing"),
            Err(MapperError::NotFound { .. })
        ));
        assert_eq!(registry.len(), 2);

        let id = registry.sites()[0].id.clone();
        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.name, "A");
        assert!(registry.find(&id).is_none());
    }

    #[test]
    fn search_is_case_insensitive_over_all_fields() {
        let mut registry = registry_with(&["North Tower", "Depot"]);
        let depot = registry.sites()[1].id.clone();
        registry
            .update_notes(&depot, "Generator needs SERVICE".into())
            .unwrap();

        let names: Vec<_> = registry
            .search("service", &SearchField::ALL)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["Depot"]);

        let by_type = registry.search("TOWER", &SearchField::ALL);
        assert_eq!(by_type.len(), 2, "type defaults to tower for both");
    }

    #[test]
    fn search_respects_field_selection_and_order() {
        let registry = registry_with(&["alpha", "beta", "alphabet"]);
        let names: Vec<_> = registry
            .search("alpha", &[SearchField::Name])
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["alpha", "alphabet"]);
        assert!(registry.search("tower", &[SearchField::Notes]).is_empty());
        assert_eq!(registry.search("", &[]).len(), 3);
    }

    #[test]
    fn filter_by_visible_types_uses_icon() {
        let mut registry = SiteRegistry::new();
        registry
            .add(SiteDraft {
                icon: Some("radio".into()),
                ..draft("R", 0.0, 0.0)
            })
            .unwrap();
        registry.add(draft("T", 0.0, 0.0)).unwrap();

        let visible: BTreeSet<String> = ["radio".to_string()].into();
        let shown = registry.filter_by_visible_types(&visible);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].name, "R");
        assert!(registry.filter_by_visible_types(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn extend_repairs_colliding_ids() {
        let mut registry = registry_with(&["A"]);
        let mut copy = registry.sites()[0].clone();
        copy.name = "A copy".into();
        let mut blank = copy.clone();
        blank.id = String::new();

        assert_eq!(registry.extend(vec![copy, blank]), 2);
        let ids: HashSet<_> = registry.sites().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn search_field_parses() {
        assert_eq!("Notes".parse::<SearchField>().unwrap(), SearchField::Notes);
        assert!("icon".parse::<SearchField>().is_err());
    }
}

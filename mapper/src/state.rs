//! Composition root.
//!
//! `AppState` owns every collection the operator works with and is the only
//! place that talks to durable storage. Each public mutator corresponds to
//! one user action; after a committed change to sites, regions, language or
//! the customer location the matching slot is rewritten. Storage failures are
//! logged and never undo or fail the in-memory change.
//!
//! The selected site, the edit buffer and the picked map location are views
//! by id. They are cleared as soon as the record behind them disappears.

use std::collections::{BTreeSet, HashSet};

use shared::{
    Coordinate, CustomerDraft, CustomerLocation, ICON_KEYS, ImportMode, ImportSummary, Language,
    MapClickOutcome, MeasurementResponse, Region, RegionDraft, Site, SiteDraft, SitePatch,
    SiteProximity, StateSnapshot, UserLocation,
};

use crate::{
    error::MapperError,
    geo,
    location::{LocationError, LocationProvider},
    measurement::{MeasureState, MeasurementSession},
    regions::RegionCatalog,
    registry::{SearchField, SiteRegistry, checked_latitude, checked_longitude},
    store::KeyValueStore,
    transfer::{self, ParsedImport},
};

pub const DEFAULT_NAMESPACE: &str = "tower_mapper";
pub const DEFAULT_CUSTOMER_NAME: &str = "Current Prospect";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Sites,
    Language,
    Regions,
    Customer,
}

impl Slot {
    fn suffix(self) -> &'static str {
        match self {
            Self::Sites => "sites",
            Self::Language => "lang",
            Self::Regions => "countries",
            Self::Customer => "customer",
        }
    }
}

/// A pending edit of one site: the id plus the fields changed so far.
#[derive(Debug, Clone, PartialEq)]
pub struct EditBuffer {
    pub site_id: String,
    pub patch: SitePatch,
}

pub struct AppState {
    store: Box<dyn KeyValueStore>,
    namespace: String,
    registry: SiteRegistry,
    regions: RegionCatalog,
    language: Language,
    user_location: Option<UserLocation>,
    customer: Option<CustomerLocation>,
    measurement: MeasurementSession,
    visible_types: BTreeSet<String>,
    selected_site: Option<String>,
    selected_region: Option<String>,
    edit: Option<EditBuffer>,
    picked_location: Option<Coordinate>,
}

impl AppState {
    /// Restores state from `store`, seeding the region catalog on first run.
    pub fn load(store: Box<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        let mut state = Self {
            store,
            namespace: namespace.into(),
            registry: SiteRegistry::new(),
            regions: RegionCatalog::default(),
            language: Language::default(),
            user_location: None,
            customer: None,
            measurement: MeasurementSession::new(),
            visible_types: ICON_KEYS.iter().map(|key| key.to_string()).collect(),
            selected_site: None,
            selected_region: None,
            edit: None,
            picked_location: None,
        };

        if let Some(text) = state.read(Slot::Sites) {
            match transfer::import_json(&text) {
                Ok(parsed) => {
                    if parsed.skipped > 0 {
                        tracing::warn!("{} stored site(s) were unreadable and dropped", parsed.skipped);
                    }
                    state.registry = SiteRegistry::from_sites(parsed.sites);
                }
                Err(err) => tracing::warn!("ignoring stored sites: {err}"),
            }
        }

        if let Some(code) = state.read(Slot::Language) {
            state.language = code.parse().unwrap_or_else(|err| {
                tracing::warn!("ignoring stored language: {err}");
                Language::default()
            });
        }

        match state.store.get(&state.key(Slot::Regions)) {
            Ok(Some(text)) => match serde_json::from_str::<Vec<Region>>(&text) {
                Ok(regions) => state.regions = RegionCatalog::from_regions(regions),
                Err(err) => {
                    tracing::warn!("stored regions unreadable, using presets: {err}");
                    state.regions = RegionCatalog::seeded();
                }
            },
            Ok(None) => {
                state.regions = RegionCatalog::seeded();
                state.persist(Slot::Regions);
            }
            Err(err) => {
                tracing::warn!("could not read regions, using presets: {err}");
                state.regions = RegionCatalog::seeded();
            }
        }
        state.selected_region = state.regions.first().map(|region| region.code.clone());

        if let Some(text) = state.read(Slot::Customer) {
            match serde_json::from_str::<CustomerLocation>(&text) {
                Ok(customer) if customer.coordinate().is_valid() => state.customer = Some(customer),
                Ok(_) => tracing::warn!("ignoring stored customer with invalid coordinates"),
                Err(err) => tracing::warn!("ignoring stored customer: {err}"),
            }
        }

        tracing::info!(
            "state loaded: {} sites, {} regions, language {}",
            state.registry.len(),
            state.regions.len(),
            state.language.code()
        );
        state
    }

    // --- sites ---

    pub fn add_site(&mut self, draft: SiteDraft) -> Result<Site, MapperError> {
        let site = self.registry.add(draft)?;
        self.picked_location = None;
        self.persist(Slot::Sites);
        tracing::info!("site created: {} ({})", site.name, site.id);
        Ok(site)
    }

    pub fn update_site(&mut self, id: &str, patch: SitePatch) -> Result<Site, MapperError> {
        let site = self.registry.update(id, &patch)?;
        self.persist(Slot::Sites);
        tracing::info!("site updated: {} ({})", site.name, site.id);
        Ok(site)
    }

    pub fn update_notes(&mut self, id: &str, notes: String) -> Result<Site, MapperError> {
        let site = self.registry.update_notes(id, notes)?;
        self.persist(Slot::Sites);
        Ok(site)
    }

    /// Deletes a site and clears any selection or edit pointing at it.
    pub fn delete_site(&mut self, id: &str) -> Result<Site, MapperError> {
        let site = self.registry.remove(id)?;
        if self.selected_site.as_deref() == Some(id) {
            self.selected_site = None;
        }
        if self.edit.as_ref().is_some_and(|edit| edit.site_id == id) {
            self.edit = None;
        }
        self.persist(Slot::Sites);
        tracing::info!("site deleted: {} ({})", site.name, site.id);
        Ok(site)
    }

    pub fn sites(&self) -> &[Site] {
        self.registry.sites()
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn search_sites(&self, query: &str, fields: &[SearchField]) -> Vec<&Site> {
        self.registry.search(query, fields)
    }

    pub fn visible_sites(&self) -> Vec<&Site> {
        self.registry.filter_by_visible_types(&self.visible_types)
    }

    /// Search results limited to sites on visible layers.
    pub fn search_visible_sites(&self, query: &str, fields: &[SearchField]) -> Vec<&Site> {
        let visible: HashSet<&str> = self
            .visible_sites()
            .into_iter()
            .map(|site| site.id.as_str())
            .collect();
        self.search_sites(query, fields)
            .into_iter()
            .filter(|site| visible.contains(site.id.as_str()))
            .collect()
    }

    // --- selection and editing ---

    pub fn select_site(&mut self, id: &str) -> Result<&Site, MapperError> {
        if !self.registry.contains(id) {
            return Err(MapperError::site_not_found(id));
        }
        if self.edit.as_ref().is_some_and(|edit| edit.site_id != id) {
            self.edit = None;
        }
        self.selected_site = Some(id.to_string());
        self.registry
            .find(id)
            .ok_or_else(|| MapperError::site_not_found(id))
    }

    pub fn clear_selection(&mut self) {
        self.selected_site = None;
        self.edit = None;
    }

    pub fn selected_site(&self) -> Option<&Site> {
        self.selected_site
            .as_deref()
            .and_then(|id| self.registry.find(id))
    }

    /// Opens an edit buffer on `id` and selects it.
    pub fn begin_edit(&mut self, id: &str) -> Result<&EditBuffer, MapperError> {
        self.select_site(id)?;
        let edit = self.edit.insert(EditBuffer {
            site_id: id.to_string(),
            patch: SitePatch::default(),
        });
        Ok(&*edit)
    }

    pub fn stage_edit(&mut self, patch: SitePatch) -> Result<&EditBuffer, MapperError> {
        let site_id = self.active_edit_id()?;
        if !self.registry.contains(&site_id) {
            self.edit = None;
            return Err(MapperError::site_not_found(&site_id));
        }
        let edit = self
            .edit
            .as_mut()
            .ok_or_else(|| MapperError::validation("edit", "no edit in progress"))?;
        edit.patch.merge(patch);
        Ok(&*edit)
    }

    /// The edited site with staged changes applied, without validating them.
    pub fn edit_preview(&self) -> Option<Site> {
        let edit = self.edit.as_ref()?;
        let mut site = self.registry.find(&edit.site_id)?.clone();
        edit.patch.apply_to(&mut site);
        Some(site)
    }

    pub fn editing(&self) -> Option<&EditBuffer> {
        self.edit.as_ref()
    }

    /// Applies the staged patch. A validation failure keeps the buffer so the
    /// operator can correct it.
    pub fn commit_edit(&mut self) -> Result<Site, MapperError> {
        let Some(edit) = self.edit.take() else {
            return Err(MapperError::validation("edit", "no edit in progress"));
        };
        match self.registry.update(&edit.site_id, &edit.patch) {
            Ok(site) => {
                self.persist(Slot::Sites);
                tracing::info!("site edit committed: {} ({})", site.name, site.id);
                Ok(site)
            }
            Err(err @ MapperError::Validation { .. }) => {
                self.edit = Some(edit);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    fn active_edit_id(&self) -> Result<String, MapperError> {
        self.edit
            .as_ref()
            .map(|edit| edit.site_id.clone())
            .ok_or_else(|| MapperError::validation("edit", "no edit in progress"))
    }

    /// Distances from the operator and the customer to a site.
    pub fn site_proximity(&self, id: &str) -> Result<SiteProximity, MapperError> {
        let site = self
            .registry
            .find(id)
            .ok_or_else(|| MapperError::site_not_found(id))?;
        let target = site.coordinate();
        Ok(SiteProximity {
            site: site.clone(),
            from_user_km: self
                .user_location
                .map(|user| geo::distance_km(user.coordinate(), target)),
            from_customer: self
                .customer
                .as_ref()
                .map(|customer| geo::heading(customer.coordinate(), target)),
        })
    }

    // --- regions ---

    pub fn regions(&self) -> &[Region] {
        self.regions.regions()
    }

    pub fn add_region(&mut self, draft: RegionDraft) -> Result<Region, MapperError> {
        let region = self.regions.add(draft)?;
        self.selected_region = Some(region.code.clone());
        self.persist(Slot::Regions);
        tracing::info!("region added: {} ({})", region.name, region.code);
        Ok(region)
    }

    pub fn select_region(&mut self, code: &str) -> Result<Region, MapperError> {
        let region = self
            .regions
            .find_by_code(code)
            .cloned()
            .ok_or_else(|| MapperError::region_not_found(code))?;
        self.selected_region = Some(region.code.clone());
        Ok(region)
    }

    pub fn selected_region(&self) -> Option<&Region> {
        self.selected_region
            .as_deref()
            .and_then(|code| self.regions.find_by_code(code))
            .or_else(|| self.regions.first())
    }

    // --- reference locations ---

    pub fn set_customer(&mut self, draft: CustomerDraft) -> Result<CustomerLocation, MapperError> {
        let lat = checked_latitude(draft.lat)?;
        let lng = checked_longitude(draft.lng)?;
        let name = draft
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string());
        let customer = CustomerLocation {
            lat,
            lng,
            name: Some(name),
        };
        self.customer = Some(customer.clone());
        self.persist(Slot::Customer);
        tracing::info!("customer location set: {lat:.6}, {lng:.6}");
        Ok(customer)
    }

    pub fn clear_customer(&mut self) -> Option<CustomerLocation> {
        let previous = self.customer.take();
        self.persist(Slot::Customer);
        previous
    }

    pub fn customer(&self) -> Option<&CustomerLocation> {
        self.customer.as_ref()
    }

    pub fn set_user_location(&mut self, location: UserLocation) -> Result<(), MapperError> {
        checked_latitude(Some(location.lat))?;
        checked_longitude(Some(location.lng))?;
        self.user_location = Some(location);
        tracing::debug!("user location: {:.6}, {:.6}", location.lat, location.lng);
        Ok(())
    }

    /// Queries `provider` once. On failure the previous location is kept.
    pub async fn refresh_user_location<P>(&mut self, provider: &P) -> Result<UserLocation, LocationError>
    where
        P: LocationProvider,
    {
        let location = match provider.locate().await {
            Ok(location) => location,
            Err(err) => {
                tracing::warn!("device location unavailable: {err}");
                return Err(err);
            }
        };
        self.set_user_location(location)
            .map_err(|err| LocationError::Unavailable(err.to_string()))?;
        Ok(location)
    }

    pub fn user_location(&self) -> Option<UserLocation> {
        self.user_location
    }

    // --- preferences ---

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        self.persist(Slot::Language);
    }

    /// Flips one map layer; returns whether it is now visible.
    pub fn toggle_layer(&mut self, icon: &str) -> bool {
        if self.visible_types.remove(icon) {
            false
        } else {
            self.visible_types.insert(icon.to_string());
            true
        }
    }

    // --- map interaction and measurement ---

    /// Routes a map click: a measurement point while measuring, otherwise the
    /// coordinate that prefills the add form (closing any open site).
    pub fn map_click(&mut self, point: Coordinate) -> Result<MapClickOutcome, MapperError> {
        checked_latitude(Some(point.lat))?;
        checked_longitude(Some(point.lng))?;
        if self.measurement.is_measuring() {
            self.measurement.add_point(point);
            return Ok(MapClickOutcome::MeasurePoint {
                points: self.measurement.points().len(),
                distance_km: self.measurement.total_length_km(),
            });
        }
        self.picked_location = Some(point);
        self.selected_site = None;
        self.edit = None;
        Ok(MapClickOutcome::LocationPicked { coordinate: point })
    }

    pub fn picked_location(&self) -> Option<Coordinate> {
        self.picked_location
    }

    pub fn toggle_measurement(&mut self) -> MeasureState {
        let state = self.measurement.toggle();
        tracing::debug!("measurement {:?}", state);
        state
    }

    pub fn add_measure_point(&mut self, point: Coordinate) -> bool {
        self.measurement.add_point(point)
    }

    pub fn clear_measurement(&mut self) {
        self.measurement.clear();
    }

    pub fn measurement(&self) -> &MeasurementSession {
        &self.measurement
    }

    pub fn measurement_summary(&self) -> MeasurementResponse {
        let path = self.measurement.points().to_vec();
        let gpx_base64 = if path.len() > 1 {
            transfer::encode_track_as_gpx(&path)
                .map_err(|err| tracing::warn!("could not encode measurement track: {err}"))
                .ok()
        } else {
            None
        };
        MeasurementResponse {
            measuring: self.measurement.is_measuring(),
            distance_km: self.measurement.total_length_km(),
            path,
            gpx_base64,
        }
    }

    // --- bulk import ---

    pub fn import_json(&mut self, text: &str, mode: ImportMode) -> Result<ImportSummary, MapperError> {
        let parsed = transfer::import_json(text)?;
        Ok(self.apply_import(parsed, mode))
    }

    /// CSV never fails. Text without a line break has no data section and
    /// leaves the registry alone; anything longer applies `mode` like a JSON
    /// import, so a header line plus newline with `Replace` empties it.
    pub fn import_csv(&mut self, text: &str, mode: ImportMode) -> ImportSummary {
        if !text.contains('\n') {
            tracing::info!("CSV import has no data section, nothing to do");
            return ImportSummary {
                mode,
                imported: 0,
                skipped: 0,
                total: self.registry.len(),
            };
        }
        self.apply_import(transfer::import_csv(text), mode)
    }

    fn apply_import(&mut self, parsed: ParsedImport, mode: ImportMode) -> ImportSummary {
        let skipped = parsed.skipped;
        let imported = transfer::merge_into(&mut self.registry, parsed.sites, mode);
        self.heal_views();
        self.persist(Slot::Sites);
        tracing::info!(
            "imported {} site(s) ({:?}), skipped {}, registry now {}",
            imported,
            mode,
            skipped,
            self.registry.len()
        );
        ImportSummary {
            mode,
            imported,
            skipped,
            total: self.registry.len(),
        }
    }

    fn heal_views(&mut self) {
        if let Some(id) = &self.selected_site {
            if !self.registry.contains(id) {
                self.selected_site = None;
            }
        }
        if let Some(edit) = &self.edit {
            if !self.registry.contains(&edit.site_id) {
                self.edit = None;
            }
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            language: self.language,
            rtl: self.language.is_rtl(),
            site_count: self.registry.len(),
            selected_site: self.selected_site().cloned(),
            editing: self.edit.as_ref().map(|edit| edit.site_id.clone()),
            selected_region: self.selected_region().cloned(),
            user_location: self.user_location,
            customer_location: self.customer.clone(),
            picked_location: self.picked_location,
            visible_types: self.visible_types.iter().cloned().collect(),
            measurement: self.measurement_summary(),
        }
    }

    // --- persistence ---

    fn key(&self, slot: Slot) -> String {
        format!("{}_{}", self.namespace, slot.suffix())
    }

    fn read(&self, slot: Slot) -> Option<String> {
        let key = self.key(slot);
        self.store.get(&key).unwrap_or_else(|err| {
            tracing::warn!("could not read {key}: {err}");
            None
        })
    }

    fn encode(&self, slot: Slot) -> Result<Option<String>, serde_json::Error> {
        Ok(match slot {
            Slot::Sites => Some(serde_json::to_string(self.registry.sites())?),
            Slot::Language => Some(self.language.code().to_string()),
            Slot::Regions => Some(serde_json::to_string(self.regions.regions())?),
            Slot::Customer => self
                .customer
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        })
    }

    fn persist(&self, slot: Slot) {
        let key = self.key(slot);
        let outcome = match self.encode(slot) {
            Ok(Some(text)) => self.store.set(&key, &text),
            Ok(None) => self.store.delete(&key),
            Err(err) => {
                tracing::warn!("could not encode {key}: {err}");
                return;
            }
        };
        if let Err(err) = outcome {
            tracing::warn!("could not persist {key}: {err}");
        }
    }
}

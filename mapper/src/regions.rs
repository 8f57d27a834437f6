use shared::{Region, RegionDraft};

use crate::{
    error::MapperError,
    registry::{checked_latitude, checked_longitude, checked_name},
};

pub const DEFAULT_ZOOM: u32 = 6;

/// Built-in country presets: name, code, center lat, center lng, zoom.
const COUNTRY_PRESETS: [(&str, &str, f64, f64, u32); 22] = [
    ("Libya", "LY", 26.3351, 17.2283, 6),
    ("United States", "US", 37.0902, -95.7129, 4),
    ("United Kingdom", "GB", 55.3781, -3.436, 6),
    ("Germany", "DE", 51.1657, 10.4515, 6),
    ("France", "FR", 46.2276, 2.2137, 6),
    ("Italy", "IT", 41.8719, 12.5674, 6),
    ("Spain", "ES", 40.4637, -3.7492, 6),
    ("India", "IN", 20.5937, 78.9629, 5),
    ("Brazil", "BR", -14.235, -51.9253, 4),
    ("Australia", "AU", -25.2744, 133.7751, 4),
    ("Japan", "JP", 36.2048, 138.2529, 5),
    ("Canada", "CA", 56.1304, -106.3468, 3),
    ("Mexico", "MX", 23.6345, -102.5528, 5),
    ("Egypt", "EG", 26.8206, 30.8025, 6),
    ("Tunisia", "TN", 33.8869, 9.5375, 7),
    ("Algeria", "DZ", 28.0339, 1.6596, 5),
    ("Morocco", "MA", 31.7917, -7.0926, 6),
    ("South Africa", "ZA", -30.5595, 22.9375, 5),
    ("Nigeria", "NG", 9.082, 8.6753, 6),
    ("Turkey", "TR", 38.9637, 35.2433, 6),
    ("Saudi Arabia", "SA", 23.8859, 45.0792, 5),
    ("UAE", "AE", 23.4241, 53.8478, 7),
];

#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl RegionCatalog {
    pub fn seeded() -> Self {
        let regions = COUNTRY_PRESETS
            .iter()
            .map(|&(name, code, lat, lng, zoom)| Region {
                name: name.to_string(),
                code: code.to_string(),
                center: [lat, lng],
                zoom,
            })
            .collect();
        Self { regions }
    }

    /// Restores a persisted catalog. Later duplicates of a code replace
    /// earlier ones.
    pub fn from_regions(regions: Vec<Region>) -> Self {
        let mut catalog = Self::default();
        for region in regions {
            catalog.upsert(region);
        }
        catalog
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn first(&self) -> Option<&Region> {
        self.regions.first()
    }

    pub fn find_by_code(&self, code: &str) -> Option<&Region> {
        let code = code.trim();
        self.regions
            .iter()
            .find(|region| region.code.eq_ignore_ascii_case(code))
    }

    pub fn add(&mut self, draft: RegionDraft) -> Result<Region, MapperError> {
        let name = checked_name(&draft.name)?;
        let lat = checked_latitude(draft.lat)?;
        let lng = checked_longitude(draft.lng)?;
        let zoom = draft
            .zoom
            .filter(|z| *z >= 0.0)
            .map(|z| z.floor() as u32)
            .unwrap_or(DEFAULT_ZOOM);
        let code = draft
            .code
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| derive_code(&name));

        let region = Region {
            name,
            code,
            center: [lat, lng],
            zoom,
        };
        self.upsert(region.clone());
        Ok(region)
    }

    fn upsert(&mut self, region: Region) {
        match self
            .regions
            .iter_mut()
            .find(|existing| existing.code.eq_ignore_ascii_case(&region.code))
        {
            Some(existing) => {
                tracing::warn!(
                    "region code {} already used by {}, replacing with {}",
                    region.code,
                    existing.name,
                    region.name
                );
                *existing = region;
            }
            None => self.regions.push(region),
        }
    }
}

fn derive_code(name: &str) -> String {
    name.chars().take(2).collect::<String>().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, lat: Option<f64>, lng: Option<f64>, zoom: Option<f64>) -> RegionDraft {
        RegionDraft {
            name: name.into(),
            code: None,
            lat,
            lng,
            zoom,
        }
    }

    #[test]
    fn seeded_catalog_has_presets() {
        let catalog = RegionCatalog::seeded();
        assert_eq!(catalog.len(), 22);
        assert_eq!(catalog.first().unwrap().code, "LY");
        let tunisia = catalog.find_by_code("tn").unwrap();
        assert_eq!(tunisia.zoom, 7);
        assert_eq!(tunisia.center, [33.8869, 9.5375]);
    }

    #[test]
    fn add_derives_code_and_default_zoom() {
        let mut catalog = RegionCatalog::default();
        let region = catalog
            .add(draft("kenya", Some(-0.02), Some(37.9), None))
            .unwrap();
        assert_eq!(region.code, "KE");
        assert_eq!(region.zoom, DEFAULT_ZOOM);
        assert_eq!(catalog.find_by_code("KE"), Some(&region));
    }

    #[test]
    fn add_truncates_fractional_zoom_and_ignores_negative() {
        let mut catalog = RegionCatalog::default();
        assert_eq!(
            catalog
                .add(draft("Chad", Some(15.4), Some(18.7), Some(7.8)))
                .unwrap()
                .zoom,
            7
        );
        assert_eq!(
            catalog
                .add(draft("Niger", Some(17.6), Some(8.1), Some(-3.0)))
                .unwrap()
                .zoom,
            DEFAULT_ZOOM
        );
    }

    #[test]
    fn add_rejects_invalid_drafts() {
        let mut catalog = RegionCatalog::default();
        assert!(matches!(
            catalog.add(draft("", Some(1.0), Some(1.0), None)),
            Err(MapperError::Validation { field: "name", .. })
        ));
        assert!(matches!(
            catalog.add(draft("Oman", None, Some(57.0), None)),
            Err(MapperError::Validation { field: "lat", .. })
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn duplicate_code_replaces_earlier_entry() {
        let mut catalog = RegionCatalog::seeded();
        let before = catalog.len();
        let mut unicorn = draft("Unicorn Land", Some(10.0), Some(10.0), Some(8.0));
        unicorn.code = Some("us".into());
        catalog.add(unicorn).unwrap();
        assert_eq!(catalog.len(), before);
        assert_eq!(catalog.find_by_code("US").unwrap().name, "Unicorn Land");
    }

    #[test]
    fn short_names_still_get_a_code() {
        assert_eq!(derive_code("x"), "X");
        assert_eq!(derive_code("états"), "ÉT");
    }
}

use shared::{CardinalDirection, Coordinate, Heading};

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance using the haversine formula.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    // Absolute deltas keep the result bit-for-bit symmetric.
    let dlat = (b.lat - a.lat).abs().to_radians();
    let dlng = (b.lng - a.lng).abs().to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlng = (dlng / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Initial great-circle bearing from `from` to `to`, clockwise from true
/// north, in `[0, 360)`. Identical points give 0.
pub fn bearing_deg(from: Coordinate, to: Coordinate) -> f64 {
    if from == to {
        return 0.0;
    }
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    let bearing = normalize_bearing(y.atan2(x).to_degrees());
    if bearing.is_finite() { bearing } else { 0.0 }
}

/// Eight 45° sectors centered on each label; N covers `[337.5, 22.5)`.
pub fn cardinal(bearing_deg: f64) -> CardinalDirection {
    let normalized = normalize_bearing(bearing_deg);
    let sector = ((normalized + 22.5) / 45.0).floor() as usize % CardinalDirection::ALL.len();
    CardinalDirection::ALL[sector]
}

pub fn normalize_bearing(bearing_deg: f64) -> f64 {
    let value = bearing_deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.
    if value >= 360.0 { 0.0 } else { value }
}

pub fn heading(from: Coordinate, to: Coordinate) -> Heading {
    let bearing_deg = bearing_deg(from, to);
    Heading {
        distance_km: distance_km(from, to),
        bearing_deg,
        cardinal: cardinal(bearing_deg),
    }
}

pub fn path_length_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| distance_km(w[0], w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng)
    }

    #[test]
    fn test_distance_one_degree_on_equator() {
        let d = distance_km(coord(0.0, 0.0), coord(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_distance_same_point() {
        let point = coord(26.3351, 17.2283);
        assert_eq!(distance_km(point, point), 0.0);
    }

    #[test]
    fn test_distance_symmetry() {
        let a = coord(45.0, 5.0);
        let b = coord(46.0, 6.0);
        assert_eq!(distance_km(a, b), distance_km(b, a));
    }

    #[test]
    fn test_distance_antipodal_is_half_circumference() {
        let d = distance_km(coord(0.0, 0.0), coord(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_bearing_due_north() {
        let b = bearing_deg(coord(0.0, 0.0), coord(1.0, 0.0));
        assert!(b.abs() < 1e-9, "got {b}");
        assert_eq!(cardinal(b), CardinalDirection::N);
    }

    #[test]
    fn test_bearing_due_east() {
        let b = bearing_deg(coord(0.0, 0.0), coord(0.0, 1.0));
        assert!((b - 90.0).abs() < 1e-9, "got {b}");
        assert_eq!(cardinal(b), CardinalDirection::E);
    }

    #[test]
    fn test_bearing_south_and_west() {
        let south = bearing_deg(coord(10.0, 10.0), coord(9.0, 10.0));
        assert!((south - 180.0).abs() < 1e-9);
        let west = bearing_deg(coord(0.0, 10.0), coord(0.0, 9.0));
        assert!((west - 270.0).abs() < 1e-9);
        assert_eq!(cardinal(west), CardinalDirection::W);
    }

    #[test]
    fn test_bearing_identical_points_is_zero() {
        let p = coord(33.8869, 9.5375);
        assert_eq!(bearing_deg(p, p), 0.0);
    }

    #[test]
    fn test_cardinal_sector_edges() {
        assert_eq!(cardinal(0.0), CardinalDirection::N);
        assert_eq!(cardinal(22.49), CardinalDirection::N);
        assert_eq!(cardinal(22.5), CardinalDirection::NE);
        assert_eq!(cardinal(67.5), CardinalDirection::E);
        assert_eq!(cardinal(180.0), CardinalDirection::S);
        assert_eq!(cardinal(225.0), CardinalDirection::SW);
        assert_eq!(cardinal(315.0), CardinalDirection::NW);
        assert_eq!(cardinal(337.49), CardinalDirection::NW);
        assert_eq!(cardinal(337.5), CardinalDirection::N);
        assert_eq!(cardinal(359.99), CardinalDirection::N);
    }

    #[test]
    fn test_cardinal_normalizes_input() {
        assert_eq!(cardinal(-90.0), CardinalDirection::W);
        assert_eq!(cardinal(450.0), CardinalDirection::E);
        assert_eq!(cardinal(720.0), CardinalDirection::N);
    }

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(0.0), 0.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(450.0), 90.0);
        assert_eq!(normalize_bearing(-1e-18), 0.0);
    }

    #[test]
    fn test_heading_bundles_distance_and_direction() {
        let h = heading(coord(0.0, 0.0), coord(0.0, 1.0));
        assert!((h.distance_km - 111.19).abs() < 0.5);
        assert_eq!(h.cardinal, CardinalDirection::E);
    }

    #[test]
    fn test_path_length_short_paths() {
        assert_eq!(path_length_km(&[]), 0.0);
        assert_eq!(path_length_km(&[coord(45.0, 5.0)]), 0.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn valid_coord() -> impl Strategy<Value = Coordinate> {
            (-90.0..=90.0, -180.0..=180.0).prop_map(|(lat, lng)| Coordinate { lat, lng })
        }

        proptest! {
            #[test]
            fn prop_distance_non_negative(a in valid_coord(), b in valid_coord()) {
                prop_assert!(distance_km(a, b) >= 0.0);
            }

            #[test]
            fn prop_distance_symmetric(a in valid_coord(), b in valid_coord()) {
                prop_assert_eq!(distance_km(a, b), distance_km(b, a));
            }

            #[test]
            fn prop_distance_same_point_is_zero(a in valid_coord()) {
                prop_assert_eq!(distance_km(a, a), 0.0);
            }

            #[test]
            fn prop_distance_bounded_by_half_circumference(a in valid_coord(), b in valid_coord()) {
                let max_distance = std::f64::consts::PI * EARTH_RADIUS_KM;
                prop_assert!(distance_km(a, b) <= max_distance + 1e-6);
            }

            #[test]
            fn prop_bearing_in_range(a in valid_coord(), b in valid_coord()) {
                let bearing = bearing_deg(a, b);
                prop_assert!((0.0..360.0).contains(&bearing), "bearing {}", bearing);
                prop_assert!(CardinalDirection::ALL.contains(&cardinal(bearing)));
            }

            #[test]
            fn prop_normalize_bearing_stays_in_range(
                bearing in any::<f64>().prop_filter("finite", |x| x.is_finite())
            ) {
                let normalized = normalize_bearing(bearing);
                prop_assert!(normalized >= 0.0);
                prop_assert!(normalized < 360.0);
            }

            #[test]
            fn prop_path_length_additive(
                first in prop::collection::vec(valid_coord(), 2..5),
                second in prop::collection::vec(valid_coord(), 2..5)
            ) {
                let mut combined = first.clone();
                combined.extend_from_slice(&second);
                let bridge = distance_km(first[first.len() - 1], second[0]);
                let expected = path_length_km(&first) + bridge + path_length_km(&second);
                prop_assert!((path_length_km(&combined) - expected).abs() < 1e-6);
            }
        }
    }
}

//! Geodesic helpers and quantized spatial bucketing.

use addrlink_core::Direction;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Flat-earth approximation, valid for the sub-kilometre offsets that
/// relative-position references describe.
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Linear proximity decay: 1 at zero distance, 0 at `radius_m` and beyond.
pub fn proximity_score(dist_m: f64, radius_m: f64) -> f64 {
    if radius_m <= 0.0 {
        return 0.0;
    }
    (1.0 - dist_m / radius_m).clamp(0.0, 1.0)
}

/// Project a point `dist_m` meters toward `direction`.
pub fn offset_latlon(lat: f64, lon: f64, direction: Direction, dist_m: f64) -> (f64, f64) {
    let (dlat_u, dlon_u) = direction.unit_vector();
    let dlat = dist_m * dlat_u / METERS_PER_DEGREE;
    // Longitude degrees shrink with latitude; the cos floor keeps the
    // projection finite near the poles.
    let dlon = dist_m * dlon_u / (METERS_PER_DEGREE * lat.to_radians().cos().max(0.2));
    (lat + dlat, lon + dlon)
}

/// A quantized spatial cell: lat/lon rounded to `precision` decimal places,
/// stored as integers so neighbor arithmetic is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    lat_q: i64,
    lon_q: i64,
}

impl BucketKey {
    pub fn of(lat: f64, lon: f64, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        Self {
            lat_q: (lat * scale).round() as i64,
            lon_q: (lon * scale).round() as i64,
        }
    }

    /// The cell itself plus its eight spatial neighbors, row-major order.
    pub fn neighborhood(self) -> [BucketKey; 9] {
        let mut out = [self; 9];
        let mut i = 0;
        for dlat in -1..=1i64 {
            for dlon in -1..=1i64 {
                out[i] = BucketKey {
                    lat_q: self.lat_q + dlat,
                    lon_q: self.lon_q + dlon,
                };
                i += 1;
            }
        }
        out
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.lat_q, self.lon_q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // ~0.0001 deg latitude is ~11.1m
        let d = haversine_m(30.0, 120.0, 30.0001, 120.0);
        assert!((d - 11.1).abs() < 0.5, "got {d}");
        assert_eq!(haversine_m(30.0, 120.0, 30.0, 120.0), 0.0);
    }

    #[test]
    fn proximity_decays_linearly() {
        assert_eq!(proximity_score(0.0, 200.0), 1.0);
        assert!((proximity_score(100.0, 200.0) - 0.5).abs() < 1e-12);
        assert_eq!(proximity_score(200.0, 200.0), 0.0);
        assert_eq!(proximity_score(500.0, 200.0), 0.0);
    }

    #[test]
    fn offset_moves_in_the_named_direction() {
        let (lat, lon) = offset_latlon(30.0, 120.0, Direction::East, 50.0);
        assert_eq!(lat, 30.0);
        assert!(lon > 120.0);

        let (lat, lon) = offset_latlon(30.0, 120.0, Direction::Southwest, 50.0);
        assert!(lat < 30.0 && lon < 120.0);
        // Diagonal displacement still totals ~50m
        let d = haversine_m(30.0, 120.0, lat, lon);
        assert!((d - 50.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn bucket_neighborhood_covers_adjacent_cells() {
        let a = BucketKey::of(30.0000, 120.0000, 4);
        let b = BucketKey::of(30.00009, 120.00011, 4);
        assert_ne!(a, b);
        assert!(a.neighborhood().contains(&b));
        assert_eq!(a.neighborhood()[4], a);
    }

    #[test]
    fn bucket_display_is_stable() {
        let key = BucketKey::of(30.1234, 120.5678, 4);
        assert_eq!(key.to_string(), "301234_1205678");
    }
}

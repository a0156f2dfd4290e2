//! Planar geometry over raw latitude/longitude pairs.
//!
//! Distances are plain Euclidean differences in degrees. Longitude is not
//! scaled by latitude, so east-west distances are overstated away from the
//! equator. Nearest-point choices in this crate depend on that metric and it
//! is kept as is.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

pub fn planar_distance(a: Position, b: Position) -> f64 {
    if a == b {
        return 0.0;
    }
    let dlat = b.lat - a.lat;
    let dlon = b.lon - a.lon;
    (dlat * dlat + dlon * dlon).sqrt()
}

/// Picks the candidate closest to the arithmetic mean of all candidates.
///
/// The result is always one of the inputs; on equal distance the earlier
/// candidate wins. Returns `None` for an empty slice.
pub fn pick_position(positions: &[Position]) -> Option<Position> {
    let (first, rest) = positions.split_first()?;

    let mut sum_lat = 0.0;
    let mut sum_lon = 0.0;
    for position in positions {
        sum_lat += position.lat;
        sum_lon += position.lon;
    }
    let count = positions.len() as f64;
    let center = Position::new(sum_lat / count, sum_lon / count);

    let mut best = *first;
    let mut best_distance = planar_distance(center, best);
    for position in rest {
        let distance = planar_distance(center, *position);
        if distance < best_distance {
            best = *position;
            best_distance = distance;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_is_euclidean_in_degrees() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((planar_distance(a, b) - 5.0).abs() < 1e-12);
        assert_eq!(planar_distance(b, b), 0.0);
    }

    #[test]
    fn pick_position_snaps_to_nearest_input() {
        let positions = vec![
            Position::new(10.0, 10.0),
            Position::new(10.0, 12.0),
            Position::new(12.0, 10.0),
        ];
        let picked = pick_position(&positions).unwrap();
        assert_eq!(picked, Position::new(10.0, 10.0));
        assert!(positions.contains(&picked));
    }

    #[test]
    fn pick_position_keeps_first_on_tie() {
        let positions = vec![Position::new(0.0, 0.0), Position::new(2.0, 2.0)];
        assert_eq!(pick_position(&positions), Some(Position::new(0.0, 0.0)));
    }

    #[test]
    fn pick_position_single_and_empty() {
        let only = Position::new(55.7, 13.2);
        assert_eq!(pick_position(&[only]), Some(only));
        assert_eq!(pick_position(&[]), None);
    }
}

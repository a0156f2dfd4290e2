use crate::geometry::{planar_distance, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStreet {
    pub place: String,
    pub street: String,
    pub house_number: String,
    pub position: Position,
}

/// Linear scan for the place closest to `position`; the first place wins
/// when two are equally close.
pub fn nearest_place(position: Position, places: &[ResolvedPlace]) -> Option<&ResolvedPlace> {
    let mut best: Option<(&ResolvedPlace, f64)> = None;
    for place in places {
        let distance = planar_distance(position, place.position);
        match best {
            None => best = Some((place, distance)),
            Some((_, best_distance)) if distance < best_distance => {
                best = Some((place, distance))
            }
            _ => {}
        }
    }
    best.map(|(place, _)| place)
}

/// Turns a fallback feature into a street of its nearest place. The street
/// keeps its own position.
pub fn assign_to_nearest_place(
    name: &str,
    house_number: &str,
    position: Position,
    places: &[ResolvedPlace],
) -> Option<ResolvedStreet> {
    nearest_place(position, places).map(|place| ResolvedStreet {
        place: place.name.clone(),
        street: name.to_string(),
        house_number: house_number.to_string(),
        position,
    })
}

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use storyworld_core::{GeoCoordinate, Genre, PlacementRecord, Rarity};
use storyworld_system_dedup::{Config, SpatialGridDedup};

const MIN_DISTANCE: f64 = 40.0;

#[test]
fn accepted_placements_keep_their_distance_within_each_cell() {
    let mut dedup = SpatialGridDedup::new(Config::new(100.0, MIN_DISTANCE).expect("valid config"));
    let mut rng = ChaCha8Rng::seed_from_u64(0xdecaf);
    let mut accepted = 0;

    // Roughly a 1 km square around Seoul City Hall.
    for _ in 0..5_000 {
        let location = GeoCoordinate::new(
            rng.gen_range(37.562..37.571),
            rng.gen_range(126.972..126.984),
        );
        let record = PlacementRecord::new(Genre::Comedy, Rarity::Common, location);
        if dedup.accept(&record) {
            accepted += 1;
        }
    }

    assert!(accepted > 0);
    assert!(accepted < 5_000, "dense sampling must trigger rejections");
    assert_eq!(dedup.len(), accepted);

    for (key, locations) in dedup.cells() {
        for (index, a) in locations.iter().enumerate() {
            for b in &locations[index + 1..] {
                let distance = a.distance_to(*b);
                assert!(
                    distance >= MIN_DISTANCE,
                    "cell {key:?} holds points {distance} m apart"
                );
            }
        }
    }
}

#[test]
fn zero_minimum_distance_accepts_everything() {
    let mut dedup = SpatialGridDedup::new(Config::new(100.0, 0.0).expect("valid config"));
    let location = GeoCoordinate::new(35.0, 139.0);
    assert!(dedup.accept_location(location));
    assert!(dedup.accept_location(location));
    assert_eq!(dedup.len(), 2);
}

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use storyworld_core::{tiles_covering, GeoCoordinate, PlacementRecord, TileCoordinate};
use storyworld_system_dedup as dedup;
use storyworld_system_placement::{Config, PlacementGenerator};

const SEOUL: GeoCoordinate = GeoCoordinate::new(37.5665, 126.9780);

fn generator(probability: f64, min_distance: f64) -> PlacementGenerator {
    PlacementGenerator::new(
        Config::new(probability).expect("valid probability"),
        dedup::Config::new(100.0, min_distance).expect("valid spacing"),
    )
    .expect("production tables are valid")
}

fn search_area() -> BTreeSet<TileCoordinate> {
    tiles_covering(SEOUL, 1_240.0, 18)
}

#[test]
fn every_placement_lies_inside_its_tile() {
    let mut generator = generator(1.0, 0.0);
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    for tile in search_area() {
        let record = generator
            .generate_tile(tile, &mut rng)
            .expect("probability one with no spacing always places");
        assert!(tile.bounds().contains(record.location()));
        assert_eq!(TileCoordinate::containing(record.location(), 18), tile);
    }
}

#[test]
fn probability_zero_generates_nothing() {
    let mut generator = generator(0.0, 0.0);
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    assert!(generator.generate(search_area(), &mut rng).is_empty());
    assert!(generator.spacing().is_empty());
}

#[test]
fn probability_thins_out_the_world() {
    let mut generator = generator(0.6, 0.0);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let tiles = tiles_covering(SEOUL, 10_000.0, 18);
    let placements = generator.generate(tiles.iter().copied(), &mut rng);

    let ratio = placements.len() as f64 / tiles.len() as f64;
    assert!((ratio - 0.6).abs() < 0.05, "placement ratio was {ratio}");
}

#[test]
fn identical_seeds_generate_identical_worlds() {
    let first = generator(0.6, 50.0).generate(search_area(), &mut ChaCha8Rng::seed_from_u64(9));
    let second = generator(0.6, 50.0).generate(search_area(), &mut ChaCha8Rng::seed_from_u64(9));
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn spacing_rejects_placements_crowding_a_primed_world() {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let mut first = generator(1.0, 0.0);
    let existing: Vec<PlacementRecord> = first.generate(search_area(), &mut rng);

    // A generator primed with the same placements and a huge spacing radius
    // must reject anything landing in an occupied bucket.
    let mut primed = generator(1.0, 10_000.0);
    primed.prime_spacing(&existing);
    let mut replay = ChaCha8Rng::seed_from_u64(4);
    let regenerated = primed.generate(search_area(), &mut replay);
    assert!(regenerated.is_empty(), "identical locations must be rejected");

    primed.reset_spacing();
    assert!(primed.spacing().is_empty());
    let mut replay = ChaCha8Rng::seed_from_u64(4);
    let after_reset = primed.generate(search_area(), &mut replay);
    assert_eq!(after_reset.first(), existing.first());
}

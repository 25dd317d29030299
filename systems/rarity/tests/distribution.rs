use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use storyworld_core::{Genre, Rarity};
use storyworld_system_rarity::{genre_table, rarity_table};

const SAMPLES: usize = 100_000;
const TOLERANCE: f64 = 0.01;

#[test]
fn rarity_frequencies_match_configured_weights() {
    let table = rarity_table().expect("rarity table");
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed_cafe);
    let mut counts: HashMap<Rarity, usize> = HashMap::new();

    for _ in 0..SAMPLES {
        *counts.entry(table.sample_with(&mut rng)).or_default() += 1;
    }

    for rarity in Rarity::ALL {
        let observed = counts.get(&rarity).copied().unwrap_or(0) as f64 / SAMPLES as f64;
        assert!(
            (observed - rarity.probability()).abs() <= TOLERANCE,
            "{rarity}: observed {observed}, expected {}",
            rarity.probability()
        );
    }
}

#[test]
fn genres_are_sampled_uniformly() {
    let table = genre_table().expect("genre table");
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut counts: HashMap<Genre, usize> = HashMap::new();

    for _ in 0..SAMPLES {
        *counts.entry(table.sample_with(&mut rng)).or_default() += 1;
    }

    assert_eq!(counts.len(), Genre::ALL.len(), "every genre should appear");
    for genre in Genre::ALL {
        let observed = counts[&genre] as f64 / SAMPLES as f64;
        assert!(
            (observed - 0.125).abs() <= TOLERANCE,
            "{genre}: observed {observed}"
        );
    }
}

#[test]
fn identical_seeds_sample_identical_sequences() {
    let table = rarity_table().expect("rarity table");
    let mut first = ChaCha8Rng::seed_from_u64(7);
    let mut second = ChaCha8Rng::seed_from_u64(7);

    let a: Vec<Rarity> = (0..1_000).map(|_| table.sample_with(&mut first)).collect();
    let b: Vec<Rarity> = (0..1_000).map(|_| table.sample_with(&mut second)).collect();
    assert_eq!(a, b);
}

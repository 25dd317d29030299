#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Weighted selection tables used to roll placement genres and rarities.

use rand::Rng;
use storyworld_core::{ConfigurationError, Genre, Rarity};

/// Largest deviation from 1.0 tolerated by [`WeightedTable::normalized`].
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Ordered list of categories with selection weights.
///
/// Sampling partitions `[0, total)` into contiguous bands in list order, one
/// band per entry, each as wide as the entry's weight.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedTable<T> {
    entries: Vec<(T, f64)>,
    total: f64,
}

impl<T: Copy> WeightedTable<T> {
    /// Builds a table from `(category, weight)` pairs.
    ///
    /// Weights do not need to be normalized, but must be finite and
    /// non-negative, and at least one must be positive.
    pub fn new(entries: Vec<(T, f64)>) -> Result<Self, ConfigurationError> {
        if entries.is_empty() {
            return Err(ConfigurationError::EmptyTable);
        }

        let mut total = 0.0;
        for (index, (_, weight)) in entries.iter().enumerate() {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigurationError::InvalidWeight {
                    index,
                    weight: *weight,
                });
            }
            total += weight;
        }

        if total <= 0.0 {
            return Err(ConfigurationError::ZeroTotalWeight);
        }

        Ok(Self { entries, total })
    }

    /// Builds a table whose weights are probabilities summing to 1.0.
    pub fn normalized(entries: Vec<(T, f64)>) -> Result<Self, ConfigurationError> {
        let table = Self::new(entries)?;
        if (table.total - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(ConfigurationError::Unnormalized { sum: table.total });
        }
        Ok(table)
    }

    /// Returns the category whose band contains `uniform * total_weight`.
    ///
    /// `uniform` is expected in `[0, 1)`. When no band matches (a value of
    /// 1.0 or more, NaN, or rounding at the upper edge) the first category is
    /// returned.
    #[must_use]
    pub fn sample(&self, uniform: f64) -> T {
        let target = uniform * self.total;
        let mut upper = 0.0;
        for (category, weight) in &self.entries {
            upper += weight;
            if target < upper {
                return *category;
            }
        }
        self.entries[0].0
    }

    /// Draws a uniform value from `rng` and samples the table with it.
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.sample(rng.gen::<f64>())
    }

    /// Sum of every weight in the table.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.total
    }

    /// Number of categories in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; empty tables are rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterator over the `(category, weight)` pairs in band order.
    pub fn iter(&self) -> impl Iterator<Item = (T, f64)> + '_ {
        self.entries.iter().copied()
    }
}

/// Production rarity table built from [`Rarity::probability`].
pub fn rarity_table() -> Result<WeightedTable<Rarity>, ConfigurationError> {
    WeightedTable::normalized(
        Rarity::ALL
            .into_iter()
            .map(|rarity| (rarity, rarity.probability()))
            .collect(),
    )
}

/// Production genre table: every genre equally likely.
pub fn genre_table() -> Result<WeightedTable<Genre>, ConfigurationError> {
    let weight = 1.0 / Genre::ALL.len() as f64;
    WeightedTable::normalized(Genre::ALL.into_iter().map(|genre| (genre, weight)).collect())
}

//! Plain-text rendering of world events and collection entries.

use storyworld_core::{Event, InteractionTier, OwnedCollectible, PlacementRecord};
use storyworld_system_catalog::poster_url;

/// One line summarizing `event`.
pub(crate) fn describe_event(event: &Event) -> String {
    match event {
        Event::TileStored { tile, placements } => {
            format!("tile {tile} generated with {placements} placement(s)")
        }
        Event::TileAlreadyCached { tile } => format!("tile {tile} already cached"),
        Event::TileShown { tile, placements } => {
            let markers: Vec<String> = placements.iter().map(describe_placement).collect();
            if markers.is_empty() {
                format!("tile {tile} shown (empty)")
            } else {
                format!("tile {tile} shown: {}", markers.join("; "))
            }
        }
        Event::TileHidden { tile } => format!("tile {tile} hidden"),
        Event::CacheCleared { at } => format!("cache cleared at {}ms", at.as_millis()),
        Event::CacheExpired { at } => format!("cache expired at {}ms", at.as_millis()),
        Event::CollectibleAdded { id } => format!("collectible {id} added"),
        Event::CollectibleAlreadyOwned { id } => format!("collectible {id} already owned"),
        Event::CollectibleRemoved { id } => format!("collectible {id} removed"),
    }
}

pub(crate) fn describe_placement(placement: &PlacementRecord) -> String {
    let location = placement.location();
    format!(
        "{} {} at ({:.6}, {:.6})",
        placement.rarity(),
        placement.genre(),
        location.latitude(),
        location.longitude()
    )
}

pub(crate) fn describe_tier(tier: InteractionTier) -> &'static str {
    match tier {
        InteractionTier::Direct => "in range: collecting",
        InteractionTier::PremiumRequired => "nearby: a premium subscription is required to collect",
        InteractionTier::AdRequired => "out of range: watch an ad to collect",
    }
}

pub(crate) fn describe_collectible(item: &OwnedCollectible) -> String {
    let poster = item
        .poster_ref
        .as_deref()
        .map(poster_url)
        .unwrap_or_else(|| String::from("no poster"));
    format!(
        "#{} {} [{} {}] {}",
        item.id, item.title, item.rarity, item.genre, poster
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyworld_core::{GeoCoordinate, Genre, Rarity, TileCoordinate, Timestamp};

    #[test]
    fn events_render_with_canonical_tile_keys() {
        let tile = TileCoordinate::new(1, 2, 3).expect("valid tile");
        assert_eq!(
            describe_event(&Event::TileStored {
                tile,
                placements: 1
            }),
            "tile 1-2-3 generated with 1 placement(s)"
        );
        assert_eq!(
            describe_event(&Event::CacheExpired {
                at: Timestamp::from_millis(42)
            }),
            "cache expired at 42ms"
        );
    }

    #[test]
    fn shown_tiles_list_their_markers() {
        let tile = TileCoordinate::new(0, 0, 1).expect("valid tile");
        let placement =
            PlacementRecord::new(Genre::Comedy, Rarity::Rare, GeoCoordinate::new(1.5, -2.25));
        assert_eq!(
            describe_event(&Event::TileShown {
                tile,
                placements: vec![placement]
            }),
            "tile 0-0-1 shown: Rare Comedy at (1.500000, -2.250000)"
        );
    }

    #[test]
    fn collectibles_link_their_posters() {
        let item = OwnedCollectible {
            id: 11,
            title: String::from("Star Wars"),
            genre: Genre::SciFiFantasy,
            rarity: Rarity::Epic,
            location: GeoCoordinate::new(0.0, 0.0),
            poster_ref: Some(String::from("/sw.jpg")),
        };
        assert_eq!(
            describe_collectible(&item),
            "#11 Star Wars [Epic Sci-Fi & Fantasy] https://image.tmdb.org/t/p/w500/sw.jpg"
        );
    }
}

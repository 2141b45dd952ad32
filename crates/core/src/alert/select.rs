use crate::domain::catalog::{StockRecommendation, VolumeLeader};
use rand::seq::IndexedRandom;
use rand::Rng;

pub const PICK_SIZE: usize = 3;
pub const TOP_VOLUME_SIZE: usize = 3;

/// Uniform random subset of `min(n, len)` distinct entries.
pub fn pick_recommendations<R: Rng + ?Sized>(
    catalog: &[StockRecommendation],
    n: usize,
    rng: &mut R,
) -> Vec<StockRecommendation> {
    catalog.choose_multiple(rng, n).cloned().collect()
}

/// First `n` entries in catalog order. The volume list is already ranked.
pub fn top_volume(catalog: &[VolumeLeader], n: usize) -> Vec<VolumeLeader> {
    catalog.iter().take(n).cloned().collect()
}

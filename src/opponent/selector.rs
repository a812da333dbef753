use rand::Rng;
use std::ops::Range;

use super::groups::OpponentGroupTable;

/// Uniformly picks a rank from `window`, never returning `own_rank`
pub fn pick_in_window<R: Rng + ?Sized>(window: Range<u64>, own_rank: u64, rng: &mut R) -> Option<u64> {
    if window.is_empty() {
        return None;
    }

    let own_inside = window.contains(&own_rank);
    let candidates = window.end - window.start - u64::from(own_inside);
    if candidates == 0 {
        return None;
    }

    let picked = window.start + rng.random_range(0..candidates);
    if own_inside && picked >= own_rank {
        Some(picked + 1)
    } else {
        Some(picked)
    }
}

/// One independent draw per weight class; classes may share an opponent
pub fn pick_ranks<R: Rng + ?Sized>(
    table: &OpponentGroupTable,
    population: u64,
    own_rank: u64,
    rng: &mut R,
) -> Vec<(u8, Option<u64>)> {
    table
        .groups()
        .iter()
        .map(|group| {
            let window = group.rank_window(population);
            (group.id, pick_in_window(window, own_rank, rng))
        })
        .collect()
}

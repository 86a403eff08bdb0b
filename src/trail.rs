//! Redundant-delivery selection.
//!
//! The carrier drops packets silently, so every outbound batch
//! re-sends a trail of prior messages: the most recent few in order
//! (the serial trail) and a handful sampled from a wider window behind
//! them (the scatter trail). Receivers deduplicate by message index,
//! so a lost packet is healed by any later batch that happens to carry
//! the missing indices.

use rand::RngCore;
use smallvec::SmallVec;

use crate::protocol::{TRAIL_MAX, TRAIL_SCATTER_DISTANCE, TRAIL_SCATTER_SIZE, TRAIL_SERIAL_SIZE};

/// Queue indices selected for re-sending, serial picks first.
pub type TrailIndices = SmallVec<[i64; TRAIL_MAX]>;

/// Selects the indices to re-send alongside a batch whose first new
/// message sits at `index`.
///
/// The serial trail is the [`TRAIL_SERIAL_SIZE`] messages directly
/// preceding `index`, in order; it is only emitted once the queue is
/// that deep. The scatter trail samples up to [`TRAIL_SCATTER_SIZE`]
/// indices with replacement from the window of
/// [`TRAIL_SCATTER_DISTANCE`] messages behind the serial trail.
/// Sampling is deterministic for a given generator state.
pub fn select<R: RngCore>(rng: &mut R, index: i64) -> TrailIndices {
    debug_assert!(index >= 0);

    let mut picks = TrailIndices::new();

    let recent = index.min(TRAIL_SERIAL_SIZE);
    if recent == TRAIL_SERIAL_SIZE {
        for i in (index - recent)..index {
            picks.push(i);
        }
    }

    let begin = (index - TRAIL_SCATTER_DISTANCE).max(0);
    let end = index - recent;
    let span = end - begin;
    let samples = TRAIL_SCATTER_SIZE.min(span);
    for _ in 0..samples {
        picks.push(begin + (rng.next_u64() % span as u64) as i64);
    }

    picks
}

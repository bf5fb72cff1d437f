//! In-memory learned sort over a slice of embeddings.
//!
//! A CDF model trained on a sample of the slice scatters every element into
//! one of `fanout` ordered segments (a stable counting scatter). Segments are
//! sorted individually, then a bounded insertion pass repairs whatever
//! cross-segment disorder the model left behind. If the repair budget runs
//! out, the slice is finished with a comparison sort.
//!
//! Elements with equal keys keep their relative order through every step.

use std::cmp::Ordering;

use super::key::Embedding;
use super::rmi::{CdfModel, RmiParams, TrainReport};

/// Slices this short skip the model and go straight to insertion sort.
pub const MIN_LEARNED_SORT: usize = RmiParams::DEFAULT_THRESHOLD;

/// Statistics of one learned-sort call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnedSortStats {
    /// Present when a model was trained.
    pub report: Option<TrainReport>,
    /// Number of scatter segments.
    pub segments: usize,
    /// Element moves spent in the repair pass.
    pub repair_moves: usize,
    /// True when the repair budget ran out and a comparison sort finished the job.
    pub fell_back: bool,
}

/// Sort `data` by full key.
pub fn learned_sort(data: &mut [Embedding<'_>], params: &RmiParams) -> LearnedSortStats {
    let n = data.len();
    let mut stats = LearnedSortStats::default();
    if n < 2 {
        return stats;
    }
    if n <= MIN_LEARNED_SORT {
        insertion_sort(data);
        return stats;
    }

    let mut model = CdfModel::new(*params);
    let report = model.train(data);
    let used = *model.params();

    let segments = used.fanout.clamp(1, n);
    let targets: Vec<u32> = data
        .iter()
        .map(|e| model.predict(e.converted_key, segments) as u32)
        .collect();

    // Segment boundaries from predicted counts.
    let mut bounds = vec![0usize; segments + 1];
    for &t in &targets {
        bounds[t as usize + 1] += 1;
    }
    for i in 1..=segments {
        bounds[i] += bounds[i - 1];
    }

    let mut scattered = vec![Embedding::default(); n];
    let mut cursor = bounds[..segments].to_vec();
    for (e, &t) in data.iter().zip(&targets) {
        let slot = &mut cursor[t as usize];
        scattered[*slot] = *e;
        *slot += 1;
    }
    drop(targets);

    for w in bounds.windows(2) {
        let segment = &mut scattered[w[0]..w[1]];
        if segment.len() <= used.threshold {
            insertion_sort(segment);
        } else {
            segment.sort_by(|a, b| a.cmp_key(b));
        }
    }
    data.copy_from_slice(&scattered);
    drop(scattered);

    let (moves, complete) = bounded_insertion_sort(data, n);
    if !complete {
        data.sort_by(|a, b| a.cmp_key(b));
    }

    stats.report = Some(report);
    stats.segments = segments;
    stats.repair_moves = moves;
    stats.fell_back = !complete;
    stats
}

/// Stable insertion sort by full key.
pub fn insertion_sort(data: &mut [Embedding<'_>]) {
    bounded_insertion_sort(data, usize::MAX);
}

/// Insertion sort that gives up after `budget` element moves.
/// Returns the moves made and whether the slice is fully sorted.
fn bounded_insertion_sort(data: &mut [Embedding<'_>], budget: usize) -> (usize, bool) {
    let mut moves = 0usize;
    for i in 1..data.len() {
        let cur = data[i];
        let mut j = i;
        while j > 0 && data[j - 1].cmp_key(&cur) == Ordering::Greater {
            if moves == budget {
                data[j] = cur;
                return (moves, false);
            }
            data[j] = data[j - 1];
            j -= 1;
            moves += 1;
        }
        data[j] = cur;
    }
    (moves, true)
}

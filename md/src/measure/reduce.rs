//! Order-fixed tree reductions.
//!
//! Values are summed pairwise inside blocks of [`BLOCK_SIZE`], then the block sums are
//! folded the same way. The order of additions depends only on the input length, so
//! results are identical for any number of rayon workers.

use rayon::prelude::*;
use std::ops::Range;

pub const BLOCK_SIZE: usize = 128;

/// Pairwise in-place fold: stride halves each level until one entry is left.
fn fold_tree<const K: usize>(cache: &mut [[f64; K]]) -> [f64; K] {
    let mut len = cache.len();
    if len == 0 {
        return [0.0; K];
    }
    while len > 1 {
        let half = len.div_ceil(2);
        for i in 0..len / 2 {
            let other = cache[i + half];
            for (acc, v) in cache[i].iter_mut().zip(other) {
                *acc += v;
            }
        }
        len = half;
    }
    cache[0]
}

/// Sum `f(i)` over `0..len`, `K` independent components at a time.
pub fn tree_reduce<const K: usize, F>(len: usize, f: F) -> [f64; K]
where
    F: Fn(usize) -> [f64; K] + Sync,
{
    segment_reduce(0..len, &f)
}

fn segment_reduce<const K: usize, F>(range: Range<usize>, f: &F) -> [f64; K]
where
    F: Fn(usize) -> [f64; K] + Sync,
{
    let end = range.end;
    let starts: Vec<usize> = range.step_by(BLOCK_SIZE).collect();
    let mut blocks: Vec<[f64; K]> = starts
        .into_par_iter()
        .map(|start| {
            let mut cache: Vec<[f64; K]> = (start..(start + BLOCK_SIZE).min(end)).map(f).collect();
            fold_tree(&mut cache)
        })
        .collect();
    fold_tree(&mut blocks)
}

pub fn tree_sum(values: &[f64]) -> f64 {
    tree_reduce::<1, _>(values.len(), |i| [values[i]])[0]
}

/// One tree reduction per contiguous segment `offsets[b]..offsets[b] + counts[b]`.
pub fn segmented_reduce<const K: usize, F>(
    counts: &[usize],
    offsets: &[usize],
    f: F,
) -> Vec<[f64; K]>
where
    F: Fn(usize) -> [f64; K] + Sync,
{
    counts
        .par_iter()
        .zip(offsets.par_iter())
        .map(|(&count, &offset)| segment_reduce(offset..offset + count, &f))
        .collect()
}

//! Exact nearest-neighbour index over a flat, append-ordered vector buffer.
//!
//! Every search is an exhaustive scan computing squared L2 distance against each stored
//! vector, followed by a bounded max-heap selection of the `k` closest entries. Equal
//! distances are ordered by ascending position, so results are fully deterministic.

use crate::config::Number;
use crate::error::{RetrievalError, RetrievalResult};
use crate::vector_ops::squared_l2_simd;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

/// Indexes at least this large compute distances on the rayon pool.
pub const PARALLEL_SCAN_THRESHOLD: usize = 4096;

pub type Vector = Vec<Number>;

/// A search hit: position of the stored vector and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: Number,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: Number,
    position: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    len: usize,
    data: Vec<Number>,
}

impl VectorIndex {
    /// Build an index holding `vectors` at positions `0..N` in input order.
    ///
    /// The dimension is taken from the first vector. An empty input yields an empty
    /// index with no recorded dimension, which answers every query with no hits.
    pub fn build(vectors: Vec<Vector>) -> RetrievalResult<Self> {
        let dimension = vectors.first().map_or(0, Vec::len);
        Self::with_dimension(dimension, vectors)
    }

    /// Build an index whose vectors must all have length `dimension`.
    pub fn with_dimension(dimension: usize, vectors: Vec<Vector>) -> RetrievalResult<Self> {
        let len = vectors.len();
        let mut data = Vec::with_capacity(len * dimension);
        for vector in vectors {
            if vector.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(&vector);
        }
        debug!(target: "ragify::index", "built index: {len} vectors, dimension {dimension}");
        Ok(Self {
            dimension,
            len,
            data,
        })
    }

    /// Rebuild from a row-major buffer of `len * dimension` values.
    pub(crate) fn from_flat(dimension: usize, len: usize, data: Vec<Number>) -> Option<Self> {
        if data.len() != len.checked_mul(dimension)? {
            return None;
        }
        Some(Self {
            dimension,
            len,
            data,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn vector(&self, position: usize) -> Option<&[Number]> {
        if position >= self.len {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    pub fn as_flat(&self) -> &[Number] {
        &self.data
    }

    /// Return the `k` stored vectors closest to `query`, ascending by distance and then
    /// by position. Fewer than `k` hits come back when the index holds fewer vectors.
    pub fn search(&self, query: &[Number], k: usize) -> RetrievalResult<Vec<Neighbor>> {
        if self.is_empty() && self.dimension == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let distances: Vec<Number> = if self.len >= PARALLEL_SCAN_THRESHOLD {
            (0..self.len)
                .into_par_iter()
                .map(|i| squared_l2_simd(query, self.row(i)))
                .collect()
        } else {
            (0..self.len)
                .map(|i| squared_l2_simd(query, self.row(i)))
                .collect()
        };

        Ok(select_top_k(distances, k))
    }

    fn row(&self, position: usize) -> &[Number] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }
}

fn select_top_k(distances: Vec<Number>, k: usize) -> Vec<Neighbor> {
    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k.min(distances.len()) + 1);

    for (position, distance) in distances.into_iter().enumerate() {
        let candidate = Candidate { distance, position };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|c| Neighbor {
            position: c.position,
            distance: c.distance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::vector_ops::squared_l2_scalar;
    use rand::prelude::*;
    use rand_distr::StandardNormal;

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.sample(StandardNormal)).collect())
            .collect()
    }

    #[test]
    fn build_rejects_mixed_dimensions() {
        let err = VectorIndex::build(vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    }

    #[test]
    fn search_rejects_wrong_query_length() {
        let index = VectorIndex::build(vec![vec![0.0; 4], vec![1.0; 4]]).unwrap();
        let err = index.search(&[0.0; 3], 1).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = VectorIndex::build(Vec::new()).unwrap();
        assert!(index.search(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());

        let sized = VectorIndex::with_dimension(3, Vec::new()).unwrap();
        assert!(sized.search(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());
        assert!(sized.search(&[1.0], 5).is_err());
    }

    #[test]
    fn k_larger_than_len_returns_everything_sorted() {
        let index =
            VectorIndex::build(vec![vec![3.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]]).unwrap();
        let hits = index.search(&[0.0, 0.0], 10).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(hits[2].distance, 9.0);
    }

    #[test]
    fn ties_break_by_position() {
        let index = VectorIndex::build(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
            vec![0.0, -1.0],
        ])
        .unwrap();
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn k_zero_yields_no_hits() {
        let index = VectorIndex::build(vec![vec![1.0]]).unwrap();
        assert!(index.search(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn matches_full_sort_on_random_data() {
        let vectors = random_vectors(300, 24, 7);
        let query = random_vectors(1, 24, 99).remove(0);
        let index = VectorIndex::build(vectors.clone()).unwrap();

        let mut expected: Vec<(usize, Number)> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2_scalar(&query, v)))
            .collect();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let hits = index.search(&query, 10).unwrap();
        assert_eq!(hits.len(), 10);
        for (hit, (position, distance)) in hits.iter().zip(expected.iter()) {
            assert_eq!(hit.position, *position);
            assert!((hit.distance - distance).abs() < 1e-3);
        }
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn parallel_scan_matches_full_sort_over_every_vector() {
        // 20 columns exercise the SIMD tail; repeated rows force distance ties
        let mut vectors = random_vectors(PARALLEL_SCAN_THRESHOLD + 500, 20, 3);
        for position in (0..vectors.len()).step_by(97) {
            vectors[position] = vectors[7].clone();
        }
        let query = random_vectors(1, 20, 4).remove(0);
        let index = VectorIndex::build(vectors.clone()).unwrap();
        assert!(index.len() >= PARALLEL_SCAN_THRESHOLD);

        let mut expected: Vec<(usize, Number)> = vectors
            .iter()
            .enumerate()
            .map(|(position, v)| (position, squared_l2_simd(&query, v)))
            .collect();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let everything: Vec<(usize, Number)> = index
            .search(&query, index.len())
            .unwrap()
            .iter()
            .map(|n| (n.position, n.distance))
            .collect();
        assert_eq!(everything, expected);

        for k in [1, 10, 250] {
            let hits: Vec<(usize, Number)> = index
                .search(&query, k)
                .unwrap()
                .iter()
                .map(|n| (n.position, n.distance))
                .collect();
            assert_eq!(hits.as_slice(), &expected[..k]);
        }

        // The copies of row 7 sit next to each other in ascending position order
        let twin = squared_l2_simd(&query, &vectors[7]);
        let tied: Vec<usize> = everything
            .iter()
            .filter(|(_, d)| d.to_bits() == twin.to_bits())
            .map(|(p, _)| *p)
            .collect();
        assert!(tied.len() > 1);
        assert!(tied.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn vector_accessor_preserves_insertion_order() {
        let index = VectorIndex::build(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(index.vector(1), Some(&[3.0, 4.0][..]));
        assert_eq!(index.vector(2), None);
        assert_eq!(index.as_flat(), &[1.0, 2.0, 3.0, 4.0]);
    }
}

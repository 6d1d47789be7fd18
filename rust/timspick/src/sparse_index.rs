use crate::errors::DataError;
use crate::executor::ParallelExecutor;

/// Compressed sparse mapping from entity ids to runs of member indices.
///
/// Entity `i` owns `values[offsets[i]..offsets[i + 1]]`. The same layout
/// backs every grouping in the pipeline: scans over peaks, clusters over
/// peaks and scans over selected clusters.
///
/// ```
/// use timspick::sparse_index::SparseIndex;
///
/// let index = SparseIndex::new(vec![0, 2, 2, 5], vec![7, 8, 1, 2, 3]);
/// assert_eq!(index.boundaries(0), (0, 2));
/// assert_eq!(index.boundaries(1), (2, 2));
/// assert_eq!(index.members(2).collect::<Vec<_>>(), vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseIndex {
    pub offsets: Vec<usize>,
    pub values: Vec<usize>,
}

impl SparseIndex {
    pub fn new(offsets: Vec<usize>, values: Vec<usize>) -> Self {
        debug_assert!(!offsets.is_empty());
        debug_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        debug_assert_eq!(*offsets.last().unwrap(), values.len());
        Self { offsets, values }
    }

    pub fn num_entities(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Half-open run of entity `id` in the value array. Out-of-range ids
    /// yield the empty `(0, 0)` run.
    pub fn boundaries(&self, id: usize) -> (usize, usize) {
        if id >= self.num_entities() {
            return (0, 0);
        }
        (self.offsets[id], self.offsets[id + 1])
    }

    pub fn entity_size(&self, id: usize) -> usize {
        let (start, end) = self.boundaries(id);
        end - start
    }

    pub fn member_slice(&self, id: usize) -> &[usize] {
        let (start, end) = self.boundaries(id);
        &self.values[start..end]
    }

    pub fn members(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.member_slice(id).iter().copied()
    }

    /// Restriction to `selected_ids`, which become entities `0..len` of the
    /// result in the given order. Member runs are copied over in parallel,
    /// each selected entity owning a disjoint slice of the new value array.
    pub fn filter(
        &self,
        selected_ids: &[usize],
        executor: &ParallelExecutor,
    ) -> Result<SparseIndex, DataError> {
        let num_entities = self.num_entities();
        for &id in selected_ids {
            if id >= num_entities {
                return Err(DataError::IndexOutOfRange {
                    stage: "sparse index filter",
                    index: id,
                    size: num_entities,
                });
            }
        }
        let mut offsets = Vec::with_capacity(selected_ids.len() + 1);
        offsets.push(0);
        let mut total = 0usize;
        for &id in selected_ids {
            total += self.entity_size(id);
            offsets.push(total);
        }
        let mut values = vec![0usize; total];
        executor.run_segments(&offsets, &mut values, "filtering index", |k, seg| {
            seg.copy_from_slice(self.member_slice(selected_ids[k]));
        });
        Ok(SparseIndex::new(offsets, values))
    }
}

/// Expands an offset table into one entity id per value position.
///
/// ```
/// use timspick::sparse_index::explode_offsets;
///
/// assert_eq!(explode_offsets(&[0, 2, 2, 5]), vec![0, 0, 2, 2, 2]);
/// ```
pub fn explode_offsets(offsets: &[usize]) -> Vec<usize> {
    let total = offsets.last().copied().unwrap_or(0);
    let mut expanded = vec![0usize; total];
    for (id, window) in offsets.windows(2).enumerate() {
        for slot in &mut expanded[window[0]..window[1]] {
            *slot = id;
        }
    }
    expanded
}

use crate::acquisition::DiaAcquisition;
use crate::config::ClusteringConfig;
use crate::errors::DataError;
use crate::executor::ParallelExecutor;
use crate::neighbors::{
    IonPairIter,
    NeighborScanIter,
};
use crate::sparse_index::SparseIndex;
use crate::tolerance::{
    FrameIndexTolerance,
    ScanIndexTolerance,
    TofIndexTolerance,
};

/// Groups peaks by steepest ascent on the smoothed intensity landscape.
///
/// Every peak points at the most intense peak inside its window, peaks
/// that are their own maximum become cluster roots, and pointer chains
/// are collapsed so all members of a basin share one root. Clusters
/// smaller than the configured threshold are dropped.
#[derive(Debug)]
pub struct Clusterer<'a> {
    data: &'a DiaAcquisition,
    smooth_intensity_values: &'a [f32],
    tof_window: TofIndexTolerance,
    im_window: ScanIndexTolerance,
    rt_window: FrameIndexTolerance,
    clustering_threshold: u32,
}

impl<'a> Clusterer<'a> {
    pub fn new(
        data: &'a DiaAcquisition,
        smooth_intensity_values: &'a [f32],
        config: &ClusteringConfig,
    ) -> Result<Self, DataError> {
        if smooth_intensity_values.len() != data.num_peaks() {
            return Err(DataError::MismatchedArrayLengths {
                stage: "clustering",
                expected: data.num_peaks(),
                got: smooth_intensity_values.len(),
            });
        }
        Ok(Self {
            data,
            smooth_intensity_values,
            tof_window: TofIndexTolerance::new(&data.mz_axis, config.ppm_tolerance)?,
            im_window: ScanIndexTolerance::new(&data.im_axis, config.im_tolerance)?,
            rt_window: FrameIndexTolerance::cyclic(
                &data.rt_axis,
                config.rt_tolerance,
                data.cycle_length,
            )?,
            clustering_threshold: config.clustering_threshold,
        })
    }

    /// Runs the full clustering pass and returns the surviving clusters
    /// as an index over peak indices.
    pub fn cluster_all_scans(
        &self,
        executor: &ParallelExecutor,
    ) -> Result<SparseIndex, DataError> {
        let mut cluster_pointers: Vec<i64> =
            (0..self.data.num_peaks() as i64).collect();
        executor.run_segments(
            &self.data.scan_offsets,
            &mut cluster_pointers,
            "linking peaks",
            |scan, seg| self.find_most_intense_neighbors(scan, seg),
        );
        let cluster_count = resolve_cluster_paths(&mut cluster_pointers);
        let index = index_clusters(cluster_pointers, cluster_count);
        let selected: Vec<usize> = (0..index.num_entities())
            .filter(|&c| index.entity_size(c) >= self.clustering_threshold as usize)
            .collect();
        index.filter(&selected, executor)
    }

    /// Points every peak of `scan` at the most intense peak inside its
    /// window. `seg` is the scan's slice of the pointer array, values
    /// are global peak indices.
    fn find_most_intense_neighbors(&self, scan: usize, seg: &mut [i64]) {
        if seg.is_empty() {
            return;
        }
        let run1 = self.data.scan_bounds(scan);
        let base = run1.0;
        for rt_scan in
            NeighborScanIter::rt_neighbors(scan, self.data.scans_per_frame, &self.rt_window)
        {
            for other in NeighborScanIter::im_neighbors(
                rt_scan,
                self.data.scans_per_frame,
                &self.im_window,
            ) {
                let run2 = self.data.scan_bounds(other);
                if run2.0 == run2.1 {
                    continue;
                }
                for (index1, index2) in
                    IonPairIter::new(&self.data.tof_indices, &self.tof_window, run1, run2)
                {
                    let pointer = seg[index1 - base] as usize;
                    if self.smooth_intensity_values[pointer]
                        < self.smooth_intensity_values[index2]
                    {
                        seg[index1 - base] = index2 as i64;
                    }
                }
            }
        }
    }
}

/// Collapses pointer chains in place. Chains ending at a self-pointing
/// peak mint a fresh cluster id, encoded as `-(id + 1)`; chains ending
/// at an already resolved peak adopt its id. Every node on a walked
/// path is rewritten to the final id, so later walks stop after one
/// step. Returns the number of clusters.
fn resolve_cluster_paths(clusters: &mut [i64]) -> usize {
    let mut cluster_count = 0usize;
    for start in 0..clusters.len() {
        let mut index_pointer = start as i64;
        let mut pointer = clusters[start];
        let mut path_length = 1usize;
        while pointer >= 0 && index_pointer != pointer {
            index_pointer = pointer;
            pointer = clusters[pointer as usize];
            path_length += 1;
        }
        let final_pointer = if pointer >= 0 {
            cluster_count += 1;
            -(cluster_count as i64)
        } else {
            pointer
        };
        let mut index = start as i64;
        for _ in 0..path_length {
            let next = clusters[index as usize];
            clusters[index as usize] = final_pointer;
            index = next;
        }
    }
    cluster_count
}

/// Turns resolved pointers into an index from cluster ids to member
/// peaks. Members end up sorted within each cluster because peaks are
/// scattered in ascending order.
fn index_clusters(mut clusters: Vec<i64>, cluster_count: usize) -> SparseIndex {
    let mut offsets = vec![0usize; cluster_count + 1];
    for index in 0..clusters.len() {
        let cluster_index = -(clusters[index] + 1);
        offsets[cluster_index as usize + 1] += 1;
        clusters[index] = cluster_index;
    }
    for k in 1..offsets.len() {
        offsets[k] += offsets[k - 1];
    }
    let mut cursor = offsets.clone();
    let mut indices = vec![0usize; clusters.len()];
    for (index, &cluster) in clusters.iter().enumerate() {
        indices[cursor[cluster as usize]] = index;
        cursor[cluster as usize] += 1;
    }
    SparseIndex::new(offsets, indices)
}

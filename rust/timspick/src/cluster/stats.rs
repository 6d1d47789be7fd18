use crate::acquisition::DiaAcquisition;
use crate::errors::DataError;
use crate::executor::ParallelExecutor;
use crate::sparse_index::SparseIndex;

/// Per-cluster summaries over the raw and smoothed peaks.
///
/// Weighted means use raw intensities, the apex is the member with the
/// highest smoothed intensity. Boundary indices are scan positions
/// within a frame for IM and frame indices for RT.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStats {
    pub sizes: Vec<u32>,
    pub mz_means: Vec<f64>,
    pub im_means: Vec<f32>,
    pub rt_means: Vec<f32>,
    pub intensity_sums: Vec<f64>,
    pub apex_indices: Vec<usize>,
    pub frame_groups: Vec<u32>,
    pub im_boundaries: Vec<(u32, u32)>,
    pub rt_boundaries: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Default)]
struct ClusterAccumulator {
    size: u32,
    intensity_sum: f64,
    weighted_mz: f64,
    weighted_im: f64,
    weighted_rt: f64,
    apex: usize,
    im_bounds: (u32, u32),
    rt_bounds: (u32, u32),
    first_frame: usize,
}

impl ClusterStats {
    /// Computes every summary in one parallel pass over the clusters.
    /// `peak_scans` maps each peak to its scan, as produced by
    /// [`explode_offsets`](crate::sparse_index::explode_offsets) over
    /// the scan offsets.
    pub fn compute(
        data: &DiaAcquisition,
        index: &SparseIndex,
        smooth_intensity_values: &[f32],
        peak_scans: &[usize],
        executor: &ParallelExecutor,
    ) -> Result<ClusterStats, DataError> {
        if smooth_intensity_values.len() != data.num_peaks() {
            return Err(DataError::MismatchedArrayLengths {
                stage: "cluster statistics",
                expected: data.num_peaks(),
                got: smooth_intensity_values.len(),
            });
        }
        if peak_scans.len() != data.num_peaks() {
            return Err(DataError::MismatchedArrayLengths {
                stage: "cluster statistics",
                expected: data.num_peaks(),
                got: peak_scans.len(),
            });
        }
        let num_clusters = index.num_entities();
        let mut accumulators = vec![ClusterAccumulator::default(); num_clusters];
        executor.map_fill(&mut accumulators, "cluster statistics", |cluster| {
            accumulate_cluster(data, index, smooth_intensity_values, peak_scans, cluster)
        });
        for (cluster, acc) in accumulators.iter().enumerate() {
            if acc.intensity_sum == 0.0 {
                return Err(DataError::ZeroIntensityCluster { cluster });
            }
        }
        let mut stats = ClusterStats {
            sizes: Vec::with_capacity(num_clusters),
            mz_means: Vec::with_capacity(num_clusters),
            im_means: Vec::with_capacity(num_clusters),
            rt_means: Vec::with_capacity(num_clusters),
            intensity_sums: Vec::with_capacity(num_clusters),
            apex_indices: Vec::with_capacity(num_clusters),
            frame_groups: Vec::with_capacity(num_clusters),
            im_boundaries: Vec::with_capacity(num_clusters),
            rt_boundaries: Vec::with_capacity(num_clusters),
        };
        for acc in accumulators {
            stats.sizes.push(acc.size);
            stats.mz_means.push(acc.weighted_mz / acc.intensity_sum);
            stats
                .im_means
                .push((acc.weighted_im / acc.intensity_sum) as f32);
            stats
                .rt_means
                .push((acc.weighted_rt / acc.intensity_sum) as f32);
            stats.intensity_sums.push(acc.intensity_sum);
            stats.apex_indices.push(acc.apex);
            stats
                .frame_groups
                .push(data.frame_group(acc.first_frame));
            stats.im_boundaries.push(acc.im_bounds);
            stats.rt_boundaries.push(acc.rt_bounds);
        }
        Ok(stats)
    }

    pub fn num_clusters(&self) -> usize {
        self.sizes.len()
    }
}

fn accumulate_cluster(
    data: &DiaAcquisition,
    index: &SparseIndex,
    smooth_intensity_values: &[f32],
    peak_scans: &[usize],
    cluster: usize,
) -> ClusterAccumulator {
    let members = index.member_slice(cluster);
    let mut acc = ClusterAccumulator {
        size: members.len() as u32,
        im_bounds: (u32::MAX, 0),
        rt_bounds: (u32::MAX, 0),
        ..ClusterAccumulator::default()
    };
    let mut max_smooth = f32::NEG_INFINITY;
    for (position, &peak) in members.iter().enumerate() {
        let intensity = data.intensity_values[peak] as f64;
        let scan = peak_scans[peak];
        let im_index = data.im_index(scan);
        let frame_index = data.frame_index(scan);
        acc.intensity_sum += intensity;
        acc.weighted_mz += intensity * data.mz_axis[data.tof_indices[peak] as usize];
        acc.weighted_im += intensity * data.im_axis[im_index] as f64;
        acc.weighted_rt += intensity * data.rt_axis[frame_index] as f64;
        acc.im_bounds.0 = acc.im_bounds.0.min(im_index as u32);
        acc.im_bounds.1 = acc.im_bounds.1.max(im_index as u32);
        acc.rt_bounds.0 = acc.rt_bounds.0.min(frame_index as u32);
        acc.rt_bounds.1 = acc.rt_bounds.1.max(frame_index as u32);
        if position == 0 {
            acc.first_frame = frame_index;
        }
        let smooth = smooth_intensity_values[peak];
        if smooth > max_smooth {
            max_smooth = smooth;
            acc.apex = peak;
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse_index::explode_offsets;

    fn stats_acquisition() -> DiaAcquisition {
        // two frames of two scans, lead-in handled by first_cycle_frame
        DiaAcquisition {
            mz_axis: (0..2000).map(|i| 400.0 + i as f64 * 0.001).collect(),
            im_axis: vec![1.2, 1.1],
            rt_axis: vec![0.0, 0.5],
            tof_indices: vec![500, 600, 600, 700],
            intensity_values: vec![1.0, 3.0, 2.0, 2.0],
            scan_offsets: vec![0, 2, 2, 3, 4],
            scans_per_frame: 2,
            cycle_length: 2,
            first_cycle_frame: 0,
        }
    }

    #[test]
    fn weighted_means_use_raw_intensities() {
        let data = stats_acquisition();
        let index = SparseIndex::new(vec![0, 2], vec![0, 1]);
        let smooth = vec![0.5, 0.6, 0.7, 0.8];
        let peak_scans = explode_offsets(&data.scan_offsets);
        let stats = ClusterStats::compute(
            &data,
            &index,
            &smooth,
            &peak_scans,
            &ParallelExecutor::new(1),
        )
        .unwrap();
        assert_eq!(stats.sizes, vec![2]);
        assert_eq!(stats.intensity_sums, vec![4.0]);
        let expected_mz = (1.0 * data.mz_axis[500] + 3.0 * data.mz_axis[600]) / 4.0;
        assert!((stats.mz_means[0] - expected_mz).abs() < 1e-12);
        // both peaks sit in scan 0, so the mean im is the scan's im
        assert!((stats.im_means[0] - 1.2).abs() < 1e-6);
        assert!((stats.rt_means[0] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn apex_follows_the_smoothed_intensity() {
        let data = stats_acquisition();
        let index = SparseIndex::new(vec![0, 4], vec![0, 1, 2, 3]);
        // raw intensities favor peak 1, smoothing favors peak 2
        let smooth = vec![0.5, 0.6, 0.9, 0.8];
        let peak_scans = explode_offsets(&data.scan_offsets);
        let stats = ClusterStats::compute(
            &data,
            &index,
            &smooth,
            &peak_scans,
            &ParallelExecutor::new(1),
        )
        .unwrap();
        assert_eq!(stats.apex_indices, vec![2]);
    }

    #[test]
    fn apex_ties_keep_the_first_member() {
        let data = stats_acquisition();
        let index = SparseIndex::new(vec![0, 4], vec![0, 1, 2, 3]);
        let smooth = vec![0.5, 0.9, 0.9, 0.8];
        let peak_scans = explode_offsets(&data.scan_offsets);
        let stats = ClusterStats::compute(
            &data,
            &index,
            &smooth,
            &peak_scans,
            &ParallelExecutor::new(1),
        )
        .unwrap();
        assert_eq!(stats.apex_indices, vec![1]);
    }

    #[test]
    fn boundaries_and_frame_group_cover_the_cluster_footprint() {
        let data = stats_acquisition();
        let index = SparseIndex::new(vec![0, 4], vec![0, 1, 2, 3]);
        let smooth = vec![0.5; 4];
        let peak_scans = explode_offsets(&data.scan_offsets);
        let stats = ClusterStats::compute(
            &data,
            &index,
            &smooth,
            &peak_scans,
            &ParallelExecutor::new(1),
        )
        .unwrap();
        // peaks live in scans 0, 0, 2, 3: im positions 0 and 1, frames 0 and 1
        assert_eq!(stats.im_boundaries, vec![(0, 1)]);
        assert_eq!(stats.rt_boundaries, vec![(0, 1)]);
        // first member sits in frame 0 of a two-frame cycle
        assert_eq!(stats.frame_groups, vec![0]);
    }

    #[test]
    fn zero_intensity_clusters_are_rejected() {
        let mut data = stats_acquisition();
        data.intensity_values = vec![0.0, 0.0, 1.0, 1.0];
        let index = SparseIndex::new(vec![0, 2, 4], vec![0, 1, 2, 3]);
        let smooth = vec![0.5; 4];
        let peak_scans = explode_offsets(&data.scan_offsets);
        let err = ClusterStats::compute(
            &data,
            &index,
            &smooth,
            &peak_scans,
            &ParallelExecutor::new(1),
        )
        .unwrap_err();
        assert_eq!(err, DataError::ZeroIntensityCluster { cluster: 0 });
    }
}

use crate::acquisition::DiaAcquisition;
use crate::cluster::{ClusterStats, ProjectionSet};
use crate::executor::ParallelExecutor;
use crate::sparse_index::SparseIndex;

/// Borrowed view of per-cluster cumulative curves, addressable by
/// cluster id. The start indices place each curve on the shared axis.
#[derive(Debug, Clone, Copy)]
pub struct CdfSet<'a> {
    pub offsets: &'a [usize],
    pub values: &'a [f64],
    pub start_indices: &'a [u32],
}

impl<'a> CdfSet<'a> {
    pub fn from_projections(projections: &'a ProjectionSet) -> Self {
        Self {
            offsets: &projections.offsets,
            values: &projections.values,
            start_indices: &projections.start_indices,
        }
    }

    fn curve(&self, id: usize) -> &'a [f64] {
        &self.values[self.offsets[id]..self.offsets[id + 1]]
    }
}

/// Kolmogorov-Smirnov distances between per-cluster cumulative curves
/// on one axis.
///
/// Curves are compared on the overlap of their axis footprints. The
/// curve that starts earlier contributes its value just before the
/// overlap as the starting distance, so a late-starting partner is
/// penalized for the mass it missed. Curves that do not overlap at all
/// score the full mass of the earlier one.
pub struct KsTester1D<'a> {
    cdfs: CdfSet<'a>,
    threshold: f64,
}

impl<'a> KsTester1D<'a> {
    pub fn new(cdfs: CdfSet<'a>) -> Self {
        Self::with_threshold(cdfs, 1.0)
    }

    /// Distances above `threshold` are cut off early and reported as
    /// exactly `threshold`.
    pub fn with_threshold(cdfs: CdfSet<'a>, threshold: f64) -> Self {
        Self { cdfs, threshold }
    }

    pub fn distance(&self, cluster1: usize, cluster2: usize) -> f64 {
        let mut cdf1 = self.cdfs.curve(cluster1);
        let mut cdf2 = self.cdfs.curve(cluster2);
        let start1 = self.cdfs.start_indices[cluster1];
        let start2 = self.cdfs.start_indices[cluster2];
        let mut max_difference = 0.0f64;
        if start1 < start2 {
            let skip = (start2 - start1) as usize;
            max_difference = cdf1[skip.min(cdf1.len()) - 1];
            cdf1 = &cdf1[skip.min(cdf1.len())..];
        } else if start2 < start1 {
            let skip = (start1 - start2) as usize;
            max_difference = cdf2[skip.min(cdf2.len()) - 1];
            cdf2 = &cdf2[skip.min(cdf2.len())..];
        }
        for (value1, value2) in cdf1.iter().zip(cdf2) {
            let difference = (value1 - value2).abs();
            if difference > self.threshold {
                return self.threshold;
            }
            if difference > max_difference {
                max_difference = difference;
            }
        }
        max_difference
    }

    pub fn calculate_all(
        &self,
        pairs: &[(usize, usize)],
        executor: &ParallelExecutor,
    ) -> Vec<f64> {
        let mut distances = vec![0.0f64; pairs.len()];
        executor.map_fill(&mut distances, "1d ks distances", |pair| {
            self.distance(pairs[pair].0, pairs[pair].1)
        });
        distances
    }
}

/// Kolmogorov-Smirnov distances between the joint IM x RT intensity
/// distributions of two clusters.
///
/// Both clusters are rasterized onto the union of their bounding boxes,
/// turned into 2-D cumulative distributions and compared point by
/// point. The companion p-value uses the summed intensities as the
/// effective sample sizes.
pub struct KsTester2D<'a> {
    data: &'a DiaAcquisition,
    index: &'a SparseIndex,
    stats: &'a ClusterStats,
    peak_scans: &'a [usize],
}

impl<'a> KsTester2D<'a> {
    pub fn new(
        data: &'a DiaAcquisition,
        index: &'a SparseIndex,
        stats: &'a ClusterStats,
        peak_scans: &'a [usize],
    ) -> Self {
        Self {
            data,
            index,
            stats,
            peak_scans,
        }
    }

    pub fn between_clusters(&self, cluster1: usize, cluster2: usize) -> (f64, f64) {
        let (im_lower1, im_upper1) = self.stats.im_boundaries[cluster1];
        let (im_lower2, im_upper2) = self.stats.im_boundaries[cluster2];
        let (rt_lower1, rt_upper1) = self.stats.rt_boundaries[cluster1];
        let (rt_lower2, rt_upper2) = self.stats.rt_boundaries[cluster2];
        let im_lower = im_lower1.min(im_lower2) as usize;
        let im_upper = im_upper1.max(im_upper2) as usize;
        let rt_lower = rt_lower1.min(rt_lower2) as usize;
        let rt_upper = rt_upper1.max(rt_upper2) as usize;
        let cols = im_upper - im_lower + 1;
        let rows = rt_upper - rt_lower + 1;
        let grid1 = self.cumulative_grid(cluster1, rows, cols, rt_lower, im_lower);
        let grid2 = self.cumulative_grid(cluster2, rows, cols, rt_lower, im_lower);
        let distance = grid1
            .iter()
            .zip(&grid2)
            .map(|(value1, value2)| (value1 - value2).abs())
            .fold(0.0f64, f64::max);
        let sum1 = self.stats.intensity_sums[cluster1];
        let sum2 = self.stats.intensity_sums[cluster2];
        let p_value = 2.0 * (-distance.powi(2) / (sum1 + sum2) * (2.0 * sum1 * sum2)).exp();
        (distance, p_value)
    }

    /// The 2-D distance for every pair, as stored. The p-value is
    /// dropped here.
    pub fn distances_for_pairs(
        &self,
        pairs: &[(usize, usize)],
        executor: &ParallelExecutor,
    ) -> Vec<f32> {
        let mut distances = vec![0.0f32; pairs.len()];
        executor.map_fill(&mut distances, "2d ks distances", |pair| {
            self.between_clusters(pairs[pair].0, pairs[pair].1).0 as f32
        });
        distances
    }

    fn cumulative_grid(
        &self,
        cluster: usize,
        rows: usize,
        cols: usize,
        rt_lower: usize,
        im_lower: usize,
    ) -> Vec<f64> {
        let spf = self.data.scans_per_frame;
        let mut grid = vec![0.0f64; rows * cols];
        for &peak in self.index.member_slice(cluster) {
            let scan = self.peak_scans[peak];
            let row = scan / spf - rt_lower;
            let col = scan % spf - im_lower;
            grid[row * cols + col] += self.data.intensity_values[peak] as f64;
        }
        for row in 1..rows {
            for col in 0..cols {
                grid[row * cols + col] += grid[(row - 1) * cols + col];
            }
        }
        for row in 0..rows {
            for col in 1..cols {
                grid[row * cols + col] += grid[row * cols + col - 1];
            }
        }
        let total = self.stats.intensity_sums[cluster];
        for value in grid.iter_mut() {
            *value /= total;
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse_index::explode_offsets;

    fn curve_set(
        offsets: Vec<usize>,
        values: Vec<f64>,
        start_indices: Vec<u32>,
    ) -> ProjectionSet {
        ProjectionSet {
            offsets,
            values,
            start_indices,
        }
    }

    #[test]
    fn identical_curves_are_at_distance_zero() {
        let curves = curve_set(
            vec![0, 3, 6],
            vec![0.25, 0.5, 1.0, 0.25, 0.5, 1.0],
            vec![4, 4],
        );
        let tester = KsTester1D::new(CdfSet::from_projections(&curves));
        assert_eq!(tester.distance(0, 1), 0.0);
    }

    #[test]
    fn a_late_start_carries_the_missed_mass() {
        let curves = curve_set(
            vec![0, 4, 6],
            vec![0.25, 0.5, 0.75, 1.0, 0.5, 1.0],
            vec![0, 2],
        );
        let tester = KsTester1D::new(CdfSet::from_projections(&curves));
        // the first curve reaches 0.5 before the second one starts
        assert_eq!(tester.distance(0, 1), 0.5);
        assert_eq!(tester.distance(1, 0), 0.5);
    }

    #[test]
    fn disjoint_curves_score_the_full_early_mass() {
        let curves = curve_set(vec![0, 1, 2], vec![1.0, 1.0], vec![0, 5]);
        let tester = KsTester1D::new(CdfSet::from_projections(&curves));
        assert_eq!(tester.distance(0, 1), 1.0);
    }

    #[test]
    fn distances_above_the_threshold_are_cut_off() {
        let curves = curve_set(
            vec![0, 2, 4],
            vec![0.9, 1.0, 0.1, 1.0],
            vec![0, 0],
        );
        let tester = KsTester1D::with_threshold(CdfSet::from_projections(&curves), 0.3);
        assert_eq!(tester.distance(0, 1), 0.3);
    }

    #[test]
    fn all_pairs_match_single_calls() {
        let curves = curve_set(
            vec![0, 2, 4, 5],
            vec![0.5, 1.0, 0.25, 1.0, 1.0],
            vec![0, 0, 1],
        );
        let tester = KsTester1D::new(CdfSet::from_projections(&curves));
        let pairs = vec![(0, 1), (1, 2), (0, 2)];
        let distances = tester.calculate_all(&pairs, &ParallelExecutor::new(2));
        for (pair, distance) in pairs.iter().zip(&distances) {
            assert_eq!(*distance, tester.distance(pair.0, pair.1));
        }
    }

    fn grid_acquisition() -> (DiaAcquisition, SparseIndex) {
        let data = DiaAcquisition {
            mz_axis: (0..1000).map(|i| 400.0 + i as f64 * 0.001).collect(),
            im_axis: vec![1.2, 1.1],
            rt_axis: vec![0.0, 0.5],
            tof_indices: vec![100, 100],
            intensity_values: vec![4.0, 2.0],
            scan_offsets: vec![0, 1, 1, 1, 2],
            scans_per_frame: 2,
            cycle_length: 1,
            first_cycle_frame: 0,
        };
        let index = SparseIndex::new(vec![0, 1, 2], vec![0, 1]);
        (data, index)
    }

    #[test]
    fn opposite_grid_corners_are_at_distance_one() {
        let (data, index) = grid_acquisition();
        let peak_scans = explode_offsets(&data.scan_offsets);
        let smooth = vec![1.0f32; data.num_peaks()];
        let stats = ClusterStats::compute(
            &data,
            &index,
            &smooth,
            &peak_scans,
            &ParallelExecutor::new(1),
        )
        .unwrap();
        let tester = KsTester2D::new(&data, &index, &stats, &peak_scans);
        let (distance, p_value) = tester.between_clusters(0, 1);
        assert_eq!(distance, 1.0);
        assert_eq!(p_value, 2.0 * (-1.0f64 / 6.0 * 16.0).exp());
        let (self_distance, self_p) = tester.between_clusters(0, 0);
        assert_eq!(self_distance, 0.0);
        assert_eq!(self_p, 2.0);
    }

    #[test]
    fn pair_distances_are_stored_as_f32() {
        let (data, index) = grid_acquisition();
        let peak_scans = explode_offsets(&data.scan_offsets);
        let smooth = vec![1.0f32; data.num_peaks()];
        let stats = ClusterStats::compute(
            &data,
            &index,
            &smooth,
            &peak_scans,
            &ParallelExecutor::new(1),
        )
        .unwrap();
        let tester = KsTester2D::new(&data, &index, &stats, &peak_scans);
        let distances = tester.distances_for_pairs(&[(0, 1), (0, 0)], &ParallelExecutor::new(1));
        assert_eq!(distances, vec![1.0f32, 0.0]);
    }
}

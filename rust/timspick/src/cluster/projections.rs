use crate::acquisition::DiaAcquisition;
use crate::cluster::stats::ClusterStats;
use crate::executor::ParallelExecutor;
use crate::sparse_index::SparseIndex;

/// Per-cluster cumulative intensity curves over one axis, stored back
/// to back. Each curve is normalized by its own total, so it ends at
/// one. `start_indices` anchors curve bin zero on the global axis, in
/// cycle units for RT curves and scan positions for IM curves.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSet {
    pub offsets: Vec<usize>,
    pub values: Vec<f64>,
    pub start_indices: Vec<u32>,
}

impl ProjectionSet {
    pub fn num_curves(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn curve(&self, id: usize) -> &[f64] {
        &self.values[self.offsets[id]..self.offsets[id + 1]]
    }
}

/// Chromatograms binned per acquisition cycle, spanning each cluster's
/// RT footprint.
pub fn rt_projections(
    data: &DiaAcquisition,
    index: &SparseIndex,
    stats: &ClusterStats,
    peak_scans: &[usize],
    executor: &ParallelExecutor,
) -> ProjectionSet {
    debug_assert_eq!(stats.num_clusters(), index.num_entities());
    let cycle_length = data.cycle_length;
    let offsets = curve_offsets(stats.rt_boundaries.iter().map(|&(lower, upper)| {
        (upper - lower) as usize / cycle_length + 1
    }));
    let mut values = vec![0.0f64; offsets[offsets.len() - 1]];
    executor.run_segments(&offsets, &mut values, "rt projections", |cluster, seg| {
        let frame_min = stats.rt_boundaries[cluster].0 as usize;
        for &peak in index.member_slice(cluster) {
            let frame = peak_scans[peak] / data.scans_per_frame - frame_min;
            seg[frame / cycle_length] += data.intensity_values[peak] as f64;
        }
        normalize_cumulative(seg);
    });
    let start_indices = stats
        .rt_boundaries
        .iter()
        .map(|&(lower, _)| lower / cycle_length as u32)
        .collect();
    ProjectionSet {
        offsets,
        values,
        start_indices,
    }
}

/// Mobilograms binned per scan position, spanning each cluster's IM
/// footprint.
pub fn im_projections(
    data: &DiaAcquisition,
    index: &SparseIndex,
    stats: &ClusterStats,
    peak_scans: &[usize],
    executor: &ParallelExecutor,
) -> ProjectionSet {
    debug_assert_eq!(stats.num_clusters(), index.num_entities());
    let offsets = curve_offsets(
        stats
            .im_boundaries
            .iter()
            .map(|&(lower, upper)| (upper - lower) as usize + 1),
    );
    let mut values = vec![0.0f64; offsets[offsets.len() - 1]];
    executor.run_segments(&offsets, &mut values, "im projections", |cluster, seg| {
        let scan_min = stats.im_boundaries[cluster].0 as usize;
        for &peak in index.member_slice(cluster) {
            let scan = peak_scans[peak] % data.scans_per_frame - scan_min;
            seg[scan] += data.intensity_values[peak] as f64;
        }
        normalize_cumulative(seg);
    });
    let start_indices = stats.im_boundaries.iter().map(|&(lower, _)| lower).collect();
    ProjectionSet {
        offsets,
        values,
        start_indices,
    }
}

fn curve_offsets(lengths: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut offsets = vec![0usize];
    let mut total = 0usize;
    for len in lengths {
        total += len;
        offsets.push(total);
    }
    offsets
}

fn normalize_cumulative(curve: &mut [f64]) {
    let mut running = 0.0f64;
    for value in curve.iter_mut() {
        running += *value;
        *value = running;
    }
    if let Some(&total) = curve.last() {
        for value in curve.iter_mut() {
            *value /= total;
        }
    }
}

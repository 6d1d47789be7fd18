use crate::acquisition::DiaAcquisition;
use crate::config::IsotopeToleranceConfig;
use crate::errors::DataError;
use crate::executor::ParallelExecutor;
use crate::neighbors::{IsotopePairIter, NeighborScanIter};
use crate::sparse_index::SparseIndex;
use crate::tolerance::{FrameIndexTolerance, IsotopeTofTolerance, ScanIndexTolerance};

/// Links each precursor to a heavier isotopologue one isotope spacing
/// up, for a fixed charge state.
///
/// Matching happens between apexes: a precursor on one scan pairs with
/// a precursor on a neighboring scan whose apex TOF falls inside the
/// isotope-shifted window of its own apex. When several candidates
/// match, the last one in scan order is kept.
pub struct Deisotoper<'a> {
    data: &'a DiaAcquisition,
    precursor_index: &'a SparseIndex,
    apex_indices: &'a [usize],
    tof_window: IsotopeTofTolerance,
    im_window: ScanIndexTolerance,
    rt_window: FrameIndexTolerance,
}

impl<'a> Deisotoper<'a> {
    pub fn new(
        data: &'a DiaAcquisition,
        precursor_index: &'a SparseIndex,
        apex_indices: &'a [usize],
        config: &IsotopeToleranceConfig,
        charge: u32,
    ) -> Result<Self, DataError> {
        Ok(Self {
            data,
            precursor_index,
            apex_indices,
            tof_window: IsotopeTofTolerance::new(&data.mz_axis, config.ppm_tolerance, charge)?,
            im_window: ScanIndexTolerance::new(&data.im_axis, config.im_tolerance)?,
            rt_window: FrameIndexTolerance::cyclic(
                &data.rt_axis,
                config.rt_tolerance,
                data.cycle_length,
            )?,
        })
    }

    /// One entry per position in the precursor index. `-1` marks a
    /// precursor without an isotope partner; anything else is the
    /// index position of its `+1` isotopologue.
    pub fn find_isotope_pairs(&self, executor: &ParallelExecutor) -> Vec<i64> {
        let mut pointers = vec![-1i64; self.precursor_index.num_values()];
        executor.run_segments(
            &self.precursor_index.offsets,
            &mut pointers,
            "isotope search",
            |scan, seg| self.pair_scan(scan, seg),
        );
        pointers
    }

    fn pair_scan(&self, scan: usize, seg: &mut [i64]) {
        if seg.is_empty() {
            return;
        }
        let base = self.precursor_index.boundaries(scan).0;
        let spf = self.data.scans_per_frame;
        for rt_scan in NeighborScanIter::rt_neighbors(scan, spf, &self.rt_window) {
            for im_scan in NeighborScanIter::im_neighbors(rt_scan, spf, &self.im_window) {
                let (start2, end2) = self.precursor_index.boundaries(im_scan);
                if start2 == end2 {
                    continue;
                }
                let pairs = IsotopePairIter::new(
                    self.precursor_index,
                    self.apex_indices,
                    &self.data.tof_indices,
                    &self.tof_window,
                    scan,
                    im_scan,
                );
                for (position1, position2) in pairs {
                    seg[position1 - base] = position2 as i64;
                }
            }
        }
    }
}

use crate::sparse_index::SparseIndex;
use crate::tolerance::{
    FrameIndexTolerance,
    IsotopeTofTolerance,
    ScanIndexTolerance,
    TofIndexTolerance,
};

/// Neighboring scan indices produced from a per-axis window, walked with a
/// fixed stride. Covers IM neighbors (stride 1), RT neighbors (stride
/// `scans_per_frame`) and cyclic RT neighbors (stride `scans_per_frame *
/// cycle_length`).
#[derive(Debug, Clone)]
pub struct NeighborScanIter {
    next_scan: i64,
    end_scan: i64,
    stride: i64,
}

impl NeighborScanIter {
    /// Scans of the same frame within the IM window of `scan`.
    pub fn im_neighbors(
        scan: usize,
        scans_per_frame: usize,
        table: &ScanIndexTolerance,
    ) -> Self {
        let im_index = scan % scans_per_frame;
        let (lower, upper) = table.window(im_index);
        Self {
            next_scan: scan as i64 + lower,
            end_scan: scan as i64 + upper,
            stride: 1,
        }
    }

    /// Scans at the same IM position in frames within the RT window of
    /// `scan`. A cyclic table makes the stride span whole cycles.
    pub fn rt_neighbors(
        scan: usize,
        scans_per_frame: usize,
        table: &FrameIndexTolerance,
    ) -> Self {
        let frame_index = scan / scans_per_frame;
        let (lower, upper) = table.window(frame_index);
        let spf = scans_per_frame as i64;
        Self {
            next_scan: scan as i64 + lower * spf,
            end_scan: scan as i64 + upper * spf,
            stride: table.step() * spf,
        }
    }
}

impl Iterator for NeighborScanIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next_scan >= self.end_scan {
            return None;
        }
        let scan = self.next_scan as usize;
        self.next_scan += self.stride;
        Some(scan)
    }
}

/// Bounded sorted merge over the peaks of two scans, yielding every pair of
/// global peak indices whose TOF bins fall within each other's m/z window.
///
/// Both runs are TOF-sorted, so once a right-hand peak exceeds the current
/// left-hand window the inner walk stops, and peaks that fall below the
/// window advance the resume position for all later left-hand peaks. If the
/// right-hand run is exhausted without an over-window stop, no later
/// left-hand peak can match either and the whole iteration ends.
#[derive(Debug, Clone)]
pub struct IonPairIter<'a> {
    tof_indices: &'a [u32],
    table: &'a TofIndexTolerance,
    index1: usize,
    end1: usize,
    start2: usize,
    index2: usize,
    end2: usize,
}

impl<'a> IonPairIter<'a> {
    pub fn new(
        tof_indices: &'a [u32],
        table: &'a TofIndexTolerance,
        run1: (usize, usize),
        run2: (usize, usize),
    ) -> Self {
        Self {
            tof_indices,
            table,
            index1: run1.0,
            end1: run1.1,
            start2: run2.0,
            index2: run2.0,
            end2: run2.1,
        }
    }
}

impl Iterator for IonPairIter<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        'outer: while self.index1 < self.end1 {
            let tof1 = self.tof_indices[self.index1];
            let upper1 = tof1 + self.table.upper_offset(tof1);
            while self.index2 < self.end2 {
                let tof2 = self.tof_indices[self.index2];
                if tof2 > upper1 {
                    self.index1 += 1;
                    self.index2 = self.start2;
                    continue 'outer;
                }
                if tof1 > tof2 + self.table.upper_offset(tof2) {
                    self.start2 += 1;
                    self.index2 += 1;
                    continue;
                }
                let pair = (self.index1, self.index2);
                self.index2 += 1;
                return Some(pair);
            }
            self.index1 = self.end1;
            return None;
        }
        None
    }
}

/// Same merge skeleton as [`IonPairIter`] but over cluster runs of a
/// per-scan index, comparing apex-peak TOF bins against the asymmetric
/// isotope-shifted window. Yields pairs of positions in the index's value
/// array.
#[derive(Debug, Clone)]
pub struct IsotopePairIter<'a> {
    scan_index: &'a SparseIndex,
    apex_indices: &'a [usize],
    tof_indices: &'a [u32],
    table: &'a IsotopeTofTolerance,
    index1: usize,
    end1: usize,
    start2: usize,
    index2: usize,
    end2: usize,
}

impl<'a> IsotopePairIter<'a> {
    pub fn new(
        scan_index: &'a SparseIndex,
        apex_indices: &'a [usize],
        tof_indices: &'a [u32],
        table: &'a IsotopeTofTolerance,
        scan1: usize,
        scan2: usize,
    ) -> Self {
        let (start1, end1) = scan_index.boundaries(scan1);
        let (start2, end2) = scan_index.boundaries(scan2);
        Self {
            scan_index,
            apex_indices,
            tof_indices,
            table,
            index1: start1,
            end1,
            start2,
            index2: start2,
            end2,
        }
    }

    #[inline]
    fn apex_tof(&self, position: usize) -> u32 {
        let cluster = self.scan_index.values[position];
        self.tof_indices[self.apex_indices[cluster]]
    }
}

impl Iterator for IsotopePairIter<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        'outer: while self.index1 < self.end1 {
            let tof1 = self.apex_tof(self.index1);
            let (lower1, upper1) = self.table.bounds(tof1);
            while self.index2 < self.end2 {
                let tof2 = self.apex_tof(self.index2);
                if tof2 > upper1 {
                    self.index1 += 1;
                    self.index2 = self.start2;
                    continue 'outer;
                }
                if tof2 < lower1 {
                    self.start2 += 1;
                    self.index2 += 1;
                    continue;
                }
                let pair = (self.index1, self.index2);
                self.index2 += 1;
                return Some(pair);
            }
            self.index1 = self.end1;
            return None;
        }
        None
    }
}

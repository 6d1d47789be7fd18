use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::DataError;

/// A flattened dia acquisition.
///
/// Peaks live in one global array, sorted ascending by TOF index within
/// each scan. Scans are laid out row-major as
/// `frame_index * scans_per_frame + im_index` and addressed through
/// `scan_offsets` (CSR boundaries, length `num_scans + 1`).
///
/// The coordinate axes are per-domain-bin, not per-peak: `mz_axis[t]` is
/// the m/z of TOF bin `t`, `im_axis[s]` the 1/K0 of scan `s` within a
/// frame (descending with `s` on timsTOF hardware) and `rt_axis[f]` the
/// retention time of frame `f` in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaAcquisition {
    pub mz_axis: Vec<f64>,
    pub im_axis: Vec<f32>,
    pub rt_axis: Vec<f32>,
    pub tof_indices: Vec<u32>,
    pub intensity_values: Vec<f32>,
    pub scan_offsets: Vec<usize>,
    pub scans_per_frame: usize,
    /// Frames per acquisition cycle; `frame_group == 0` marks precursor
    /// frames.
    pub cycle_length: usize,
    /// Index of the first cycle-aligned (precursor) frame. Bruker files
    /// carry a lead-in frame before the first cycle starts.
    pub first_cycle_frame: usize,
}

impl DiaAcquisition {
    pub fn num_peaks(&self) -> usize {
        self.tof_indices.len()
    }

    pub fn num_scans(&self) -> usize {
        self.scan_offsets.len().saturating_sub(1)
    }

    pub fn num_frames(&self) -> usize {
        self.rt_axis.len()
    }

    /// Peak-array boundaries of one scan. `(0, 0)` when out of range.
    pub fn scan_bounds(&self, scan: usize) -> (usize, usize) {
        if scan >= self.num_scans() {
            return (0, 0);
        }
        (self.scan_offsets[scan], self.scan_offsets[scan + 1])
    }

    pub fn im_index(&self, scan: usize) -> usize {
        scan % self.scans_per_frame
    }

    pub fn frame_index(&self, scan: usize) -> usize {
        scan / self.scans_per_frame
    }

    /// Scan holding a given peak, by binary search over `scan_offsets`.
    pub fn scan_of_peak(&self, peak: usize) -> usize {
        self.scan_offsets.partition_point(|&o| o <= peak) - 1
    }

    pub fn frame_of_peak(&self, peak: usize) -> usize {
        self.frame_index(self.scan_of_peak(peak))
    }

    /// Position of a frame within the acquisition cycle. Frames before
    /// the first cycle-aligned frame wrap around.
    pub fn frame_group(&self, frame: usize) -> u32 {
        let shifted = frame as i64 - self.first_cycle_frame as i64;
        shifted.rem_euclid(self.cycle_length as i64) as u32
    }

    pub fn mz_of_peak(&self, peak: usize) -> f64 {
        self.mz_axis[self.tof_indices[peak] as usize]
    }

    /// Cross-checks the array lengths and offsets against each other.
    pub fn validate(&self) -> Result<(), DataError> {
        let n_peaks = self.tof_indices.len();
        if self.intensity_values.len() != n_peaks {
            return Err(DataError::MismatchedArrayLengths {
                stage: "acquisition",
                expected: n_peaks,
                got: self.intensity_values.len(),
            });
        }
        let expect_scans = self.num_frames() * self.scans_per_frame;
        if self.scan_offsets.len() != expect_scans + 1 {
            return Err(DataError::MismatchedArrayLengths {
                stage: "acquisition",
                expected: expect_scans + 1,
                got: self.scan_offsets.len(),
            });
        }
        if self.im_axis.len() != self.scans_per_frame {
            return Err(DataError::MismatchedArrayLengths {
                stage: "acquisition",
                expected: self.scans_per_frame,
                got: self.im_axis.len(),
            });
        }
        if self.scan_offsets.first() != Some(&0)
            || self.scan_offsets.last() != Some(&n_peaks)
            || self.scan_offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(DataError::MismatchedArrayLengths {
                stage: "acquisition/scan_offsets",
                expected: n_peaks,
                got: *self.scan_offsets.last().unwrap_or(&0),
            });
        }
        if let Some(max_tof) = self.tof_indices.iter().max() {
            if *max_tof as usize >= self.mz_axis.len() {
                return Err(DataError::IndexOutOfRange {
                    stage: "acquisition/tof_indices",
                    index: *max_tof as usize,
                    size: self.mz_axis.len(),
                });
            }
        }
        if self.cycle_length == 0 {
            return Err(DataError::NoCycleStructure {
                reason: "cycle_length is zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_frame_acq() -> DiaAcquisition {
        // 2 frames x 2 scans, one peak per scan
        DiaAcquisition {
            mz_axis: vec![100.0, 200.0, 300.0],
            im_axis: vec![1.2, 1.1],
            rt_axis: vec![0.5, 1.0],
            tof_indices: vec![0, 1, 1, 2],
            intensity_values: vec![10.0, 20.0, 30.0, 40.0],
            scan_offsets: vec![0, 1, 2, 3, 4],
            scans_per_frame: 2,
            cycle_length: 2,
            first_cycle_frame: 0,
        }
    }

    #[test]
    fn scan_addressing() {
        let acq = two_frame_acq();
        assert!(acq.validate().is_ok());
        assert_eq!(acq.num_scans(), 4);
        assert_eq!(acq.scan_bounds(2), (2, 3));
        assert_eq!(acq.scan_bounds(99), (0, 0));
        assert_eq!(acq.im_index(3), 1);
        assert_eq!(acq.frame_index(3), 1);
        assert_eq!(acq.scan_of_peak(2), 2);
        assert_eq!(acq.frame_of_peak(3), 1);
    }

    #[test]
    fn frame_group_wraps_before_first_cycle() {
        let mut acq = two_frame_acq();
        acq.first_cycle_frame = 1;
        assert_eq!(acq.frame_group(1), 0);
        assert_eq!(acq.frame_group(0), 1);
    }

    #[test]
    fn validate_catches_bad_offsets() {
        let mut acq = two_frame_acq();
        acq.scan_offsets = vec![0, 3, 2, 3, 4];
        assert!(acq.validate().is_err());
    }
}

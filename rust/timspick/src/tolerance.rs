use crate::errors::DataError;

/// Mass difference between two isotopic peaks of a singly charged ion, in Th.
pub const ISOTOPIC_SPACING: f64 = 1.00286864;

fn searchsorted_left_f64(axis: &[f64], value: f64) -> usize {
    axis.partition_point(|&x| x < value)
}

fn searchsorted_right_f64(axis: &[f64], value: f64) -> usize {
    axis.partition_point(|&x| x <= value)
}

fn searchsorted_left_f32(axis: &[f32], value: f32) -> usize {
    axis.partition_point(|&x| x < value)
}

fn searchsorted_right_f32(axis: &[f32], value: f32) -> usize {
    axis.partition_point(|&x| x <= value)
}

/// Per-TOF-bin neighbor reach along the m/z axis for a ppm tolerance.
///
/// `upper_offset(t)` is the count of TOF bins above `t` whose m/z is still
/// below `mz[t] * (1 + ppm * 1e-6)`. The two-pointer merges use it from both
/// sides of a pair, so no separate lower table is needed.
#[derive(Debug, Clone)]
pub struct TofIndexTolerance {
    offsets: Vec<u32>,
}

impl TofIndexTolerance {
    pub fn new(mz_axis: &[f64], ppm_tolerance: f64) -> Result<Self, DataError> {
        if mz_axis.is_empty() {
            return Err(DataError::EmptyCoordinateAxis {
                stage: "tolerance tables",
                axis: "mz",
            });
        }
        let scale = 1.0 + ppm_tolerance * 1e-6;
        let offsets = mz_axis
            .iter()
            .enumerate()
            .map(|(t, &mz)| (searchsorted_left_f64(mz_axis, mz * scale) - t) as u32)
            .collect();
        Ok(Self { offsets })
    }

    #[inline]
    pub fn upper_offset(&self, tof: u32) -> u32 {
        self.offsets[tof as usize]
    }
}

/// Absolute TOF-bin bounds of the isotope-shifted window for one charge
/// state. The window is centered on `mz[t] + ISOTOPIC_SPACING / charge`
/// instead of `mz[t]` itself, so both edges are kept as absolute positions
/// rather than offsets.
#[derive(Debug, Clone)]
pub struct IsotopeTofTolerance {
    lower_bounds: Vec<u32>,
    upper_bounds: Vec<u32>,
}

impl IsotopeTofTolerance {
    pub fn new(mz_axis: &[f64], ppm_tolerance: f64, charge: u32) -> Result<Self, DataError> {
        if mz_axis.is_empty() {
            return Err(DataError::EmptyCoordinateAxis {
                stage: "tolerance tables",
                axis: "mz",
            });
        }
        let shift = ISOTOPIC_SPACING / f64::from(charge);
        let lower_scale = 1.0 - ppm_tolerance * 1e-6;
        let upper_scale = 1.0 + ppm_tolerance * 1e-6;
        let lower_bounds = mz_axis
            .iter()
            .map(|&mz| searchsorted_left_f64(mz_axis, (mz + shift) * lower_scale) as u32)
            .collect();
        let upper_bounds = mz_axis
            .iter()
            .map(|&mz| searchsorted_left_f64(mz_axis, (mz + shift) * upper_scale) as u32)
            .collect();
        Ok(Self {
            lower_bounds,
            upper_bounds,
        })
    }

    #[inline]
    pub fn bounds(&self, tof: u32) -> (u32, u32) {
        (
            self.lower_bounds[tof as usize],
            self.upper_bounds[tof as usize],
        )
    }
}

/// Per-scan-position window of neighboring scans within an ion mobility
/// tolerance. The IM axis runs in descending order, so the binary searches
/// work on the negated axis.
#[derive(Debug, Clone)]
pub struct ScanIndexTolerance {
    windows: Vec<(i64, i64)>,
}

impl ScanIndexTolerance {
    pub fn new(im_axis: &[f32], im_tolerance: f32) -> Result<Self, DataError> {
        if im_axis.is_empty() {
            return Err(DataError::EmptyCoordinateAxis {
                stage: "tolerance tables",
                axis: "im",
            });
        }
        let negated: Vec<f32> = im_axis.iter().map(|&im| -im).collect();
        let windows = im_axis
            .iter()
            .enumerate()
            .map(|(i, &im)| {
                let lower = searchsorted_left_f32(&negated, -(im + im_tolerance)) as i64 - i as i64;
                let upper =
                    searchsorted_right_f32(&negated, -(im - im_tolerance)) as i64 - i as i64;
                (lower, upper)
            })
            .collect();
        Ok(Self { windows })
    }

    /// Half-open `(lower, upper)` scan offsets; `0` is always inside.
    #[inline]
    pub fn window(&self, im_index: usize) -> (i64, i64) {
        self.windows[im_index]
    }
}

/// Per-frame window of neighboring frames within a retention time tolerance.
///
/// In cyclic form the lower edge of every window is rounded up to a multiple
/// of the cycle length and iteration proceeds in cycle-length steps, so a
/// frame is only ever paired with frames of the same group within the cycle.
#[derive(Debug, Clone)]
pub struct FrameIndexTolerance {
    windows: Vec<(i64, i64)>,
    step: i64,
}

impl FrameIndexTolerance {
    pub fn new(rt_axis: &[f32], rt_tolerance: f32) -> Result<Self, DataError> {
        if rt_axis.is_empty() {
            return Err(DataError::EmptyCoordinateAxis {
                stage: "tolerance tables",
                axis: "rt",
            });
        }
        let windows = rt_axis
            .iter()
            .enumerate()
            .map(|(f, &rt)| {
                let lower = searchsorted_left_f32(rt_axis, rt - rt_tolerance) as i64 - f as i64;
                let upper = searchsorted_right_f32(rt_axis, rt + rt_tolerance) as i64 - f as i64;
                (lower, upper)
            })
            .collect();
        Ok(Self { windows, step: 1 })
    }

    pub fn cyclic(
        rt_axis: &[f32],
        rt_tolerance: f32,
        cycle_length: usize,
    ) -> Result<Self, DataError> {
        let mut table = Self::new(rt_axis, rt_tolerance)?;
        let step = cycle_length as i64;
        for window in table.windows.iter_mut() {
            let remainder = window.0.rem_euclid(step);
            if remainder != 0 {
                window.0 += step - remainder;
            }
        }
        table.step = step;
        Ok(table)
    }

    #[inline]
    pub fn window(&self, frame_index: usize) -> (i64, i64) {
        self.windows[frame_index]
    }

    #[inline]
    pub fn step(&self) -> i64 {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tof_offsets_cover_exactly_the_ppm_window() {
        let mz_axis: Vec<f64> = (0..200).map(|i| 400.0 + i as f64 * 0.01).collect();
        let table = TofIndexTolerance::new(&mz_axis, 50.0).unwrap();
        for t in 0..mz_axis.len() {
            let limit = mz_axis[t] * (1.0 + 50.0 * 1e-6);
            let reach = table.upper_offset(t as u32) as usize;
            for q in t..t + reach {
                assert!(mz_axis[q] < limit);
            }
            if t + reach < mz_axis.len() {
                assert!(mz_axis[t + reach] >= limit);
            }
        }
    }

    #[test]
    fn isotope_bounds_bracket_the_shifted_mass() {
        let mz_axis: Vec<f64> = (0..2000).map(|i| 400.0 + i as f64 * 0.001).collect();
        let table = IsotopeTofTolerance::new(&mz_axis, 20.0, 2).unwrap();
        let t = 100usize;
        let (lower, upper) = table.bounds(t as u32);
        let center = mz_axis[t] + ISOTOPIC_SPACING / 2.0;
        assert!(mz_axis[lower as usize] >= center * (1.0 - 20.0 * 1e-6));
        assert!(lower < upper);
        assert!(mz_axis[(upper - 1) as usize] < center * (1.0 + 20.0 * 1e-6));
    }

    #[test]
    fn scan_windows_respect_the_descending_axis() {
        let im_axis = vec![1.30f32, 1.25, 1.20, 1.15, 1.10];
        let table = ScanIndexTolerance::new(&im_axis, 0.06).unwrap();
        let (lower, upper) = table.window(2);
        assert!(lower <= 0 && 0 < upper);
        for offset in lower..upper {
            let q = (2 + offset) as usize;
            assert!((im_axis[q] - im_axis[2]).abs() <= 0.06 + 1e-6);
        }
        assert_eq!((lower, upper), (-1, 2));
        // edges never reach outside the axis
        let (lower0, _) = table.window(0);
        assert_eq!(lower0, 0);
        let (_, upper4) = table.window(4);
        assert_eq!(upper4, 1);
    }

    #[test]
    fn frame_windows_are_symmetric_inside_tolerance() {
        let rt_axis: Vec<f32> = (0..20).map(|i| i as f32 * 0.5).collect();
        let table = FrameIndexTolerance::new(&rt_axis, 1.0).unwrap();
        let (lower, upper) = table.window(10);
        assert_eq!((lower, upper), (-2, 3));
        let (lower0, _) = table.window(0);
        assert_eq!(lower0, 0);
    }

    #[test]
    fn cyclic_windows_round_the_lower_edge_up_to_a_cycle_multiple() {
        let rt_axis: Vec<f32> = (0..40).map(|i| i as f32 * 0.5).collect();
        let table = FrameIndexTolerance::cyclic(&rt_axis, 2.5, 4).unwrap();
        let (lower, upper) = table.window(20);
        assert_eq!(lower, -4);
        assert!(upper > 0);
        assert_eq!(table.step(), 4);
        let plain = FrameIndexTolerance::new(&rt_axis, 2.5).unwrap();
        assert_eq!(plain.window(20).0, -5);
    }

    #[test]
    fn empty_axis_is_rejected() {
        assert!(TofIndexTolerance::new(&[], 20.0).is_err());
        assert!(ScanIndexTolerance::new(&[], 0.01).is_err());
        assert!(FrameIndexTolerance::new(&[], 1.0).is_err());
    }
}

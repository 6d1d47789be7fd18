use crate::acquisition::DiaAcquisition;
use crate::config::SmoothingConfig;
use crate::errors::DataError;
use crate::executor::ParallelExecutor;
use crate::neighbors::{
    IonPairIter,
    NeighborScanIter,
};
use crate::tolerance::{
    FrameIndexTolerance,
    ScanIndexTolerance,
    TofIndexTolerance,
};

/// Gaussian neighbor pooling over the m/z, IM and RT windows.
///
/// Every peak receives the intensity of each peak inside its window,
/// weighted by the IM and RT distance between their scans. The m/z
/// window only selects partners, it does not weigh them. A peak is
/// always inside its own window, so an isolated peak keeps its raw
/// intensity.
pub struct Smoother<'a> {
    data: &'a DiaAcquisition,
    tof_window: TofIndexTolerance,
    im_window: ScanIndexTolerance,
    rt_window: FrameIndexTolerance,
    im_sigma: f32,
    rt_sigma: f32,
}

impl<'a> Smoother<'a> {
    pub fn new(
        data: &'a DiaAcquisition,
        config: &SmoothingConfig,
    ) -> Result<Self, DataError> {
        Ok(Self {
            data,
            tof_window: TofIndexTolerance::new(&data.mz_axis, config.ppm_tolerance)?,
            im_window: ScanIndexTolerance::new(&data.im_axis, config.im_tolerance)?,
            rt_window: FrameIndexTolerance::cyclic(
                &data.rt_axis,
                config.rt_tolerance,
                data.cycle_length,
            )?,
            im_sigma: config.resolved_im_sigma(),
            rt_sigma: config.resolved_rt_sigma(),
        })
    }

    /// Smoothed intensity of every peak, scans processed in parallel.
    pub fn smooth_all_scans(&self, executor: &ParallelExecutor) -> Vec<f32> {
        let mut smoothed = vec![0.0f32; self.data.num_peaks()];
        executor.run_segments(
            &self.data.scan_offsets,
            &mut smoothed,
            "smoothing scans",
            |scan, seg| self.smooth_scan(scan, seg),
        );
        smoothed
    }

    fn smooth_scan(&self, scan: usize, seg: &mut [f32]) {
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
                let correction = self.scan_correction(scan, other);
                for (index1, index2) in
                    IonPairIter::new(&self.data.tof_indices, &self.tof_window, run1, run2)
                {
                    seg[index1 - base] +=
                        correction * self.data.intensity_values[index2];
                }
            }
        }
    }

    fn scan_correction(&self, scan1: usize, scan2: usize) -> f32 {
        let im1 = self.data.im_axis[self.data.im_index(scan1)];
        let im2 = self.data.im_axis[self.data.im_index(scan2)];
        let rt1 = self.data.rt_axis[self.data.frame_index(scan1)];
        let rt2 = self.data.rt_axis[self.data.frame_index(scan2)];
        gauss(im1 - im2, self.im_sigma) * gauss(rt1 - rt2, self.rt_sigma)
    }
}

fn gauss(x: f32, sigma: f32) -> f32 {
    if sigma == 0.0 {
        1.0
    } else {
        (-(x / sigma).powi(2) / 2.0).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_frame_acquisition(
        tof_indices: Vec<u32>,
        intensity_values: Vec<f32>,
        scan_offsets: Vec<usize>,
    ) -> DiaAcquisition {
        DiaAcquisition {
            mz_axis: (0..2000).map(|i| 400.0 + i as f64 * 0.001).collect(),
            im_axis: vec![1.2, 1.1],
            rt_axis: vec![0.0, 0.5],
            tof_indices,
            intensity_values,
            scan_offsets,
            scans_per_frame: 2,
            cycle_length: 1,
            first_cycle_frame: 0,
        }
    }

    fn test_config() -> SmoothingConfig {
        SmoothingConfig {
            im_sigma: Some(0.05),
            im_tolerance: 0.15,
            ppm_tolerance: 30.0,
            rt_sigma: Some(0.25),
            rt_tolerance: 0.6,
            ..SmoothingConfig::default()
        }
    }

    #[test]
    fn isolated_peak_keeps_its_raw_intensity() {
        let data = two_frame_acquisition(vec![500], vec![2.0], vec![0, 1, 1, 1, 1]);
        let smoother = Smoother::new(&data, &test_config()).unwrap();
        let smoothed = smoother.smooth_all_scans(&ParallelExecutor::new(1));
        assert!((smoothed[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn peaks_in_neighboring_scans_pool_with_gaussian_weights() {
        let data = two_frame_acquisition(
            vec![500, 500],
            vec![2.0, 3.0],
            vec![0, 1, 2, 2, 2],
        );
        let smoother = Smoother::new(&data, &test_config()).unwrap();
        let smoothed = smoother.smooth_all_scans(&ParallelExecutor::new(2));
        let im_weight = gauss(data.im_axis[0] - data.im_axis[1], 0.05);
        assert!((smoothed[0] - (2.0 + 3.0 * im_weight)).abs() < 1e-5);
        assert!((smoothed[1] - (3.0 + 2.0 * im_weight)).abs() < 1e-5);
    }

    #[test]
    fn distant_mz_does_not_pool() {
        let data = two_frame_acquisition(
            vec![100, 1500],
            vec![2.0, 3.0],
            vec![0, 2, 2, 2, 2],
        );
        let smoother = Smoother::new(&data, &test_config()).unwrap();
        let smoothed = smoother.smooth_all_scans(&ParallelExecutor::new(1));
        assert!((smoothed[0] - 2.0).abs() < 1e-6);
        assert!((smoothed[1] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn rt_neighbors_pool_across_frames() {
        // one peak per frame, same scan position and tof bin
        let data = two_frame_acquisition(
            vec![500, 500],
            vec![2.0, 3.0],
            vec![0, 1, 1, 2, 2],
        );
        let smoother = Smoother::new(&data, &test_config()).unwrap();
        let smoothed = smoother.smooth_all_scans(&ParallelExecutor::new(1));
        let rt_weight = gauss(0.5, 0.25);
        assert!((smoothed[0] - (2.0 + 3.0 * rt_weight)).abs() < 1e-5);
        assert!((smoothed[1] - (3.0 + 2.0 * rt_weight)).abs() < 1e-5);
    }

    #[test]
    fn zero_sigma_weighs_every_window_member_fully() {
        assert_eq!(gauss(0.3, 0.0), 1.0);
        assert!(gauss(0.3, 0.1) < 1.0);
        assert_eq!(gauss(0.0, 0.1), 1.0);
    }
}

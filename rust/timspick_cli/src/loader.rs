use std::path::Path;
use std::time::Instant;

use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use timsrust::converters::ConvertableDomain;
use timsrust::readers::{
    FrameReader,
    MetadataReader,
};
use timsrust::{
    MSLevel,
    TimsRustError,
};
use timspick::errors::DataError;
use timspick::DiaAcquisition;
use tracing::info;

use crate::errors::CliError;

/// Flattens a Bruker `.d` sample into one global peak array.
///
/// Scans are concatenated frame by frame, so peak order is scan-major
/// with the TOF-ascending order within each scan kept from the raw
/// file. Coordinate axes come from the metadata converters: one m/z per
/// TOF bin up to the highest bin seen, one 1/K0 per scan position
/// (descending, as the hardware ramps) and one retention time per
/// frame.
pub fn flatten_dia_sample(sample_path: &Path) -> Result<DiaAcquisition, CliError> {
    let start = Instant::now();
    let frame_reader = FrameReader::new(sample_path).map_err(TimsRustError::from)?;
    let metadata =
        MetadataReader::new(sample_path.join("analysis.tdf")).map_err(TimsRustError::from)?;
    let num_frames = frame_reader.len();
    if num_frames == 0 {
        return Err(DataError::NoCycleStructure {
            reason: "the sample has no frames".to_string(),
        }
        .into());
    }
    info!("flattening {} frames from {}", num_frames, sample_path.display());

    let mut scans_per_frame = 0usize;
    let mut rt_axis: Vec<f32> = Vec::with_capacity(num_frames);
    let mut ms1_frames: Vec<usize> = Vec::new();
    let mut scan_offsets: Vec<usize> = vec![0];
    let mut tof_indices: Vec<u32> = Vec::new();
    let mut intensity_values: Vec<f32> = Vec::new();

    let bar = frame_progress_bar(num_frames as u64);
    for frame_index in 0..num_frames {
        let frame = frame_reader.get(frame_index).map_err(TimsRustError::from)?;
        let frame_scans = frame.scan_offsets.len().saturating_sub(1);
        if frame_index == 0 {
            scans_per_frame = frame_scans;
            scan_offsets.reserve(num_frames * scans_per_frame);
        } else if frame_scans != scans_per_frame {
            bar.abandon();
            return Err(DataError::NonUniformScanCount {
                frame: frame_index,
                expected: scans_per_frame,
                got: frame_scans,
            }
            .into());
        }
        rt_axis.push(frame.rt_in_seconds as f32);
        if frame.ms_level == MSLevel::MS1 {
            ms1_frames.push(frame_index);
        }
        let base = tof_indices.len();
        for scan in 0..frame_scans {
            scan_offsets.push(base + frame.scan_offsets[scan + 1]);
        }
        tof_indices.extend_from_slice(&frame.tof_indices);
        intensity_values.extend(frame.intensities.iter().map(|&i| i as f32));
        bar.inc(1);
    }
    bar.finish();

    let (cycle_length, first_cycle_frame) = resolve_cycle(&ms1_frames, num_frames)?;
    let num_tof_bins = tof_indices.iter().max().map_or(0, |&tof| tof as usize + 1);
    let mz_axis: Vec<f64> = (0..num_tof_bins)
        .map(|tof| metadata.mz_converter.convert(tof as f64))
        .collect();
    let im_axis: Vec<f32> = (0..scans_per_frame)
        .map(|scan| metadata.im_converter.convert(scan as f64) as f32)
        .collect();

    let data = DiaAcquisition {
        mz_axis,
        im_axis,
        rt_axis,
        tof_indices,
        intensity_values,
        scan_offsets,
        scans_per_frame,
        cycle_length,
        first_cycle_frame,
    };
    data.validate()?;
    info!(
        "flattened {} peaks over {} scans in {:#?}",
        data.num_peaks(),
        data.num_scans(),
        start.elapsed()
    );
    Ok(data)
}

/// Cycle shape from the precursor frame positions. Precursor frames
/// must be evenly spaced; the gap is the cycle length.
fn resolve_cycle(ms1_frames: &[usize], num_frames: usize) -> Result<(usize, usize), DataError> {
    let first = match ms1_frames.first() {
        Some(&first) => first,
        None => {
            return Err(DataError::NoCycleStructure {
                reason: "no precursor frames in the sample".to_string(),
            })
        }
    };
    if ms1_frames.len() == 1 {
        return Ok((num_frames - first, first));
    }
    let cycle_length = ms1_frames[1] - ms1_frames[0];
    for pair in ms1_frames.windows(2) {
        let gap = pair[1] - pair[0];
        if gap != cycle_length {
            return Err(DataError::NoCycleStructure {
                reason: format!(
                    "precursor frames are spaced unevenly ({} then {})",
                    cycle_length, gap
                ),
            });
        }
    }
    Ok((cycle_length, first))
}

fn frame_progress_bar(len: u64) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "{msg} {spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(len)
        .with_style(style)
        .with_message("flattening frames")
}

use std::path::Path;

use tracing::info;

use crate::acquisition::DiaAcquisition;
use crate::cluster::projections::{self, ProjectionSet};
use crate::cluster::{ClusterStats, Clusterer};
use crate::config::{IsotopeToleranceConfig, PickingConfig};
use crate::deisotoper::Deisotoper;
use crate::errors::{Result, TimspickError};
use crate::executor::ParallelExecutor;
use crate::ks::{CdfSet, KsTester1D, KsTester2D};
use crate::results::{write_precursor_records, MonoisotopicPrecursorRecord};
use crate::smooth::Smoother;
use crate::sparse_index::{explode_offsets, SparseIndex};
use crate::store::{ArrayStore, ArrayView};

/// Counts reported after a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub num_peaks: usize,
    pub num_clusters: usize,
    pub num_precursors: usize,
    pub num_fragments: usize,
    pub num_monoisotopic: usize,
}

/// Isotope search products for one charge state, reopened from the
/// store. Pointer values are ordinals into the precursor index.
struct ChargeLink {
    charge: u32,
    group: String,
    lower: ArrayView<u64>,
    upper: ArrayView<u64>,
}

/// Runs every picking stage in order against `data`, leaving all
/// products in a store rooted at `output_directory` and the final
/// monoisotopic precursor table in `results.parquet` next to them.
///
/// Each stage writes its outputs before the next stage starts; the
/// arrays a later stage consumes are reopened from the store rather
/// than kept live.
pub fn run(
    data: &DiaAcquisition,
    config: &PickingConfig,
    output_directory: &Path,
    sample_name: &str,
) -> Result<PipelineSummary> {
    config.validate()?;
    data.validate()?;

    info!("---------- SET NUMBER OF THREADS ----------");
    let executor = ParallelExecutor::new(config.number_of_threads);
    info!("number of threads: {}", executor.num_threads());

    let store = ArrayStore::create(output_directory)?;
    let ctx = StageContext {
        data,
        config,
        store: &store,
        executor: &executor,
    };

    ctx.record_acquisition(sample_name)?;
    let smooth = ctx.smoothing()?;
    let (index, stats, peak_scans) = ctx.clustering(&smooth)?;
    let precursor_index = ctx.ms1_precursors(&stats)?;
    let links = ctx.deisotoping(&stats, &precursor_index)?;
    let pair_lists = ctx.metrics_for_1d_projections(&links, &precursor_index.values)?;
    let ks_views = ctx.ks_testing(&index, &stats, &peak_scans, &links, &pair_lists)?;
    let (mono_ordinals, mono_charges) =
        ctx.mono_isotopes(&links, &ks_views, precursor_index.num_values())?;
    let fragment_ids = ctx.ms2_fragments(&stats)?;
    ctx.write_results(
        &stats,
        &precursor_index.values,
        &mono_ordinals,
        &mono_charges,
        output_directory,
    )?;

    info!("execution ended");
    Ok(PipelineSummary {
        num_peaks: data.num_peaks(),
        num_clusters: stats.num_clusters(),
        num_precursors: precursor_index.num_values(),
        num_fragments: fragment_ids.len(),
        num_monoisotopic: mono_ordinals.len(),
    })
}

struct StageContext<'a> {
    data: &'a DiaAcquisition,
    config: &'a PickingConfig,
    store: &'a ArrayStore,
    executor: &'a ParallelExecutor,
}

impl StageContext<'_> {
    fn record_acquisition(&self, sample_name: &str) -> Result<()> {
        self.store.set_attr("", "sample_name", &sample_name)?;
        self.store.set_attr("", "version", &env!("CARGO_PKG_VERSION"))?;
        self.store
            .put_array("acquisition/scan_offsets", &self.data.scan_offsets)?;
        self.store
            .set_attr("acquisition", "scans_per_frame", &self.data.scans_per_frame)?;
        self.store
            .set_attr("acquisition", "cycle_length", &self.data.cycle_length)?;
        self.store
            .set_attr("acquisition", "first_cycle_frame", &self.data.first_cycle_frame)?;
        info!("acquisition scan offsets and cycle shape saved to file");
        Ok(())
    }

    fn smoothing(&self) -> Result<ArrayView<f32>> {
        info!("---------- SMOOTHING ----------");
        let cfg = &self.config.smoothing;
        let smoother = Smoother::new(self.data, cfg)?;
        let smooth = smoother.smooth_all_scans(self.executor);
        info!("data smoothed");
        self.store
            .put_array("smoothing/smooth_intensity_values", &smooth)?;
        self.store
            .set_attr("smoothing", "algorithm_name", &cfg.algorithm_name)?;
        self.store
            .set_attr("smoothing", "ppm_tolerance", &cfg.ppm_tolerance)?;
        self.store
            .set_attr("smoothing", "im_tolerance", &cfg.im_tolerance)?;
        self.store
            .set_attr("smoothing", "rt_tolerance", &cfg.rt_tolerance)?;
        self.store
            .set_attr("smoothing", "im_sigma", &cfg.resolved_im_sigma())?;
        self.store
            .set_attr("smoothing", "rt_sigma", &cfg.resolved_rt_sigma())?;
        info!("smooth_intensity_values saved to file");
        let view = self
            .store
            .open_array::<f32>("smoothing/smooth_intensity_values")?;
        info!("smooth_intensity_values mapped");
        Ok(view)
    }

    fn clustering(&self, smooth: &[f32]) -> Result<(SparseIndex, ClusterStats, Vec<usize>)> {
        info!("---------- CLUSTERING ----------");
        let cfg = &self.config.clustering;
        let clusterer = Clusterer::new(self.data, smooth, cfg)?;
        let index = clusterer.cluster_all_scans(self.executor)?;
        info!("data clustered into {} clusters", index.num_entities());
        self.store
            .set_attr("clustering", "algorithm_name", &cfg.algorithm_name)?;
        self.store
            .set_attr("clustering", "ppm_tolerance", &cfg.ppm_tolerance)?;
        self.store
            .set_attr("clustering", "im_tolerance", &cfg.im_tolerance)?;
        self.store
            .set_attr("clustering", "rt_tolerance", &cfg.rt_tolerance)?;
        self.store
            .set_attr("clustering", "clustering_threshold", &cfg.clustering_threshold)?;
        self.store
            .put_array("clustering/raw_pointers/indptr", &index.offsets)?;
        self.store
            .put_array("clustering/raw_pointers/indices", &index.values)?;
        info!("raw cluster pointers saved to file");

        let peak_scans = explode_offsets(&self.data.scan_offsets);
        info!("expanded scan pointers calculated");
        let stats =
            ClusterStats::compute(self.data, &index, smooth, &peak_scans, self.executor)?;
        info!("cluster statistics calculated");
        self.save_stats_dataframe(&stats)?;
        info!("cluster statistics saved to file");

        let xics = projections::rt_projections(self.data, &index, &stats, &peak_scans, self.executor);
        self.save_projection("clustering/rt_projection", &xics)?;
        info!("rt projections saved to file");
        let mobilograms =
            projections::im_projections(self.data, &index, &stats, &peak_scans, self.executor);
        self.save_projection("clustering/im_projection", &mobilograms)?;
        info!("im projections saved to file");
        Ok((index, stats, peak_scans))
    }

    fn save_stats_dataframe(&self, stats: &ClusterStats) -> Result<()> {
        self.store
            .put_array("clustering/as_dataframe/apex_pointer", &stats.apex_indices)?;
        self.store
            .put_array("clustering/as_dataframe/number_of_ions", &stats.sizes)?;
        self.store
            .put_array("clustering/as_dataframe/frame_group", &stats.frame_groups)?;
        self.store
            .put_array("clustering/as_dataframe/mz_weighted_average", &stats.mz_means)?;
        self.store
            .put_array("clustering/as_dataframe/im_weighted_average", &stats.im_means)?;
        self.store
            .put_array("clustering/as_dataframe/rt_weighted_average", &stats.rt_means)?;
        self.store
            .put_array("clustering/as_dataframe/summed_intensity", &stats.intensity_sums)?;
        Ok(())
    }

    fn save_projection(&self, group: &str, set: &ProjectionSet) -> Result<()> {
        self.store
            .put_array(&format!("{}/indptr", group), &set.offsets)?;
        self.store
            .put_array(&format!("{}/summed_intensity_values", group), &set.values)?;
        self.store
            .put_array(&format!("{}/start_index", group), &set.start_indices)?;
        Ok(())
    }

    fn ms1_precursors(&self, stats: &ClusterStats) -> Result<SparseIndex> {
        info!("---------- MS1 PRECURSORS ----------");
        let min_size = self.config.ms1.precursors.min_size;
        let precursor_ids = apex_ordered_clusters(stats, min_size, |group| group == 0);
        info!("{} precursor cluster pointers generated", precursor_ids.len());
        self.store.set_attr("ms1/precursors", "min_size", &min_size)?;
        self.store
            .put_array("ms1/precursors/cluster_pointers", &precursor_ids)?;
        info!("precursor cluster pointers saved to file");
        let precursor_index = per_scan_apex_index(self.data, stats, precursor_ids);
        info!("sparse precursor index generated");
        Ok(precursor_index)
    }

    fn deisotoping(
        &self,
        stats: &ClusterStats,
        precursor_index: &SparseIndex,
    ) -> Result<Vec<ChargeLink>> {
        info!("---------- DEISOTOPING ----------");
        let charge_configs = [
            (2u32, &self.config.ms1.isotopes.charge_2),
            (3u32, &self.config.ms1.isotopes.charge_3),
        ];
        let mut links = Vec::with_capacity(charge_configs.len());
        for (charge, cfg) in charge_configs {
            links.push(self.charge_deisotoping(stats, precursor_index, cfg, charge)?);
        }
        Ok(links)
    }

    fn charge_deisotoping(
        &self,
        stats: &ClusterStats,
        precursor_index: &SparseIndex,
        cfg: &IsotopeToleranceConfig,
        charge: u32,
    ) -> Result<ChargeLink> {
        let deisotoper =
            Deisotoper::new(self.data, precursor_index, &stats.apex_indices, cfg, charge)?;
        let pairs = deisotoper.find_isotope_pairs(self.executor);
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        for (ordinal, &partner) in pairs.iter().enumerate() {
            if partner != -1 {
                lower.push(ordinal);
                upper.push(partner as usize);
            }
        }
        info!(
            "{} lower and upper isotope pointers generated for charge {}",
            lower.len(),
            charge
        );
        let group = format!("ms1/isotopes/charge_{}", charge);
        self.store.set_attr(&group, "ppm_tolerance", &cfg.ppm_tolerance)?;
        self.store.set_attr(&group, "im_tolerance", &cfg.im_tolerance)?;
        self.store.set_attr(&group, "rt_tolerance", &cfg.rt_tolerance)?;
        self.store
            .put_array(&format!("{}/lower_isotope_pointers", group), &lower)?;
        self.store
            .put_array(&format!("{}/upper_isotope_pointers", group), &upper)?;
        info!("isotope pointers saved to file for charge {}", charge);
        let lower = self
            .store
            .open_array::<u64>(&format!("{}/lower_isotope_pointers", group))?;
        let upper = self
            .store
            .open_array::<u64>(&format!("{}/upper_isotope_pointers", group))?;
        info!("isotope pointers mapped for charge {}", charge);
        Ok(ChargeLink {
            charge,
            group,
            lower,
            upper,
        })
    }

    fn metrics_for_1d_projections(
        &self,
        links: &[ChargeLink],
        precursor_values: &[usize],
    ) -> Result<Vec<Vec<(usize, usize)>>> {
        info!("---------- METRICS 1D PROJECTIONS ----------");
        let xic_offsets = reopened_offsets(
            &self.store.open_array::<u64>("clustering/rt_projection/indptr")?,
        );
        let xic_values = self
            .store
            .open_array::<f64>("clustering/rt_projection/summed_intensity_values")?;
        let xic_starts = self
            .store
            .open_array::<u32>("clustering/rt_projection/start_index")?;
        let mobilogram_offsets = reopened_offsets(
            &self.store.open_array::<u64>("clustering/im_projection/indptr")?,
        );
        let mobilogram_values = self
            .store
            .open_array::<f64>("clustering/im_projection/summed_intensity_values")?;
        let mobilogram_starts = self
            .store
            .open_array::<u32>("clustering/im_projection/start_index")?;
        let xic_cdfs = CdfSet {
            offsets: &xic_offsets,
            values: &xic_values,
            start_indices: &xic_starts,
        };
        let mobilogram_cdfs = CdfSet {
            offsets: &mobilogram_offsets,
            values: &mobilogram_values,
            start_indices: &mobilogram_starts,
        };
        info!("projection cdfs mapped");

        let mut pair_lists = Vec::with_capacity(links.len());
        for link in links {
            let pairs = cluster_pairs(&link.lower, &link.upper, precursor_values);
            info!("paired cluster indices calculated for charge {}", link.charge);
            let ks_rt = KsTester1D::new(xic_cdfs).calculate_all(&pairs, self.executor);
            let ks_im = KsTester1D::new(mobilogram_cdfs).calculate_all(&pairs, self.executor);
            info!("rt and im ks distances calculated for charge {}", link.charge);
            self.store
                .put_array(&format!("{}/metrics/ks_distance_rt", link.group), &ks_rt)?;
            self.store
                .put_array(&format!("{}/metrics/ks_distance_im", link.group), &ks_im)?;
            info!("rt and im ks distances saved to file for charge {}", link.charge);
            pair_lists.push(pairs);
        }
        Ok(pair_lists)
    }

    fn ks_testing(
        &self,
        index: &SparseIndex,
        stats: &ClusterStats,
        peak_scans: &[usize],
        links: &[ChargeLink],
        pair_lists: &[Vec<(usize, usize)>],
    ) -> Result<Vec<ArrayView<f32>>> {
        info!("---------- KS TESTING ----------");
        let tester = KsTester2D::new(self.data, index, stats, peak_scans);
        info!("ks tester generated");
        let mut views = Vec::with_capacity(links.len());
        for (link, pairs) in links.iter().zip(pair_lists) {
            let distances = tester.distances_for_pairs(pairs, self.executor);
            info!("im rt ks distances calculated for charge {}", link.charge);
            let key = format!("{}/metrics/ks_distance_im_rt", link.group);
            self.store.put_array(&key, &distances)?;
            info!("im rt ks distances saved to file for charge {}", link.charge);
            views.push(self.store.open_array::<f32>(&key)?);
            info!("im rt ks distances mapped for charge {}", link.charge);
        }
        Ok(views)
    }

    fn mono_isotopes(
        &self,
        links: &[ChargeLink],
        ks_views: &[ArrayView<f32>],
        num_precursors: usize,
    ) -> Result<(Vec<usize>, Vec<u32>)> {
        info!("---------- DETERMINING MONO-ISOTOPES ----------");
        let threshold = self.config.ms1.isotopes.monoisotopic_precursors.ks_2d_threshold;
        let mut assigned = vec![0i64; num_precursors];
        for (link, distances) in links.iter().zip(ks_views) {
            for (pair, &ordinal) in link.lower.iter().enumerate() {
                if (distances[pair] as f64) < threshold {
                    assigned[ordinal as usize] += link.charge as i64;
                }
            }
        }
        for (link, distances) in links.iter().zip(ks_views) {
            for (pair, &ordinal) in link.upper.iter().enumerate() {
                if (distances[pair] as f64) < threshold {
                    assigned[ordinal as usize] = 0;
                }
            }
        }
        let mono_ordinals: Vec<usize> = assigned
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value == 2 || value == 3)
            .map(|(ordinal, _)| ordinal)
            .collect();
        let charges: Vec<u32> = mono_ordinals
            .iter()
            .map(|&ordinal| assigned[ordinal] as u32)
            .collect();
        info!("{} monoisotopic precursors determined", mono_ordinals.len());
        self.store
            .set_attr("ms1/monoisotopic_precursors", "ks_2d_threshold", &threshold)?;
        self.store.put_array(
            "ms1/monoisotopic_precursors/as_dataframe/precursor_pointers",
            &mono_ordinals,
        )?;
        self.store
            .put_array("ms1/monoisotopic_precursors/as_dataframe/charge", &charges)?;
        info!("monoisotopic precursors and charges saved to file");
        Ok((mono_ordinals, charges))
    }

    fn ms2_fragments(&self, stats: &ClusterStats) -> Result<Vec<usize>> {
        info!("---------- MS2 FRAGMENTS ----------");
        let min_size = self.config.ms2.fragments.min_size;
        let fragment_ids = apex_ordered_clusters(stats, min_size, |group| group > 0);
        info!("{} fragment cluster pointers generated", fragment_ids.len());
        self.store.set_attr("ms2/fragments", "min_size", &min_size)?;
        self.store
            .put_array("ms2/fragments/cluster_pointers", &fragment_ids)?;
        info!("fragment cluster pointers saved to file");
        Ok(fragment_ids)
    }

    fn write_results(
        &self,
        stats: &ClusterStats,
        precursor_values: &[usize],
        mono_ordinals: &[usize],
        mono_charges: &[u32],
        output_directory: &Path,
    ) -> Result<()> {
        info!("---------- WRITING RESULTS ----------");
        let records: Vec<MonoisotopicPrecursorRecord> = mono_ordinals
            .iter()
            .zip(mono_charges)
            .map(|(&ordinal, &charge)| {
                let cluster = precursor_values[ordinal];
                MonoisotopicPrecursorRecord {
                    cluster_id: cluster as i64,
                    charge: charge as i32,
                    mz: stats.mz_means[cluster],
                    im: stats.im_means[cluster],
                    rt: stats.rt_means[cluster],
                    summed_intensity: stats.intensity_sums[cluster],
                    number_of_ions: stats.sizes[cluster] as i64,
                    apex_pointer: stats.apex_indices[cluster] as i64,
                }
            })
            .collect();
        let results_path = output_directory.join("results.parquet");
        write_precursor_records(&records, &results_path).map_err(|err| TimspickError::Io {
            source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
            path: Some(results_path.clone()),
        })?;
        info!("results table written to {}", results_path.display());
        Ok(())
    }
}

/// Clusters matching the frame group filter with at least `min_size`
/// members, ordered ascending by apex peak index. Apexes belong to
/// disjoint member sets, so the order is total.
fn apex_ordered_clusters(
    stats: &ClusterStats,
    min_size: u32,
    matches_group: impl Fn(u32) -> bool,
) -> Vec<usize> {
    let mut selected: Vec<usize> = (0..stats.num_clusters())
        .filter(|&cluster| {
            matches_group(stats.frame_groups[cluster]) && stats.sizes[cluster] >= min_size
        })
        .collect();
    selected.sort_by_key(|&cluster| stats.apex_indices[cluster]);
    selected
}

/// Per-scan index over the selected clusters, keyed by the scan of each
/// cluster's apex. Apex-ascending input order groups the values by scan
/// and keeps them apex-TOF-ascending within it.
fn per_scan_apex_index(
    data: &DiaAcquisition,
    stats: &ClusterStats,
    cluster_ids: Vec<usize>,
) -> SparseIndex {
    let mut offsets = vec![0usize; data.num_scans() + 1];
    for &cluster in &cluster_ids {
        let scan = data.scan_of_peak(stats.apex_indices[cluster]);
        offsets[scan + 1] += 1;
    }
    for scan in 1..offsets.len() {
        offsets[scan] += offsets[scan - 1];
    }
    SparseIndex::new(offsets, cluster_ids)
}

fn cluster_pairs(
    lower: &[u64],
    upper: &[u64],
    precursor_values: &[usize],
) -> Vec<(usize, usize)> {
    lower
        .iter()
        .zip(upper)
        .map(|(&lo, &up)| (precursor_values[lo as usize], precursor_values[up as usize]))
        .collect()
}

fn reopened_offsets(view: &[u64]) -> Vec<usize> {
    view.iter().map(|&offset| offset as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(
        frame_groups: Vec<u32>,
        sizes: Vec<u32>,
        apex_indices: Vec<usize>,
    ) -> ClusterStats {
        let n = frame_groups.len();
        ClusterStats {
            sizes,
            mz_means: vec![0.0; n],
            im_means: vec![0.0; n],
            rt_means: vec![0.0; n],
            intensity_sums: vec![1.0; n],
            apex_indices,
            frame_groups,
            im_boundaries: vec![(0, 0); n],
            rt_boundaries: vec![(0, 0); n],
        }
    }

    #[test]
    fn cluster_selection_filters_and_orders_by_apex() {
        let stats = stats_with(
            vec![0, 1, 0, 0],
            vec![12, 20, 4, 9],
            vec![40, 10, 20, 5],
        );
        // cluster 1 is a fragment, cluster 2 is too small
        assert_eq!(apex_ordered_clusters(&stats, 5, |g| g == 0), vec![3, 0]);
        assert_eq!(apex_ordered_clusters(&stats, 5, |g| g > 0), vec![1]);
    }

    #[test]
    fn apex_scan_index_groups_clusters_by_scan() {
        let data = DiaAcquisition {
            mz_axis: vec![400.0, 400.001],
            im_axis: vec![1.2, 1.1],
            rt_axis: vec![0.0, 0.5],
            tof_indices: vec![0, 0, 0, 0],
            intensity_values: vec![1.0; 4],
            scan_offsets: vec![0, 2, 2, 3, 4],
            scans_per_frame: 2,
            cycle_length: 1,
            first_cycle_frame: 0,
        };
        let stats = stats_with(vec![0, 0, 0], vec![1, 1, 1], vec![3, 0, 1]);
        let index = per_scan_apex_index(&data, &stats, vec![1, 2, 0]);
        // apexes 0 and 1 sit in scan 0, apex 3 in scan 3
        assert_eq!(index.offsets, vec![0, 2, 2, 2, 3]);
        assert_eq!(index.values, vec![1, 2, 0]);
    }

    #[test]
    fn ordinal_pairs_map_to_cluster_ids() {
        let pairs = cluster_pairs(&[0, 2], &[1, 3], &[10, 11, 12, 13]);
        assert_eq!(pairs, vec![(10, 11), (12, 13)]);
    }
}

use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::ConfigError;

/// Parameters for every stage of the picking pipeline.
///
/// Any subset can be given in a config file, omitted fields and sections
/// fall back to the defaults below.
///
/// ```
/// use timspick::config::PickingConfig;
///
/// let config: PickingConfig = serde_json::from_str(
///     r#"{"clustering": {"clustering_threshold": 8}}"#,
/// ).unwrap();
/// assert_eq!(config.clustering.clustering_threshold, 8);
/// assert_eq!(config.ms2.fragments.min_size, 5);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PickingConfig {
    pub number_of_threads: usize,
    pub smoothing: SmoothingConfig,
    pub clustering: ClusteringConfig,
    pub ms1: Ms1Config,
    pub ms2: Ms2Config,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    pub algorithm_name: String,
    /// Defaults to a third of the IM tolerance when not set.
    pub im_sigma: Option<f32>,
    pub im_tolerance: f32,
    pub ppm_tolerance: f64,
    /// Defaults to a third of the RT tolerance when not set.
    pub rt_sigma: Option<f32>,
    pub rt_tolerance: f32,
}

impl SmoothingConfig {
    pub fn resolved_im_sigma(&self) -> f32 {
        self.im_sigma.unwrap_or(self.im_tolerance / 3.0)
    }

    pub fn resolved_rt_sigma(&self) -> f32 {
        self.rt_sigma.unwrap_or(self.rt_tolerance / 3.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusteringConfig {
    pub algorithm_name: String,
    pub im_tolerance: f32,
    pub ppm_tolerance: f64,
    pub rt_tolerance: f32,
    /// Minimum number of ions a cluster must gather to survive.
    pub clustering_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Ms1Config {
    pub precursors: PrecursorConfig,
    pub isotopes: IsotopeSearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrecursorConfig {
    pub min_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IsotopeSearchConfig {
    pub charge_2: IsotopeToleranceConfig,
    pub charge_3: IsotopeToleranceConfig,
    pub monoisotopic_precursors: MonoisotopicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IsotopeToleranceConfig {
    pub im_tolerance: f32,
    pub ppm_tolerance: f64,
    pub rt_tolerance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonoisotopicConfig {
    pub ks_2d_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Ms2Config {
    pub fragments: FragmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FragmentConfig {
    pub min_size: u32,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            number_of_threads: default_thread_count(),
            smoothing: SmoothingConfig::default(),
            clustering: ClusteringConfig::default(),
            ms1: Ms1Config::default(),
            ms2: Ms2Config::default(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            algorithm_name: "smoothing_algorithm_1".to_string(),
            im_sigma: None,
            im_tolerance: 0.004,
            ppm_tolerance: 30.0,
            rt_sigma: None,
            rt_tolerance: 1.5,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            algorithm_name: "clustering_algorithm_1".to_string(),
            im_tolerance: 0.004,
            ppm_tolerance: 20.0,
            rt_tolerance: 1.5,
            clustering_threshold: 5,
        }
    }
}

impl Default for PrecursorConfig {
    fn default() -> Self {
        Self { min_size: 10 }
    }
}

impl Default for IsotopeToleranceConfig {
    fn default() -> Self {
        Self {
            im_tolerance: 0.004,
            ppm_tolerance: 20.0,
            rt_tolerance: 1.5,
        }
    }
}

impl Default for MonoisotopicConfig {
    fn default() -> Self {
        Self { ks_2d_threshold: 0.4 }
    }
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self { min_size: 5 }
    }
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl PickingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        check_tolerance("smoothing", "ppm_tolerance", self.smoothing.ppm_tolerance)?;
        check_tolerance(
            "smoothing",
            "im_tolerance",
            self.smoothing.im_tolerance as f64,
        )?;
        check_tolerance(
            "smoothing",
            "rt_tolerance",
            self.smoothing.rt_tolerance as f64,
        )?;
        check_sigma("smoothing", "im_sigma", self.smoothing.im_sigma)?;
        check_sigma("smoothing", "rt_sigma", self.smoothing.rt_sigma)?;
        check_tolerance("clustering", "ppm_tolerance", self.clustering.ppm_tolerance)?;
        check_tolerance(
            "clustering",
            "im_tolerance",
            self.clustering.im_tolerance as f64,
        )?;
        check_tolerance(
            "clustering",
            "rt_tolerance",
            self.clustering.rt_tolerance as f64,
        )?;
        if self.clustering.clustering_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                stage: "clustering",
                field: "clustering_threshold",
            });
        }
        if self.ms1.precursors.min_size == 0 {
            return Err(ConfigError::ZeroThreshold {
                stage: "ms1.precursors",
                field: "min_size",
            });
        }
        for (stage, charge) in [
            ("ms1.isotopes.charge_2", &self.ms1.isotopes.charge_2),
            ("ms1.isotopes.charge_3", &self.ms1.isotopes.charge_3),
        ] {
            check_tolerance(stage, "ppm_tolerance", charge.ppm_tolerance)?;
            check_tolerance(stage, "im_tolerance", charge.im_tolerance as f64)?;
            check_tolerance(stage, "rt_tolerance", charge.rt_tolerance as f64)?;
        }
        check_tolerance(
            "ms1.isotopes.monoisotopic_precursors",
            "ks_2d_threshold",
            self.ms1.isotopes.monoisotopic_precursors.ks_2d_threshold,
        )?;
        if self.ms2.fragments.min_size == 0 {
            return Err(ConfigError::ZeroThreshold {
                stage: "ms2.fragments",
                field: "min_size",
            });
        }
        Ok(())
    }
}

fn check_tolerance(
    stage: &'static str,
    field: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveTolerance {
            stage,
            field,
            value,
        })
    }
}

fn check_sigma(
    stage: &'static str,
    field: &'static str,
    value: Option<f32>,
) -> Result<(), ConfigError> {
    match value {
        Some(v) if v < 0.0 => Err(ConfigError::NonPositiveTolerance {
            stage,
            field,
            value: v as f64,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PickingConfig::default().validate().unwrap();
    }

    #[test]
    fn sigma_falls_back_to_a_third_of_the_tolerance() {
        let config = SmoothingConfig::default();
        assert!((config.resolved_im_sigma() - 0.004 / 3.0).abs() < 1e-9);
        assert!((config.resolved_rt_sigma() - 0.5).abs() < 1e-9);
        let pinned = SmoothingConfig {
            im_sigma: Some(0.012),
            ..SmoothingConfig::default()
        };
        assert_eq!(pinned.resolved_im_sigma(), 0.012);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: PickingConfig = serde_json::from_str(
            r#"{
                "number_of_threads": 3,
                "smoothing": {"ppm_tolerance": 25.0},
                "ms1": {"precursors": {"min_size": 7}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.number_of_threads, 3);
        assert_eq!(config.smoothing.ppm_tolerance, 25.0);
        assert_eq!(config.smoothing.rt_tolerance, 1.5);
        assert_eq!(config.ms1.precursors.min_size, 7);
        assert_eq!(config.ms1.isotopes.charge_2.ppm_tolerance, 20.0);
        assert_eq!(config.ms1.isotopes.monoisotopic_precursors.ks_2d_threshold, 0.4);
    }

    #[test]
    fn negative_tolerances_are_rejected() {
        let mut config = PickingConfig::default();
        config.clustering.im_tolerance = -0.1;
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::NonPositiveTolerance { stage, field, .. } => {
                assert_eq!(stage, "clustering");
                assert_eq!(field, "im_tolerance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_thread_count_is_rejected() {
        let mut config = PickingConfig::default();
        config.number_of_threads = 0;
        assert_eq!(config.validate().unwrap_err(), ConfigError::ZeroThreads);
    }

    #[test]
    fn zero_clustering_threshold_is_rejected() {
        let mut config = PickingConfig::default();
        config.clustering.clustering_threshold = 0;
        match config.validate().unwrap_err() {
            ConfigError::ZeroThreshold { field, .. } => {
                assert_eq!(field, "clustering_threshold")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

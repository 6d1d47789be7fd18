use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;
use timspick::PickingConfig;

/// Top-level configuration document. The picking sections are flattened
/// so a config file reads as one tree:
///
/// ```json
/// {
///     "sample_file_name": "sample.d",
///     "output_directory": "sample_picked",
///     "number_of_threads": 8,
///     "clustering": {"clustering_threshold": 8}
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub sample_file_name: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    #[serde(flatten)]
    pub picking: PickingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picking_sections_parse_next_to_the_paths() {
        let config: Config = serde_json::from_str(
            r#"{
                "sample_file_name": "a.d",
                "number_of_threads": 2,
                "ms1": {"precursors": {"min_size": 12}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.sample_file_name, Some(PathBuf::from("a.d")));
        assert_eq!(config.output_directory, None);
        assert_eq!(config.picking.number_of_threads, 2);
        assert_eq!(config.picking.ms1.precursors.min_size, 12);
        assert_eq!(config.picking.clustering.clustering_threshold, 5);
    }
}

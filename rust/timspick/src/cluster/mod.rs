pub mod engine;
pub mod projections;
pub mod stats;

pub use engine::Clusterer;
pub use projections::ProjectionSet;
pub use stats::ClusterStats;

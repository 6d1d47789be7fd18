pub mod acquisition;
pub mod cluster;
pub mod config;
pub mod deisotoper;
pub mod errors;
pub mod executor;
pub mod ks;
pub mod neighbors;
pub mod pipeline;
pub mod results;
pub mod smooth;
pub mod sparse_index;
pub mod store;
pub mod tolerance;
extern crate parquet;
#[macro_use]
extern crate parquet_derive;

pub use acquisition::DiaAcquisition;
pub use cluster::{
    ClusterStats,
    Clusterer,
    ProjectionSet,
};
pub use config::PickingConfig;
pub use errors::{
    Result,
    TimspickError,
};
pub use executor::ParallelExecutor;
pub use pipeline::{
    run,
    PipelineSummary,
};
pub use sparse_index::SparseIndex;
pub use store::ArrayStore;

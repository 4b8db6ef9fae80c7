pub mod barrier;
pub mod category;
pub mod config;
pub mod error;
pub mod generator;
pub mod grid;
pub mod outline;
pub mod region;
pub mod sampler;
pub mod topology;

pub use barrier::{BarrierDetector, BarrierMask};
pub use category::{Category, CategoryRules};
pub use config::{BarrierStrategy, GeneratorConfig, GridTopology, SlopeStatistic, SplitStrategy};
pub use error::{ConfigError, GenerationError, SampleError};
pub use generator::{
    Generation, GenerationCallback, Progress, RegionGenerator, Stage, partition_grid,
};
pub use grid::{Grid, compute_concurrency};
pub use outline::Point;
pub use region::png::RegionCanvas;
pub use region::{Region, RegionKind};
pub use sampler::{FnSampler, NoiseSampler, Sample, Sampler};
pub use topology::Domain;

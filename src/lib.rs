// Cross Mapping Library
// Learns a source-pose -> target-pose mapping from paired example snapshots
// using Gaussian radial basis function regression.

pub mod config;
pub mod error;
pub mod interpolation;
pub mod kernels;
pub mod mapping;
pub mod snapshot;
pub mod storage;
pub mod tracker;
pub mod types;

pub use config::{SolveMethod, SolverConfig};
pub use error::{MResult, MappingError};
pub use interpolation::ScatteredDataInterpolator;
pub use mapping::{CrossMapping, DistanceMatrices, MappingState};
pub use snapshot::{Snapshot, SnapshotSet};
pub use storage::{AnimationClip, MappingRecord};
pub use tracker::{ChannelId, ChannelIo, MemoryScene, PoseTracker};
pub use types::{Pose, Side};

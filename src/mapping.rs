use crate::config::{validate_sigma, SolverConfig};
use crate::error::{MResult, MappingError};
use crate::interpolation::ScatteredDataInterpolator;
use crate::snapshot::{Snapshot, SnapshotSet};
use crate::tracker::{ChannelId, ChannelIo, PoseTracker};
use crate::types::{euclidean_distance, Pose, Side};
use log::{debug, info, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Mapping session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingState {
    /// Source or target tracker missing
    Unconfigured,
    /// Both trackers bound, no model matching the current snapshots and sigma
    Configured,
    /// Model solved against the current snapshots and sigma
    Fitted,
}

/// Fitted model plus the session revision it was solved at
#[derive(Debug)]
struct FittedModel {
    interpolator: ScatteredDataInterpolator,
    revision: u64,
}

/// Pairwise snapshot distances, rows and columns in snapshot order
#[derive(Debug, Clone, Serialize)]
pub struct DistanceMatrices {
    pub names: Vec<String>,
    pub source: Vec<Vec<f64>>,
    pub target: Vec<Vec<f64>>,
}

/// Drives a target pose from a source pose through an RBF fitted on
/// named example snapshots.
///
/// Every mutation of the snapshot set or sigma bumps `revision`; a model
/// solved at an older revision stays usable but is reported as stale until
/// `solve` runs again.
#[derive(Debug)]
pub struct CrossMapping {
    source: Option<PoseTracker>,
    target: Option<PoseTracker>,
    sigma: f64,
    config: SolverConfig,
    snapshots: SnapshotSet,
    model: Option<FittedModel>,
    revision: u64,
}

impl CrossMapping {
    /// Create an empty session with the default solver configuration
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    pub fn with_config(config: SolverConfig) -> Self {
        CrossMapping {
            source: None,
            target: None,
            sigma: config.sigma,
            config,
            snapshots: SnapshotSet::new(),
            model: None,
            revision: 0,
        }
    }

    // ----- Trackers -----

    /// Bind the source channels. Discards every snapshot.
    pub fn init_source(&mut self, channels: Vec<ChannelId>, io: Box<dyn ChannelIo>) {
        info!("Source tracker bound to {} channel(s)", channels.len());
        self.source = Some(PoseTracker::new(channels, io));
        self.reset_snapshots();
    }

    /// Bind the target channels. Discards every snapshot.
    pub fn init_target(&mut self, channels: Vec<ChannelId>, io: Box<dyn ChannelIo>) {
        info!("Target tracker bound to {} channel(s)", channels.len());
        self.target = Some(PoseTracker::new(channels, io));
        self.reset_snapshots();
    }

    pub fn is_initialized(&self) -> bool {
        self.source.is_some() && self.target.is_some()
    }

    pub fn source_tracker(&self) -> Option<&PoseTracker> {
        self.source.as_ref()
    }

    pub fn target_tracker(&self) -> Option<&PoseTracker> {
        self.target.as_ref()
    }

    fn trackers_mut(&mut self) -> MResult<(&mut PoseTracker, &mut PoseTracker)> {
        match (self.source.as_mut(), self.target.as_mut()) {
            (Some(source), Some(target)) => Ok((source, target)),
            _ => Err(MappingError::NotInitialized),
        }
    }

    fn trackers(&self) -> MResult<(&PoseTracker, &PoseTracker)> {
        match (self.source.as_ref(), self.target.as_ref()) {
            (Some(source), Some(target)) => Ok((source, target)),
            _ => Err(MappingError::NotInitialized),
        }
    }

    // ----- Parameters -----

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Change the kernel bandwidth; the current model goes stale.
    pub fn set_sigma(&mut self, sigma: f64) -> MResult<()> {
        validate_sigma(sigma)?;
        if sigma != self.sigma {
            debug!("Sigma changed {} -> {}", self.sigma, sigma);
            self.sigma = sigma;
            self.touch();
        }
        Ok(())
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the solver configuration. Its `sigma` field is applied too.
    pub fn set_config(&mut self, config: SolverConfig) -> MResult<()> {
        config.validate()?;
        self.config = config;
        self.set_sigma(config.sigma)
    }

    // ----- Snapshots -----

    /// Capture both current poses under `name`, overwriting any existing one.
    pub fn new_snapshot(&mut self, name: &str) -> MResult<()> {
        let (source, target) = self.trackers()?;
        let snapshot = Snapshot::new(source.current_pose(), target.current_pose());
        if self.snapshots.insert(name, snapshot).is_some() {
            debug!("Snapshot '{}' recaptured", name);
        } else {
            debug!("Snapshot '{}' captured", name);
        }
        self.touch();
        Ok(())
    }

    pub fn delete_snapshot(&mut self, name: &str) -> MResult<()> {
        self.snapshots
            .remove(name)
            .ok_or_else(|| MappingError::NotFound(name.to_string()))?;
        debug!("Snapshot '{}' deleted", name);
        self.touch();
        Ok(())
    }

    /// Write a stored snapshot back onto both trackers.
    pub fn go_to_snapshot(&mut self, name: &str) -> MResult<()> {
        if !self.is_initialized() {
            return Err(MappingError::NotInitialized);
        }
        let snapshot = self
            .snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| MappingError::NotFound(name.to_string()))?;
        let (source, target) = self.trackers_mut()?;
        source.set_current_pose(&snapshot.source)?;
        target.set_current_pose(&snapshot.target)?;
        Ok(())
    }

    /// Zero every bound channel on both trackers.
    pub fn reset_to_zero(&mut self) -> MResult<()> {
        let (source, target) = self.trackers_mut()?;
        source.reset_to_zero();
        target.reset_to_zero();
        Ok(())
    }

    pub fn snapshot(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.get(name)
    }

    pub fn snapshots(&self) -> &SnapshotSet {
        &self.snapshots
    }

    pub fn names_of_snapshots(&self) -> Vec<String> {
        self.snapshots.names()
    }

    pub fn number_of_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Replace the snapshot set wholesale. Lengths are not checked against
    /// the bound trackers; mismatches are only logged.
    pub fn replace_snapshots(&mut self, snapshots: SnapshotSet) {
        self.snapshots = snapshots;
        self.warn_on_length_mismatch();
        self.touch();
    }

    fn reset_snapshots(&mut self) {
        if !self.snapshots.is_empty() {
            info!("Discarding {} snapshot(s)", self.snapshots.len());
        }
        self.snapshots.clear();
        self.touch();
    }

    fn warn_on_length_mismatch(&self) {
        let expected = (
            self.source.as_ref().map(PoseTracker::dim),
            self.target.as_ref().map(PoseTracker::dim),
        );
        for (name, snapshot) in self.snapshots.iter() {
            if let Some(dim) = expected.0.filter(|d| *d != snapshot.source.len()) {
                warn!(
                    "Snapshot '{}' has {} source values, tracker has {}",
                    name,
                    snapshot.source.len(),
                    dim
                );
            }
            if let Some(dim) = expected.1.filter(|d| *d != snapshot.target.len()) {
                warn!(
                    "Snapshot '{}' has {} target values, tracker has {}",
                    name,
                    snapshot.target.len(),
                    dim
                );
            }
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // ----- Solving -----

    /// Fit a new interpolator from every snapshot in insertion order.
    pub fn solve(&mut self) -> MResult<()> {
        if !self.is_initialized() {
            return Err(MappingError::NotInitialized);
        }
        self.solve_unchecked()
    }

    /// Fit without requiring bound trackers (offline use on loaded snapshots).
    pub fn solve_unchecked(&mut self) -> MResult<()> {
        let (source, target) = self.snapshots.training_pairs();
        let interpolator =
            ScatteredDataInterpolator::new(&source, &target, self.sigma, &self.config)?;
        info!(
            "Solved mapping over {} snapshot(s), sigma={}",
            interpolator.sample_count(),
            self.sigma
        );
        self.model = Some(FittedModel {
            interpolator,
            revision: self.revision,
        });
        Ok(())
    }

    pub fn interpolator(&self) -> Option<&ScatteredDataInterpolator> {
        self.model.as_ref().map(|m| &m.interpolator)
    }

    fn fitted(&self) -> MResult<&ScatteredDataInterpolator> {
        self.interpolator().ok_or(MappingError::NotFitted)
    }

    /// A model exists but was solved before the latest snapshot or sigma change.
    pub fn is_stale(&self) -> bool {
        self.model
            .as_ref()
            .map_or(false, |m| m.revision != self.revision)
    }

    pub fn is_ready_to_run(&self) -> bool {
        self.is_initialized() && !self.snapshots.is_empty() && self.model.is_some()
    }

    pub fn state(&self) -> MappingState {
        if !self.is_initialized() {
            MappingState::Unconfigured
        } else if self.model.is_some() && !self.is_stale() {
            MappingState::Fitted
        } else {
            MappingState::Configured
        }
    }

    // ----- Applying -----

    pub fn apply(&self, pose: &[f64]) -> MResult<Pose> {
        self.fitted()?.interpolate(pose)
    }

    pub fn apply_sequence(&self, poses: &[Pose]) -> MResult<Vec<Pose>> {
        self.fitted()?.interpolate_many(poses)
    }

    /// Read the source pose, map it, write the target pose.
    pub fn apply_current(&mut self) -> MResult<()> {
        let interpolator = self.model.as_ref().map(|m| &m.interpolator);
        let interpolator = interpolator.ok_or(MappingError::NotFitted)?;
        let (source, target) = match (self.source.as_ref(), self.target.as_mut()) {
            (Some(source), Some(target)) => (source, target),
            _ => return Err(MappingError::NotInitialized),
        };
        let values = interpolator.interpolate(&source.current_pose())?;
        target.set_current_pose(&values)
    }

    /// `apply_current` for live-update callbacks: unfitted is a no-op.
    pub fn try_apply_current(&mut self) -> MResult<()> {
        match self.apply_current() {
            Err(MappingError::NotFitted) => Ok(()),
            other => other,
        }
    }

    /// Key the mapped target pose at each frame from the source pose there.
    pub fn bake(&mut self, frames: impl IntoIterator<Item = f64>) -> MResult<usize> {
        let interpolator = self.model.as_ref().map(|m| &m.interpolator);
        let interpolator = interpolator.ok_or(MappingError::NotFitted)?;
        let (source, target) = match (self.source.as_ref(), self.target.as_mut()) {
            (Some(source), Some(target)) => (source, target),
            _ => return Err(MappingError::NotInitialized),
        };

        let mut keyed = 0;
        for frame in frames {
            let values = interpolator.interpolate(&source.pose_at_frame(frame))?;
            target.set_pose_at_frame(frame, &values)?;
            keyed += 1;
        }
        info!("Baked {} frame(s)", keyed);
        Ok(keyed)
    }

    // ----- Diagnostics -----

    /// Root-mean-square error of the model over the snapshot pairs.
    pub fn fit_residual(&self) -> MResult<f64> {
        let interpolator = self.fitted()?;
        let mut sum_sq = 0.0;
        let mut count = 0usize;
        for (_, snapshot) in self.snapshots.iter() {
            let predicted = interpolator.interpolate(&snapshot.source)?;
            for (p, t) in predicted.iter().zip(snapshot.target.iter()) {
                sum_sq += (p - t).powi(2);
                count += 1;
            }
        }
        if count == 0 {
            return Ok(0.0);
        }
        Ok((sum_sq / count as f64).sqrt())
    }

    /// Distance from `pose` to each snapshot's source or target vector.
    pub fn distances_to_snapshots(&self, pose: &[f64], side: Side) -> MResult<Vec<f64>> {
        self.snapshots
            .iter()
            .map(|(name, snapshot)| {
                let other = match side {
                    Side::Source => &snapshot.source,
                    Side::Target => &snapshot.target,
                };
                if other.len() != pose.len() {
                    return Err(MappingError::InvalidInput(format!(
                        "pose has {} values, snapshot '{}' has {}",
                        pose.len(),
                        name,
                        other.len()
                    )));
                }
                Ok(euclidean_distance(pose, other))
            })
            .collect()
    }

    /// Pairwise distances among snapshot sources and among snapshot targets.
    pub fn snapshot_distance_matrices(&self) -> MResult<DistanceMatrices> {
        let (source, target) = self.snapshots.training_pairs();
        Ok(DistanceMatrices {
            names: self.snapshots.names(),
            source: rows(&pairwise_distances(&source)?),
            target: rows(&pairwise_distances(&target)?),
        })
    }
}

impl Default for CrossMapping {
    fn default() -> Self {
        Self::new()
    }
}

fn pairwise_distances(poses: &[Pose]) -> MResult<DMatrix<f64>> {
    if let Some(first) = poses.first() {
        if poses.iter().any(|p| p.len() != first.len()) {
            return Err(MappingError::InvalidInput(
                "snapshot vectors have differing lengths".to_string(),
            ));
        }
    }
    let n = poses.len();
    Ok(DMatrix::from_fn(n, n, |i, j| {
        euclidean_distance(&poses[i], &poses[j])
    }))
}

fn rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

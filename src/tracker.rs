use crate::error::{MResult, MappingError};
use crate::types::Pose;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Host channel identifier, conventionally `object.attribute`
///
/// Treated as opaque and round-tripped verbatim through storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(key: impl Into<String>) -> Self {
        ChannelId(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object part of an `object.attribute` key (whole key when there is no dot)
    pub fn object(&self) -> &str {
        self.0.rsplit_once('.').map_or(self.0.as_str(), |(obj, _)| obj)
    }

    /// Attribute part of an `object.attribute` key
    pub fn attribute(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, attr)| attr)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(key: &str) -> Self {
        ChannelId(key.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(key: String) -> Self {
        ChannelId(key)
    }
}

/// Read/write capability supplied by the host application
///
/// `frame` is a timeline position; hosts decide how unkeyed frames read.
pub trait ChannelIo {
    fn read(&self, channel: &ChannelId) -> f64;
    fn write(&mut self, channel: &ChannelId, value: f64);
    fn read_at_frame(&self, channel: &ChannelId, frame: f64) -> f64;
    fn write_at_frame(&mut self, channel: &ChannelId, frame: f64, value: f64);
}

/// Lets both trackers of a session bind to the same host scene.
impl<T: ChannelIo> ChannelIo for Rc<RefCell<T>> {
    fn read(&self, channel: &ChannelId) -> f64 {
        self.borrow().read(channel)
    }

    fn write(&mut self, channel: &ChannelId, value: f64) {
        self.borrow_mut().write(channel, value)
    }

    fn read_at_frame(&self, channel: &ChannelId, frame: f64) -> f64 {
        self.borrow().read_at_frame(channel, frame)
    }

    fn write_at_frame(&mut self, channel: &ChannelId, frame: f64, value: f64) {
        self.borrow_mut().write_at_frame(channel, frame, value)
    }
}

/// Binds an ordered channel list to a host capability
pub struct PoseTracker {
    channels: Vec<ChannelId>,
    io: Box<dyn ChannelIo>,
}

impl PoseTracker {
    pub fn new(channels: Vec<ChannelId>, io: Box<dyn ChannelIo>) -> Self {
        PoseTracker { channels, io }
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Pose vector length
    pub fn dim(&self) -> usize {
        self.channels.len()
    }

    pub fn current_pose(&self) -> Pose {
        self.channels.iter().map(|c| self.io.read(c)).collect()
    }

    pub fn pose_at_frame(&self, frame: f64) -> Pose {
        self.channels
            .iter()
            .map(|c| self.io.read_at_frame(c, frame))
            .collect()
    }

    pub fn set_current_pose(&mut self, values: &[f64]) -> MResult<()> {
        self.check_len(values)?;
        for (channel, value) in self.channels.iter().zip(values.iter()) {
            self.io.write(channel, *value);
        }
        Ok(())
    }

    pub fn set_pose_at_frame(&mut self, frame: f64, values: &[f64]) -> MResult<()> {
        self.check_len(values)?;
        for (channel, value) in self.channels.iter().zip(values.iter()) {
            self.io.write_at_frame(channel, frame, *value);
        }
        Ok(())
    }

    pub fn reset_to_zero(&mut self) {
        for channel in &self.channels {
            self.io.write(channel, 0.0);
        }
    }

    fn check_len(&self, values: &[f64]) -> MResult<()> {
        if values.len() != self.channels.len() {
            return Err(MappingError::InvalidInput(format!(
                "pose has {} values, tracker has {} channels",
                values.len(),
                self.channels.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for PoseTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoseTracker")
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// In-memory host scene
///
/// Holds a current value and a keyframe curve per channel. Frames between
/// keys read linearly interpolated values, frames outside the keyed range
/// hold the nearest key, and unkeyed channels read their current value.
#[derive(Clone, Debug, Default)]
pub struct MemoryScene {
    values: HashMap<ChannelId, f64>,
    /// Keys sorted by frame
    keys: HashMap<ChannelId, Vec<(f64, f64)>>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in the shared handle trackers can bind to.
    pub fn shared(self) -> Rc<RefCell<MemoryScene>> {
        Rc::new(RefCell::new(self))
    }

    pub fn keyframes(&self, channel: &ChannelId) -> &[(f64, f64)] {
        self.keys.get(channel).map(|k| k.as_slice()).unwrap_or(&[])
    }
}

impl ChannelIo for MemoryScene {
    fn read(&self, channel: &ChannelId) -> f64 {
        self.values.get(channel).copied().unwrap_or(0.0)
    }

    fn write(&mut self, channel: &ChannelId, value: f64) {
        self.values.insert(channel.clone(), value);
    }

    fn read_at_frame(&self, channel: &ChannelId, frame: f64) -> f64 {
        let keys = self.keyframes(channel);
        let (first, last) = match (keys.first(), keys.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return self.read(channel),
        };
        if frame.is_nan() {
            return self.read(channel);
        }
        if frame <= first.0 {
            return first.1;
        }
        if frame >= last.0 {
            return last.1;
        }

        let upper = keys.partition_point(|(f, _)| *f <= frame);
        let (f0, v0) = keys[upper - 1];
        let (f1, v1) = keys[upper];
        if f0 == frame {
            return v0;
        }
        let t = (frame - f0) / (f1 - f0);
        v0 + (v1 - v0) * t
    }

    fn write_at_frame(&mut self, channel: &ChannelId, frame: f64, value: f64) {
        let keys = self.keys.entry(channel.clone()).or_default();
        match keys.binary_search_by(|(f, _)| f.total_cmp(&frame)) {
            Ok(idx) => keys[idx].1 = value,
            Err(idx) => keys.insert(idx, (frame, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(keys: &[&str]) -> Vec<ChannelId> {
        keys.iter().map(|k| ChannelId::from(*k)).collect()
    }

    #[test]
    fn test_channel_id_parts() {
        let id = ChannelId::from("jaw_ctrl.translateY");
        assert_eq!(id.object(), "jaw_ctrl");
        assert_eq!(id.attribute(), Some("translateY"));
        assert_eq!(id.to_string(), "jaw_ctrl.translateY");

        let bare = ChannelId::new("weight");
        assert_eq!(bare.object(), "weight");
        assert_eq!(bare.attribute(), None);
    }

    #[test]
    fn test_channel_id_serializes_as_string() {
        let json = serde_json::to_string(&ChannelId::from("a.tx")).unwrap();
        assert_eq!(json, "\"a.tx\"");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "a.tx");
    }

    #[test]
    fn test_current_pose_roundtrip() {
        let scene = MemoryScene::new().shared();
        let mut tracker = PoseTracker::new(ids(&["a.tx", "a.ty"]), Box::new(scene.clone()));

        assert_eq!(tracker.dim(), 2);
        assert_eq!(tracker.current_pose(), vec![0.0, 0.0]);

        tracker.set_current_pose(&[1.5, -2.0]).unwrap();
        assert_eq!(tracker.current_pose(), vec![1.5, -2.0]);
        assert_eq!(scene.borrow().read(&ChannelId::from("a.ty")), -2.0);

        tracker.reset_to_zero();
        assert_eq!(tracker.current_pose(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_set_pose_length_mismatch() {
        let mut tracker = PoseTracker::new(ids(&["a.tx"]), Box::new(MemoryScene::new()));
        assert!(matches!(
            tracker.set_current_pose(&[1.0, 2.0]),
            Err(MappingError::InvalidInput(_))
        ));
        assert!(tracker.set_pose_at_frame(1.0, &[]).is_err());
    }

    #[test]
    fn test_keyframes_interpolate_and_hold() {
        let scene = MemoryScene::new().shared();
        let mut tracker = PoseTracker::new(ids(&["b.rx"]), Box::new(scene.clone()));

        tracker.set_pose_at_frame(10.0, &[4.0]).unwrap();
        tracker.set_pose_at_frame(0.0, &[0.0]).unwrap();

        assert_eq!(tracker.pose_at_frame(0.0), vec![0.0]);
        assert_eq!(tracker.pose_at_frame(5.0), vec![2.0]);
        assert_eq!(tracker.pose_at_frame(10.0), vec![4.0]);
        assert_eq!(tracker.pose_at_frame(-3.0), vec![0.0]);
        assert_eq!(tracker.pose_at_frame(30.0), vec![4.0]);

        // Re-keying an existing frame replaces the value
        tracker.set_pose_at_frame(10.0, &[8.0]).unwrap();
        assert_eq!(scene.borrow().keyframes(&ChannelId::from("b.rx")).len(), 2);
        assert_eq!(tracker.pose_at_frame(10.0), vec![8.0]);
    }

    #[test]
    fn test_unkeyed_frame_reads_current_value() {
        let mut scene = MemoryScene::new();
        scene.write(&ChannelId::from("c.s"), 0.75);
        let tracker = PoseTracker::new(ids(&["c.s"]), Box::new(scene));
        assert_eq!(tracker.pose_at_frame(12.0), vec![0.75]);
    }

    #[test]
    fn test_nan_frame_reads_current_value() {
        let scene = MemoryScene::new().shared();
        let mut tracker = PoseTracker::new(ids(&["d.ty"]), Box::new(scene.clone()));
        tracker.set_pose_at_frame(1.0, &[2.0]).unwrap();
        tracker.set_pose_at_frame(4.0, &[5.0]).unwrap();
        tracker.set_current_pose(&[-1.5]).unwrap();

        assert_eq!(tracker.pose_at_frame(f64::NAN), vec![-1.5]);
    }
}

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::validate_sigma;
use crate::error::{MResult, MappingError};
use crate::mapping::CrossMapping;
use crate::snapshot::SnapshotSet;
use crate::tracker::{ChannelId, ChannelIo};
use crate::types::Pose;

/// One persisted mapping (JSON-serializable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub name: String,
    pub sigma: f64,
    pub source_indices: Vec<ChannelId>,
    pub target_indices: Vec<ChannelId>,
    pub snapshots: SnapshotSet,
}

impl MappingRecord {
    /// Serialize a list of records to a JSON string
    pub fn list_to_json(records: &[MappingRecord]) -> MResult<String> {
        Ok(serde_json::to_string_pretty(records)?)
    }

    pub fn list_from_json(json: &str) -> MResult<Vec<MappingRecord>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Write every record to `path` as a JSON array.
pub fn save_mappings(path: &Path, records: &[MappingRecord]) -> MResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, records)?;
    info!("Saved {} mapping(s) to {}", records.len(), path.display());
    Ok(())
}

pub fn load_mappings(path: &Path) -> MResult<Vec<MappingRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let records: Vec<MappingRecord> = serde_json::from_reader(reader)?;
    info!("Loaded {} mapping(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Load the record at `index` of a mapping file.
pub fn load_mapping(path: &Path, index: usize) -> MResult<MappingRecord> {
    let mut records = load_mappings(path)?;
    if index >= records.len() {
        return Err(MappingError::Storage(format!(
            "{} holds {} mapping(s), index {} out of range",
            path.display(),
            records.len(),
            index
        )));
    }
    Ok(records.swap_remove(index))
}

impl CrossMapping {
    /// Snapshot the session into a persisted record.
    pub fn to_record(&self, name: &str) -> MResult<MappingRecord> {
        let (source, target) = match (self.source_tracker(), self.target_tracker()) {
            (Some(source), Some(target)) => (source, target),
            _ => return Err(MappingError::NotInitialized),
        };
        Ok(MappingRecord {
            name: name.to_string(),
            sigma: self.sigma(),
            source_indices: source.channels().to_vec(),
            target_indices: target.channels().to_vec(),
            snapshots: self.snapshots().clone(),
        })
    }

    /// Rebuild a session, binding the record's channels to host capabilities.
    pub fn from_record(
        record: &MappingRecord,
        source_io: Box<dyn ChannelIo>,
        target_io: Box<dyn ChannelIo>,
    ) -> MResult<Self> {
        let mut cm = CrossMapping::new();
        cm.init_source(record.source_indices.clone(), source_io);
        cm.init_target(record.target_indices.clone(), target_io);
        cm.configure_from_record(record)?;
        Ok(cm)
    }

    /// Take sigma and snapshots from a record, leaving trackers untouched.
    pub fn configure_from_record(&mut self, record: &MappingRecord) -> MResult<()> {
        validate_sigma(record.sigma)?;
        self.set_sigma(record.sigma)?;
        self.replace_snapshots(record.snapshots.clone());
        Ok(())
    }
}

/// Baked pose sequence, one pose per frame starting at frame 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub anim: Vec<Pose>,
}

impl AnimationClip {
    pub fn new(anim: Vec<Pose>) -> Self {
        AnimationClip { anim }
    }

    pub fn frame_count(&self) -> usize {
        self.anim.len()
    }

    /// Read a clip; `.gz` files are decompressed.
    pub fn load(path: &Path) -> MResult<Self> {
        let file = File::open(path)?;
        if is_gzip(path) {
            let reader = BufReader::new(GzDecoder::new(file));
            Ok(serde_json::from_reader(reader)?)
        } else {
            let reader = BufReader::new(file);
            Ok(serde_json::from_reader(reader)?)
        }
    }

    /// Write a clip; `.gz` files are compressed.
    pub fn save(&self, path: &Path) -> MResult<()> {
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

//! # Channel Recorder
//!
//! Writes every received channel frame as one JSON line. Files are rotated
//! after a fixed number of records and only the newest files are kept.
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00.123456Z","seq":0,"channels":[1024,1024,...]}
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channels::ChannelSink;
use crate::config::TelemetryConfig;
use crate::crsf::protocol::RcChannels;
use crate::error::Result;

const FILE_PREFIX: &str = "channels_";
const FILE_EXTENSION: &str = "jsonl";

#[derive(Debug, Serialize)]
struct ChannelRecord<'a> {
    timestamp: String,
    seq: u64,
    channels: &'a [u16],
}

/// JSONL recorder for remapped channel frames
#[derive(Debug)]
pub struct ChannelRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_index: u32,
    seq: u64,
}

impl ChannelRecorder {
    /// Create the recorder, creating `dir` if needed
    ///
    /// No file is opened until the first record arrives.
    pub fn new(
        dir: impl Into<PathBuf>,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            file_index: 0,
            seq: 0,
        })
    }

    /// Build from the `[telemetry]` section; `None` when recording is disabled
    pub fn from_config(config: &TelemetryConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let recorder = Self::new(
            &config.log_dir,
            config.max_records_per_file,
            config.max_files_to_keep,
        )?;
        info!("Recording channels to {}", config.log_dir);
        Ok(Some(recorder))
    }

    /// Append one record, rotating first if the current file is full
    pub fn record(&mut self, channels: &RcChannels) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = ChannelRecord {
            timestamp: Utc::now().to_rfc3339(),
            seq: self.seq,
            channels: &channels[..],
        };

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writer.write_all(b"\n")?;
        }

        self.records_in_file += 1;
        self.seq += 1;
        Ok(())
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Records written since creation
    pub fn records_written(&self) -> u64 {
        self.seq
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_index,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        let file = File::create(&path)?;
        debug!("Opened channel log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.file_index = self.file_index.wrapping_add(1);

        self.prune()
    }

    /// Remove the oldest files beyond `max_files_to_keep`
    fn prune(&self) -> Result<()> {
        let mut files = recorded_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // names sort by creation time
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            debug!("Removing old channel log {}", path.display());
            fs::remove_file(&path)?;
        }

        Ok(())
    }
}

impl ChannelSink for ChannelRecorder {
    fn on_channels(&mut self, channels: &RcChannels) {
        if let Err(e) = self.record(channels) {
            warn!("Failed to record channels: {}", e);
        }
    }
}

/// Channel log files in `dir`
fn recorded_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(FILE_PREFIX))
            .unwrap_or(false)
            && path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION);

        if is_log {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn channels(first: u16) -> RcChannels {
        let mut channels = [1024u16; 16];
        channels[0] = first;
        channels
    }

    fn read_lines(dir: &Path) -> Vec<serde_json::Value> {
        let mut files = recorded_files(dir).unwrap();
        files.sort();
        files
            .iter()
            .flat_map(|path| {
                fs::read_to_string(path)
                    .unwrap()
                    .lines()
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn test_records_are_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut recorder = ChannelRecorder::new(dir.path(), 100, 5).unwrap();

        recorder.record(&channels(0)).unwrap();
        recorder.record(&channels(2047)).unwrap();
        recorder.flush().unwrap();

        let lines = read_lines(dir.path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["seq"], 0);
        assert_eq!(lines[1]["seq"], 1);
        assert_eq!(lines[1]["channels"][0], 2047);
        assert_eq!(lines[1]["channels"].as_array().unwrap().len(), 16);
        assert!(lines[0]["timestamp"].is_string());
    }

    #[test]
    fn test_no_file_before_first_record() {
        let dir = TempDir::new().unwrap();
        let _recorder = ChannelRecorder::new(dir.path(), 100, 5).unwrap();
        assert!(recorded_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_rotation_and_pruning() {
        let dir = TempDir::new().unwrap();
        let mut recorder = ChannelRecorder::new(dir.path(), 2, 3).unwrap();

        for value in 0..9 {
            recorder.record(&channels(value)).unwrap();
        }
        recorder.flush().unwrap();

        // 9 records at 2 per file = 5 files, the 2 oldest pruned
        let files = recorded_files(dir.path()).unwrap();
        assert_eq!(files.len(), 3);

        let lines = read_lines(dir.path());
        let seqs: Vec<u64> = lines.iter().map(|l| l["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![4, 5, 6, 7, 8]);
        assert_eq!(recorder.records_written(), 9);
    }

    #[test]
    fn test_foreign_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let mut recorder = ChannelRecorder::new(dir.path(), 1, 1).unwrap();

        for value in 0..3 {
            recorder.record(&channels(value)).unwrap();
        }

        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(recorded_files(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_config_gives_no_recorder() {
        let config = TelemetryConfig::default();
        assert!(!config.enabled);
        assert!(ChannelRecorder::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_enabled_config_creates_directory() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("nested").join("logs");
        let config = TelemetryConfig {
            enabled: true,
            log_dir: log_dir.to_string_lossy().into_owned(),
            ..TelemetryConfig::default()
        };

        let recorder = ChannelRecorder::from_config(&config).unwrap().unwrap();
        assert!(log_dir.is_dir());
        assert_eq!(recorder.dir(), log_dir.as_path());
    }

    #[test]
    fn test_sink_records() {
        let dir = TempDir::new().unwrap();
        let mut recorder = ChannelRecorder::new(dir.path(), 100, 5).unwrap();

        recorder.on_channels(&channels(172));
        recorder.flush().unwrap();

        assert_eq!(read_lines(dir.path()).len(), 1);
    }
}

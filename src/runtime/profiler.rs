//! Profiling sink
//!
//! Records one event per model invocation as a JSON line. The file is created
//! (or truncated) when the profiler is attached and flushed when it is dropped.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

use super::Device;

#[derive(Debug, Serialize)]
struct Header<'a> {
    device: String,
    version: &'a str,
}

/// A single timed invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileEvent {
    pub name: String,
    pub start_us: u64,
    pub duration_us: u64,
}

#[derive(Debug)]
struct Sink {
    writer: BufWriter<File>,
    events: usize,
}

#[derive(Debug)]
pub struct Profiler {
    path: PathBuf,
    origin: Instant,
    sink: Mutex<Sink>,
}

impl Profiler {
    /// Create the sink file, replacing any previous profile
    pub fn create(path: &Path, device: &Device) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create profile directory {:?}", parent))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create profile file {:?}", path))?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            device: device.to_string(),
            version: env!("CARGO_PKG_VERSION"),
        };
        serde_json::to_writer(&mut writer, &header)?;
        writer.write_all(b"\n")?;

        Ok(Self {
            path: path.to_path_buf(),
            origin: Instant::now(),
            sink: Mutex::new(Sink { writer, events: 0 }),
        })
    }

    /// Number of events recorded so far
    pub fn event_count(&self) -> usize {
        self.sink.lock().events
    }

    pub fn scope(&self, name: &'static str) -> ProfileScope<'_> {
        ProfileScope {
            profiler: self,
            name,
            start: Instant::now(),
        }
    }

    fn record(&self, name: &str, start: Instant) {
        let event = ProfileEvent {
            name: name.to_string(),
            start_us: start.duration_since(self.origin).as_micros() as u64,
            duration_us: start.elapsed().as_micros() as u64,
        };
        debug!("{} took {}us", event.name, event.duration_us);

        let mut sink = self.sink.lock();
        let written = serde_json::to_writer(&mut sink.writer, &event)
            .map_err(std::io::Error::from)
            .and_then(|_| sink.writer.write_all(b"\n"));
        match written {
            Ok(()) => sink.events += 1,
            Err(e) => warn!("Failed to record profile event: {}", e),
        }
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        let events = self.event_count();
        if let Err(e) = self.sink.get_mut().writer.flush() {
            warn!("Failed to flush profile {:?}: {}", self.path, e);
        } else {
            debug!("Profile {:?} closed with {} events", self.path, events);
        }
    }
}

/// Guard that records an event for its lifetime
pub struct ProfileScope<'a> {
    profiler: &'a Profiler,
    name: &'static str,
    start: Instant,
}

impl Drop for ProfileScope<'_> {
    fn drop(&mut self) {
        self.profiler.record(self.name, self.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_profiler_writes_header_and_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/profile.bin");

        {
            let profiler = Profiler::create(&path, &Device::cpu()).unwrap();
            for _ in 0..3 {
                let _scope = profiler.scope("TextDetector");
            }
            drop(profiler.scope("TextRecognizer"));
            assert_eq!(profiler.event_count(), 4);
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("\"device\":\"cpu:0\""));

        let last: ProfileEvent = serde_json::from_str(lines[4]).unwrap();
        assert_eq!(last.name, "TextRecognizer");
    }

    #[test]
    fn test_profiler_truncates_previous_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.bin");
        std::fs::write(&path, "stale\nstale\nstale\n").unwrap();

        drop(Profiler::create(&path, &Device::cpu()).unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(!content.contains("stale"));
    }
}

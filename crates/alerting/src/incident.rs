//! Drowsiness incident log

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use dms::{AlertEvent, AlertListener};
use tracing::{debug, warn};

use crate::AlertError;

/// Same layout as C `ctime()`, e.g. "Sat Oct 18 14:03:12 2026"
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Appends one line per alert edge to a text file
#[derive(Debug, Clone)]
pub struct IncidentLog {
    path: PathBuf,
}

impl IncidentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> Result<(), AlertError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    // Never fails the frame pipeline
    fn record(&self, line: String) {
        match self.append(&line) {
            Ok(()) => debug!(path = %self.path.display(), "Incident logged"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to write incident log"),
        }
    }
}

fn local_time() -> String {
    chrono::Local::now().format(CTIME_FORMAT).to_string()
}

impl AlertListener for IncidentLog {
    fn on_alert_activated(&mut self, _event: &AlertEvent) {
        self.record(format!("Drowsiness detected at {}", local_time()));
    }

    fn on_alert_deactivated(&mut self, event: &AlertEvent) {
        self.record(format!(
            "Drowsiness cleared at {} (episode {}, alert {:.1}s)",
            local_time(),
            event.episode,
            event.alert_duration().as_secs_f64()
        ));
    }
}

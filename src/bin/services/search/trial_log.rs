use std::collections::BTreeMap;
use std::fs::{create_dir_all, read_to_string, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use chrono::Local;
use serde::{Deserialize, Serialize};
use crate::error::SacError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialTime {
    pub datetime: String,
    /// Seconds since the logger was created.
    pub elapsed: f64,
    /// Seconds since the previous record.
    pub delta: f64,
}

/// One line of the trial log. `target` is absent for failed trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub target: Option<f64>,
    pub params: BTreeMap<String, f64>,
    pub datetime: TrialTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Appends one JSON object per line to every configured file, flushing per trial.
pub struct TrialLogger {
    paths: Vec<PathBuf>,
    start: Instant,
    last: Instant,
}

impl TrialLogger {
    pub fn new(paths: &[PathBuf]) -> Result<Self, SacError> {
        for path in paths {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                create_dir_all(parent).map_err(|source| SacError::TrialLog { path: path.clone(), source })?;
            }
        }
        let now = Instant::now();
        Ok(Self { paths: paths.to_vec(), start: now, last: now })
    }

    pub fn log(
        &mut self,
        params: &BTreeMap<String, f64>,
        outcome: Result<f64, &SacError>,
    ) -> Result<TrialRecord, SacError> {
        let now = Instant::now();
        let record = TrialRecord {
            target: outcome.as_ref().ok().copied(),
            params: params.clone(),
            datetime: TrialTime {
                datetime: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                elapsed: now.duration_since(self.start).as_secs_f64(),
                delta: now.duration_since(self.last).as_secs_f64(),
            },
            error: outcome.err().map(|e| e.to_string()),
        };
        self.last = now;

        let line = serde_json::to_string(&record)?;
        for path in &self.paths {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| SacError::TrialLog { path: path.clone(), source })?;
            writeln!(file, "{line}")
                .and_then(|_| file.flush())
                .map_err(|source| SacError::TrialLog { path: path.clone(), source })?;
        }
        Ok(record)
    }
}

/// Read back every record of a trial log, in file order.
pub fn load_logs(path: &Path) -> Result<Vec<TrialRecord>, SacError> {
    let text = read_to_string(path).map_err(|source| SacError::TrialLog { path: path.to_path_buf(), source })?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(SacError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(x: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("gamma".to_string(), x), ("tau".to_string(), 0.5)])
    }

    #[test]
    fn every_path_gets_every_trial() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("logs.json"), dir.path().join("nested").join("logs2.json")];
        let mut logger = TrialLogger::new(&paths).unwrap();

        logger.log(&params(0.1), Ok(4.0)).unwrap();
        let failure = SacError::Environment("crashed".into());
        logger.log(&params(0.2), Err(&failure)).unwrap();

        for path in &paths {
            let records = load_logs(path).unwrap();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].target, Some(4.0));
            assert_eq!(records[0].params, params(0.1));
            assert_eq!(records[1].target, None);
            assert!(records[1].error.as_deref().unwrap().contains("crashed"));
        }
    }

    #[test]
    fn existing_logs_are_appended_to() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("logs.json")];
        TrialLogger::new(&paths).unwrap().log(&params(0.1), Ok(1.0)).unwrap();
        TrialLogger::new(&paths).unwrap().log(&params(0.3), Ok(2.0)).unwrap();

        let targets: Vec<Option<f64>> = load_logs(&paths[0]).unwrap().iter().map(|r| r.target).collect();
        assert_eq!(targets, vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn successful_records_omit_the_error_field() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("logs.json")];
        TrialLogger::new(&paths).unwrap().log(&params(0.1), Ok(1.0)).unwrap();
        let text = std::fs::read_to_string(&paths[0]).unwrap();
        assert!(!text.contains("error"));
        assert!(text.contains("\"elapsed\""));
    }

    #[test]
    fn garbage_lines_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(matches!(load_logs(&path), Err(SacError::TrialLogFormat(_))));
        assert!(matches!(load_logs(&dir.path().join("missing.json")), Err(SacError::TrialLog { .. })));
    }
}

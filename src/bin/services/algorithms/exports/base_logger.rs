use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;
use csv::Writer;
use chrono::Local;
use crate::error::SacError;

/// Timing columns every metadata row starts with.
#[derive(Clone, Copy, Debug)]
pub struct RecordBase {
    pub total_elapsed_secs: f64,
    pub interval_elapsed_secs: f64,
}

/// BaseLogger owns one timestamped run folder and its `metadata.csv`.
///
/// The header is taken from the first row; later rows are written in that
/// column order, and names the header does not know are dropped.
pub struct BaseLogger {
    writer: Writer<File>,
    header: Option<Vec<String>>,
    start_time: Instant,
    pub(crate) last_log_time: Instant,
    run_dir: PathBuf,
}

impl BaseLogger {
    /// Create `<base_dir>/<run_name>_<timestamp>` (suffixed when it already exists).
    pub fn new(base_dir: &Path, run_name: &str) -> Result<Self, SacError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut run_dir = base_dir.join(format!("{run_name}_{timestamp}"));
        let mut suffix = 1;
        while run_dir.exists() {
            run_dir = base_dir.join(format!("{run_name}_{timestamp}_{suffix}"));
            suffix += 1;
        }
        create_dir_all(&run_dir).map_err(|e| SacError::Metrics(format!("could not create {run_dir:?}: {e}")))?;

        let csv_path = run_dir.join("metadata.csv");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .map_err(|e| SacError::Metrics(format!("could not open {csv_path:?}: {e}")))?;

        let now = Instant::now();
        Ok(BaseLogger { writer: Writer::from_writer(file), header: None, start_time: now, last_log_time: now, run_dir })
    }

    pub fn make_base(&mut self) -> RecordBase {
        let now = Instant::now();
        let total = now.duration_since(self.start_time).as_secs_f64();
        let interval = now.duration_since(self.last_log_time).as_secs_f64();
        self.last_log_time = now;
        RecordBase { total_elapsed_secs: total, interval_elapsed_secs: interval }
    }

    /// Append one row of named scalars, prefixed by the timing columns.
    pub fn write_row(&mut self, scalars: &[(&str, f64)]) -> Result<RecordBase, SacError> {
        let base = self.make_base();
        let mut named: Vec<(String, f64)> = vec![
            ("total_elapsed_secs".to_string(), base.total_elapsed_secs),
            ("interval_elapsed_secs".to_string(), base.interval_elapsed_secs),
        ];
        named.extend(scalars.iter().map(|(k, v)| (k.to_string(), *v)));

        let header = match &self.header {
            Some(header) => header.clone(),
            None => {
                let header: Vec<String> = named.iter().map(|(k, _)| k.clone()).collect();
                self.writer.write_record(&header)?;
                self.header = Some(header.clone());
                header
            }
        };

        let row: Vec<String> = header
            .iter()
            .map(|column| {
                named
                    .iter()
                    .find(|(k, _)| k == column)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        self.writer.write_record(&row)?;
        self.writer.flush().map_err(|e| SacError::Metrics(e.to_string()))?;
        Ok(base)
    }

    /// Expose run directory path
    pub fn run_dir(&self) -> &PathBuf { &self.run_dir }
}

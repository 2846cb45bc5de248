use std::fs::{copy, create_dir_all, OpenOptions};
use std::io::Write;
use std::path::Path;
use crate::config::RunConfig;
use crate::error::SacError;
use crate::services::algorithms::exports::base_logger::BaseLogger;

/// Where a training run reports to. Every call may fail; the loop decides
/// whether a failure is fatal.
pub trait MetricsSink {
    /// Called once per run, before any other method.
    fn init(&mut self, config: &RunConfig, hyper: &[(&str, f64)]) -> Result<(), SacError>;
    fn log(&mut self, scalars: &[(&str, f64)]) -> Result<(), SacError>;
    fn watch(&mut self, name: &str, num_params: usize) -> Result<(), SacError>;
    /// Attach a file (e.g. a checkpoint) to the run.
    fn save(&mut self, artifact: &Path) -> Result<(), SacError>;

    /// Folder the run writes into, once `init` made one.
    fn run_dir(&self) -> Option<&Path> {
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn init(&mut self, _config: &RunConfig, _hyper: &[(&str, f64)]) -> Result<(), SacError> { Ok(()) }
    fn log(&mut self, _scalars: &[(&str, f64)]) -> Result<(), SacError> { Ok(()) }
    fn watch(&mut self, _name: &str, _num_params: usize) -> Result<(), SacError> { Ok(()) }
    fn save(&mut self, _artifact: &Path) -> Result<(), SacError> { Ok(()) }
}

/// File-based sink: one run folder per `init` under `config.output_dir`,
/// holding `config.csv`, `models.csv`, `metadata.csv` and `artifacts/`.
#[derive(Default)]
pub struct CsvMetrics {
    logger: Option<BaseLogger>,
}

impl CsvMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn logger(&mut self) -> Result<&mut BaseLogger, SacError> {
        self.logger
            .as_mut()
            .ok_or_else(|| SacError::Metrics("metrics sink used before init".into()))
    }

    fn append_line(path: &Path, header: &str, line: &str) -> Result<(), SacError> {
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SacError::Metrics(format!("could not open {path:?}: {e}")))?;
        if is_new {
            writeln!(file, "{header}").map_err(|e| SacError::Metrics(e.to_string()))?;
        }
        writeln!(file, "{line}").map_err(|e| SacError::Metrics(e.to_string()))
    }
}

impl MetricsSink for CsvMetrics {
    fn init(&mut self, config: &RunConfig, hyper: &[(&str, f64)]) -> Result<(), SacError> {
        let logger = BaseLogger::new(&config.output_dir, &config.run_name)?;
        let mut w = csv::Writer::from_path(logger.run_dir().join("config.csv"))?;
        w.write_record(["key", "value"])?;
        let fixed = [
            ("run_name", config.run_name.clone()),
            ("episodes", config.episodes.to_string()),
            ("buffer_size", config.buffer_size.to_string()),
            ("seed", config.seed.to_string()),
            ("save_every", config.save_every.to_string()),
            ("batch_size", config.batch_size.to_string()),
            ("warmup_samples", config.warmup_samples.to_string()),
            ("days", format!("{}..{}", config.days.start, config.days.end)),
        ];
        for (k, v) in fixed {
            w.write_record([k, v.as_str()])?;
        }
        for (k, v) in hyper {
            w.write_record([*k, v.to_string().as_str()])?;
        }
        w.flush().map_err(|e| SacError::Metrics(e.to_string()))?;

        self.logger = Some(logger);
        Ok(())
    }

    fn log(&mut self, scalars: &[(&str, f64)]) -> Result<(), SacError> {
        self.logger()?.write_row(scalars).map(|_| ())
    }

    fn watch(&mut self, name: &str, num_params: usize) -> Result<(), SacError> {
        let path = self.logger()?.run_dir().join("models.csv");
        Self::append_line(&path, "model,num_params", &format!("{name},{num_params}"))
    }

    fn save(&mut self, artifact: &Path) -> Result<(), SacError> {
        let dir = self.logger()?.run_dir().join("artifacts");
        create_dir_all(&dir).map_err(|e| SacError::Metrics(e.to_string()))?;
        let name = artifact
            .file_name()
            .ok_or_else(|| SacError::Metrics(format!("artifact {artifact:?} has no file name")))?;
        copy(artifact, dir.join(name)).map_err(|e| SacError::Metrics(format!("could not copy {artifact:?}: {e}")))?;
        Ok(())
    }

    fn run_dir(&self) -> Option<&Path> {
        self.logger.as_ref().map(|l| l.run_dir().as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> RunConfig {
        RunConfig { output_dir: dir.to_path_buf(), ..RunConfig::default() }
    }

    #[test]
    fn csv_sink_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvMetrics::new();
        sink.init(&config(dir.path()), &[("gamma", 0.9)]).unwrap();
        sink.watch("actor", 1234).unwrap();
        sink.log(&[("Reward", -3.0)]).unwrap();

        let artifact = dir.path().join("policy.mpk");
        std::fs::write(&artifact, b"weights").unwrap();
        sink.save(&artifact).unwrap();

        let run_dir = sink.run_dir().unwrap().to_path_buf();
        let cfg = std::fs::read_to_string(run_dir.join("config.csv")).unwrap();
        assert!(cfg.contains("run_name,SAC"));
        assert!(cfg.contains("gamma,0.9"));
        let models = std::fs::read_to_string(run_dir.join("models.csv")).unwrap();
        assert_eq!(models, "model,num_params\nactor,1234\n");
        assert!(run_dir.join("metadata.csv").exists());
        assert!(run_dir.join("artifacts").join("policy.mpk").exists());
    }

    #[test]
    fn run_dir_appears_after_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvMetrics::new();
        assert!(sink.run_dir().is_none());
        sink.init(&config(dir.path()), &[]).unwrap();
        assert!(sink.run_dir().unwrap().starts_with(dir.path()));

        let mut noop = NoopMetrics;
        noop.init(&config(dir.path()), &[]).unwrap();
        assert!(noop.run_dir().is_none());
    }

    #[test]
    fn csv_sink_needs_init() {
        let mut sink = CsvMetrics::new();
        assert!(matches!(sink.log(&[("Reward", 1.0)]), Err(SacError::Metrics(_))));
    }
}

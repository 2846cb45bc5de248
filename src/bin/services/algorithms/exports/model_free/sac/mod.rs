use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use burn::record::{NamedMpkFileRecorder, FullPrecisionSettings, Recorder};
use burn::module::Module;
use burn::tensor::backend::Backend;
use crate::error::SacError;
use crate::services::algorithms::model::Actor;

/// `<dir>/<run_name>SAC<episode>.mpk`, or `<run_name>SAC.mpk` without an episode.
pub fn checkpoint_path(dir: &Path, run_name: &str, episode: Option<usize>) -> PathBuf {
    let stem = match episode {
        Some(ep) => format!("{run_name}SAC{ep}"),
        None => format!("{run_name}SAC"),
    };
    dir.join(format!("{stem}.mpk"))
}

/// save policy snapshot, returning the file actually written
pub fn save_policy<M, B>(model: &M, dir: &Path, run_name: &str, episode: Option<usize>) -> Result<PathBuf, SacError>
where
    M: Module<B>,
    B: Backend,
{
    let path = checkpoint_path(dir, run_name, episode);
    create_dir_all(dir).map_err(|e| SacError::Checkpoint { path: path.clone(), reason: e.to_string() })?;

    // the recorder appends the extension itself
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.with_extension(""), &recorder)
        .map_err(|e| SacError::Checkpoint { path: path.clone(), reason: format!("{e:?}") })?;
    Ok(path)
}

/// Rebuild a policy written by `save_policy`; the layer sizes must match the run that saved it.
pub fn load_policy<B: Backend>(
    path: &Path,
    action_size: usize,
    hidden_size: usize,
    device: &B::Device,
) -> Result<Actor<B>, SacError> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(path.with_extension(""), device)
        .map_err(|e| SacError::Checkpoint { path: path.to_path_buf(), reason: format!("{e:?}") })?;
    Ok(Actor::new(device, action_size, hidden_size).load_record(record))
}

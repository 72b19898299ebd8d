use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{
    broadcast::{BroadcastSet, LoadError, LoadOptions},
    engine::{self, RunSummary},
    registry::RegistryFormat,
    write::{self, WriteError},
};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to write registry: {0}")]
    Write(#[from] WriteError),

    #[error("Cannot find broadcast directory {}", .0.display())]
    InputNotFound(PathBuf),
}

/// Rebuilds the registry at `output` from the broadcasts under `input`,
/// keeping entries of the previous registry that the broadcasts do not touch.
pub fn generate(
    input: &Path,
    output: &Path,
    format: &RegistryFormat,
) -> Result<(PathBuf, RunSummary), GenerateError> {
    let options = LoadOptions {
        env: format.env_filter().map(str::to_string),
    };
    let broadcasts = BroadcastSet::load(input, &options)?;

    let path = write::resolve_output_path(output, format);
    let mut registry = write::load_existing(&path, format);

    let summary = engine::run(&broadcasts, format, &mut registry);

    write::write(&path, format, &mut registry)?;

    info!(
        input = %input.display(),
        output = %path.display(),
        "Registry updated"
    );

    Ok((path, summary))
}

/// Broadcast root of an installed package: `node_modules/<package>/<dir>`,
/// then `<package>/<dir>`. Without a package, `dir` itself.
pub fn resolve_input_dir(
    base: &Path,
    package: Option<&str>,
    dir: &Path,
) -> Result<PathBuf, GenerateError> {
    let candidates = match package {
        Some(package) => vec![
            base.join("node_modules").join(package).join(dir),
            base.join(package).join(dir),
        ],
        None => vec![base.join(dir)],
    };

    candidates
        .iter()
        .find(|candidate| candidate.is_dir())
        .cloned()
        .ok_or_else(|| {
            GenerateError::InputNotFound(candidates.last().cloned().unwrap_or_default())
        })
}

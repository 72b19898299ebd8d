//! Tags broadcast files with metadata (`env`, custom `deployments`) that the
//! loader later reads from each file's `meta` object.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("I/O error on {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    SerdeError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a JSON object in {}", .0.display())]
    NotAnObject(PathBuf),

    #[error("Invalid assignment '{0}', expected key=value")]
    InvalidAssignment(String),

    #[error("Broadcast directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Parses a command-line value: numbers, booleans, null, objects and arrays
/// become JSON values, anything else stays a string.
pub fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if !value.is_string() => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Splits `key=value`; the key may use dots for nesting.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), MetaError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), parse_value(value)))
        }
        _ => Err(MetaError::InvalidAssignment(raw.to_string())),
    }
}

/// Sets `value` at a dotted `key`, creating (or replacing non-object)
/// intermediate objects along the way.
pub fn set_path(target: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            target.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            if !child.is_object() {
                *child = Value::Object(Map::new());
            }

            if let Value::Object(child) = child {
                set_path(child, rest, value);
            }
        }
    }
}

/// Recorded metadata from `path`; an absent file yields no metadata.
pub fn load_meta_file(path: &Path) -> Result<Map<String, Value>, MetaError> {
    if !path.exists() {
        debug!(path = %path.display(), "No meta file");
        return Ok(Map::new());
    }

    match read_json(path)? {
        Value::Object(meta) => Ok(meta),
        _ => Err(MetaError::NotAnObject(path.to_path_buf())),
    }
}

/// Merges `meta` into the `meta` object of every JSON file under `dir`.
/// Returns the number of files rewritten.
pub fn append_meta(dir: &Path, meta: &Map<String, Value>) -> Result<usize, MetaError> {
    if !dir.is_dir() {
        return Err(MetaError::MissingDirectory(dir.to_path_buf()));
    }

    let pattern = format!("{}/**/*.json", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut updated = 0;

    for path in glob::glob(&pattern)?.filter_map(Result::ok) {
        if !path.is_file() {
            continue;
        }

        let Value::Object(mut json) = read_json(&path)? else {
            return Err(MetaError::NotAnObject(path));
        };

        let target = json
            .entry("meta")
            .or_insert_with(|| Value::Object(Map::new()));

        if !target.is_object() {
            *target = Value::Object(Map::new());
        }

        if let Value::Object(target) = target {
            for (key, value) in meta {
                target.insert(key.clone(), value.clone());
            }
        }

        write_json(&path, &Value::Object(json))?;
        debug!(file = %path.display(), "Appended meta");
        updated += 1;
    }

    info!(dir = %dir.display(), files = updated, "Appended meta to broadcast files");

    Ok(updated)
}

fn read_json(path: &Path) -> Result<Value, MetaError> {
    let file = File::open(path).map_err(|source| MetaError::IoError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|source| MetaError::SerdeError {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(path: &Path, value: &Value) -> Result<(), MetaError> {
    let io_error = |source| MetaError::IoError {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| MetaError::SerdeError {
        path: path.to_path_buf(),
        source,
    })?;

    writer.flush().map_err(io_error)
}

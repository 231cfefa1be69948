//! Layered configuration edits: JSON patch objects and `path=value`
//! overrides merged onto an [`EvolabConfig`].

use evolab_core::{ConfigError, EvolabConfig};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{0}")]
    Invalid(String),
    #[error("unknown config path: {0}")]
    UnknownPath(String),
    #[error("{message} at {path}")]
    Deserialize { message: String, path: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

type PatchPath<'a> = SmallVec<[&'a str; 8]>;

/// Merge `patch` onto `config`, rejecting unknown keys and type changes.
/// The merged result is re-validated before it is returned.
pub fn apply_patch(config: &EvolabConfig, patch: &Value) -> Result<EvolabConfig, PatchError> {
    if !patch.is_object() {
        return Err(PatchError::Invalid("config patch must be a JSON object".into()));
    }
    let mut merged = serde_json::to_value(config)?;
    let mut path = PatchPath::new();
    merge_value(&mut merged, patch, &mut path)?;

    let text = serde_json::to_string(&merged)?;
    let mut de = serde_json::Deserializer::from_str(&text);
    let updated: EvolabConfig = serde_path_to_error::deserialize(&mut de).map_err(
        |err: serde_path_to_error::Error<serde_json::Error>| PatchError::Deserialize {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        },
    )?;
    updated.validate()?;
    Ok(updated)
}

/// Apply `path=value` overrides such as `species.distance_threshold=0.25`.
/// Values parse as JSON literals and fall back to plain strings.
pub fn apply_overrides<S: AsRef<str>>(
    config: &EvolabConfig,
    overrides: &[S],
) -> Result<EvolabConfig, PatchError> {
    if overrides.is_empty() {
        return Ok(config.clone());
    }
    let mut patch = Map::new();
    for entry in overrides {
        let entry = entry.as_ref();
        let Some((path, raw)) = entry.split_once('=') else {
            return Err(PatchError::Invalid(format!("expected path=value, got '{entry}'")));
        };
        let value = serde_json::from_str(raw.trim())
            .unwrap_or_else(|_| Value::String(raw.trim().to_owned()));
        insert_path(&mut patch, path.trim(), value)?;
    }
    apply_patch(config, &Value::Object(patch))
}

fn insert_path(map: &mut Map<String, Value>, path: &str, value: Value) -> Result<(), PatchError> {
    let mut segments = path.split('.').filter(|s| !s.is_empty());
    let Some(mut segment) = segments.next() else {
        return Err(PatchError::Invalid("empty config path".into()));
    };
    let mut current = map;
    for next in segments {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            PatchError::Invalid(format!("segment '{segment}' is set to a value and a section"))
        })?;
        segment = next;
    }
    current.insert(segment.to_owned(), value);
    Ok(())
}

fn mismatch(path: &[&str]) -> PatchError {
    PatchError::Invalid(format!("type mismatch at {}", path.join(".")))
}

fn parse_number(target: &Value, text: &str, path: &[&str]) -> Result<Value, PatchError> {
    let unparsable = || PatchError::Invalid(format!("cannot parse '{text}' for {}", path.join(".")));
    if target.is_u64() {
        return text.parse::<u64>().map(Value::from).map_err(|_| unparsable());
    }
    if target.is_i64() {
        return text.parse::<i64>().map(Value::from).map_err(|_| unparsable());
    }
    let parsed: f64 = text.parse().map_err(|_| unparsable())?;
    serde_json::Number::from_f64(parsed)
        .map(Value::Number)
        .ok_or_else(|| PatchError::Invalid(format!("non-finite float at {}", path.join("."))))
}

fn merge_value<'a>(
    target: &mut Value,
    patch: &'a Value,
    path: &mut PatchPath<'a>,
) -> Result<(), PatchError> {
    match target {
        Value::Object(target_map) => {
            let Value::Object(patch_map) = patch else {
                return Err(mismatch(path));
            };
            for (key, patch_value) in patch_map {
                path.push(key);
                let Some(target_value) = target_map.get_mut(key) else {
                    return Err(PatchError::UnknownPath(path.join(".")));
                };
                merge_value(target_value, patch_value, path)?;
                path.pop();
            }
            Ok(())
        }
        Value::Number(_) => match patch {
            Value::Number(_) => {
                *target = patch.clone();
                Ok(())
            }
            Value::String(text) => {
                *target = parse_number(target, text.trim(), path)?;
                Ok(())
            }
            _ => Err(mismatch(path)),
        },
        Value::Bool(_) => match patch {
            Value::Bool(_) => {
                *target = patch.clone();
                Ok(())
            }
            Value::String(text) => {
                *target = match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Value::Bool(true),
                    "false" | "no" | "off" | "0" => Value::Bool(false),
                    _ => return Err(mismatch(path)),
                };
                Ok(())
            }
            _ => Err(mismatch(path)),
        },
        Value::Array(_) => {
            if patch.is_array() {
                *target = patch.clone();
                Ok(())
            } else {
                Err(mismatch(path))
            }
        }
        Value::String(_) => match patch {
            Value::String(_) | Value::Null => {
                *target = patch.clone();
                Ok(())
            }
            _ => Err(mismatch(path)),
        },
        // Optional fields such as `rng_seed` accept any replacement.
        Value::Null => {
            *target = patch.clone();
            Ok(())
        }
    }
}

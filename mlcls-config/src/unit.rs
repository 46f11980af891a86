//! Configuration files and the merging of included files.
//!
//! A file may list other files under `includes`. The included files are
//! merged in order and must not define the same top-level key twice. The
//! including file is then merged on top of them: objects merge key by key,
//! any other value replaces the inherited one. An object carrying
//! `"_delete_": true` replaces the inherited object instead of merging.
//! An object may only override an inherited non-object value, other than
//! `null`, when it carries `"_delete_": true`.

use crate::common::*;

pub const DEFAULT_MAX_DEPTH: usize = 5;

const INCLUDES_KEY: &str = "includes";
const DELETE_KEY: &str = "_delete_";

/// A single configuration file with its includes unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUnit {
    /// Included files, relative to the directory of this file.
    pub includes: Vec<PathBuf>,
    pub body: Map<String, Value>,
}

impl ConfigUnit {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open '{}'", path.display()))?;
        let unit = Self::from_json5_str(&text)
            .with_context(|| format!("failed to parse '{}'", path.display()))?;
        Ok(unit)
    }

    pub fn from_json5_str(text: &str) -> Result<Self> {
        let mut body = match json5::from_str::<Value>(text)? {
            Value::Object(map) => map,
            _ => bail!("the configuration must be an object"),
        };
        let includes: Vec<PathBuf> = match body.remove(INCLUDES_KEY) {
            Some(value) => serde_json::from_value(value)
                .map_err(|err| format_err!("'{}' must be a list of paths: {}", INCLUDES_KEY, err))?,
            None => vec![],
        };
        Ok(Self { includes, body })
    }
}

/// Load a configuration file and resolve its includes.
pub fn load_merged(path: impl AsRef<Path>) -> Result<Value> {
    load_merged_opt(path, DEFAULT_MAX_DEPTH)
}

pub fn load_merged_opt(path: impl AsRef<Path>, max_depth: usize) -> Result<Value> {
    ensure!(max_depth > 0, "max_depth must be positive");
    let mut stack = vec![];
    let map = load_recursive(path.as_ref(), max_depth, &mut stack)?;
    Ok(Value::Object(map))
}

fn load_recursive(
    path: &Path,
    max_depth: usize,
    stack: &mut Vec<PathBuf>,
) -> Result<Map<String, Value>> {
    ensure!(
        stack.len() < max_depth,
        "max_depth exceeded when including '{}'",
        path.display()
    );
    let path = fs::canonicalize(path)
        .with_context(|| format!("cannot open '{}'", path.display()))?;
    ensure!(
        !stack.contains(&path),
        "circular inclusion of '{}'",
        path.display()
    );
    debug!("loading configuration '{}'", path.display());

    let ConfigUnit { includes, body } = ConfigUnit::load(&path)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    // load included files
    stack.push(path);
    let included: Vec<_> = includes
        .iter()
        .map(|include| load_recursive(&dir.join(include), max_depth, stack))
        .try_collect()?;
    stack.pop();

    let parent = merge_included(included)?;
    merge_maps(parent, body)
}

/// Combine included files. They must not share top-level keys.
fn merge_included(maps: impl IntoIterator<Item = Map<String, Value>>) -> Result<Map<String, Value>> {
    maps.into_iter()
        .flatten()
        .try_fold(Map::new(), |mut merged, (key, value)| -> Result<_> {
            ensure!(
                !merged.contains_key(&key),
                "duplicated key '{}' among included files",
                key
            );
            merged.insert(key, value);
            Ok(merged)
        })
}

/// Merge `overlay` on top of `base`.
pub fn merge_values(base: Value, overlay: Value) -> Result<Value> {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            Ok(Value::Object(merge_maps(base, overlay)?))
        }
        (base, Value::Object(mut overlay)) if !base.is_null() => {
            ensure!(
                take_delete_flag(&mut overlay)?,
                "cannot merge an object into the inherited value {}, set '{}' to replace it",
                base,
                DELETE_KEY
            );
            Ok(Value::Object(strip_delete_keys_in_map(overlay)?))
        }
        (_, overlay) => strip_delete_keys(overlay),
    }
}

fn merge_maps(base: Map<String, Value>, mut overlay: Map<String, Value>) -> Result<Map<String, Value>> {
    if take_delete_flag(&mut overlay)? {
        return strip_delete_keys_in_map(overlay);
    }

    overlay
        .into_iter()
        .try_fold(base, |mut base, (key, value)| -> Result<_> {
            let merged = match base.remove(&key) {
                Some(prev) => merge_values(prev, value)
                    .with_context(|| format!("failed to merge key '{}'", key))?,
                None => strip_delete_keys(value)?,
            };
            base.insert(key, merged);
            Ok(base)
        })
}

fn take_delete_flag(map: &mut Map<String, Value>) -> Result<bool> {
    match map.remove(DELETE_KEY) {
        None => Ok(false),
        Some(Value::Bool(flag)) => Ok(flag),
        Some(other) => bail!("'{}' must be a boolean, but found {}", DELETE_KEY, other),
    }
}

fn strip_delete_keys(value: Value) -> Result<Value> {
    let value = match value {
        Value::Object(map) => Value::Object(strip_delete_keys_in_map(map)?),
        Value::Array(values) => Value::Array(
            values
                .into_iter()
                .map(strip_delete_keys)
                .try_collect()?,
        ),
        value => value,
    };
    Ok(value)
}

fn strip_delete_keys_in_map(mut map: Map<String, Value>) -> Result<Map<String, Value>> {
    take_delete_flag(&mut map)?;
    map.into_iter()
        .map(|(key, value)| -> Result<_> { Ok((key, strip_delete_keys(value)?)) })
        .try_collect()
}

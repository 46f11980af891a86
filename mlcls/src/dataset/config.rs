use super::*;
use crate::common::*;

/// Dataset options as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// The registered dataset type name, for example `COCO`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The directory containing the images. A leading `~` is expanded.
    pub data_prefix: String,
    /// The annotation file.
    #[serde(default)]
    pub ann_file: Option<PathBuf>,
    /// If set, relative `data_prefix` and `ann_file` are resolved against it.
    #[serde(default)]
    pub data_root: Option<PathBuf>,
    #[serde(default)]
    pub test_mode: bool,
    /// Overrides the class catalog of the dataset type.
    #[serde(default)]
    pub metainfo: Option<MetaInfo>,
    /// Keep only a subset of the samples.
    #[serde(default)]
    pub indices: Option<Indices>,
    /// Data transforms, kept as is for the training pipeline.
    #[serde(default)]
    pub pipeline: Vec<serde_json::Value>,
}

impl DatasetConfig {
    /// Create the options with the given type name and image directory.
    pub fn new(kind: impl Into<String>, data_prefix: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data_prefix: data_prefix.into(),
            ann_file: None,
            data_root: None,
            test_mode: false,
            metainfo: None,
            indices: None,
            pipeline: vec![],
        }
    }
}

/// Subset selection of samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Indices {
    /// Keep the first N samples.
    First(usize),
    /// Keep the listed samples in the listed order.
    List(Vec<usize>),
}

impl Indices {
    pub fn select<T>(&self, items: Vec<T>) -> Result<Vec<T>> {
        match *self {
            Self::First(count) => {
                if count > items.len() {
                    warn!(
                        "requested the first {} samples but only {} are available",
                        count,
                        items.len()
                    );
                }
                Ok(items.into_iter().take(count).collect())
            }
            Self::List(ref indices) => {
                let len = items.len();
                let mut slots: Vec<_> = items.into_iter().map(Some).collect();
                indices
                    .iter()
                    .map(|&index| {
                        ensure!(
                            index < len,
                            "sample index {} is out of range with {} samples",
                            index,
                            len
                        );
                        slots[index]
                            .take()
                            .ok_or_else(|| format_err!("sample index {} is selected twice", index))
                    })
                    .try_collect()
            }
        }
    }
}

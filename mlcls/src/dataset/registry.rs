use super::*;
use crate::common::*;

/// The constructor of a registered dataset type.
pub type DatasetBuilder = fn(&DatasetConfig) -> Result<Box<dyn MultiLabelDataset>>;

/// The table of dataset types, looked up by the `type` name in
/// configuration files.
#[derive(Clone, Default)]
pub struct DatasetRegistry {
    builders: IndexMap<String, DatasetBuilder>,
}

impl DatasetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the dataset types shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .builders
            .insert("COCO".to_owned(), build_coco as DatasetBuilder);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, builder: DatasetBuilder) -> Result<()> {
        let name = name.into();
        ensure!(!name.is_empty(), "dataset type name must not be empty");
        ensure!(
            !self.builders.contains_key(&name),
            "dataset type '{}' is already registered",
            name
        );
        self.builders.insert(name, builder);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered type names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(|name| name.as_str())
    }

    /// Construct the dataset named by `config.kind`.
    pub fn build(&self, config: &DatasetConfig) -> Result<Box<dyn MultiLabelDataset>> {
        let builder = self.builders.get(&config.kind).ok_or_else(|| {
            format_err!(
                "dataset type '{}' is not registered, available types are {:?}",
                config.kind,
                self.names().collect::<Vec<_>>()
            )
        })?;
        debug!("building dataset of type '{}'", config.kind);
        builder(config).with_context(|| format!("failed to build '{}' dataset", config.kind))
    }
}

impl Debug for DatasetRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

fn build_coco(config: &DatasetConfig) -> Result<Box<dyn MultiLabelDataset>> {
    Ok(Box::new(CocoDataset::new(config)?))
}

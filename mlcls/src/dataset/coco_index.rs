//! Index over a COCO instances annotation file.
//!
//! Only the fields relevant to image-level labels are parsed. Boxes,
//! segmentations and the `info`/`licenses` sections are ignored.

use crate::common::*;

/// An image entry in the annotation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

/// An object annotation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// Marks a region covering a group of objects.
    #[serde(default, deserialize_with = "deserialize_iscrowd")]
    pub iscrowd: bool,
}

/// A category entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CocoFile {
    images: Vec<CocoImage>,
    #[serde(default)]
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
}

/// Lookup tables over images, annotations and categories.
///
/// Every table keeps the order in which entries appear in the file.
#[derive(Debug, Clone)]
pub struct CocoIndex {
    images: IndexMap<u64, CocoImage>,
    annotations: IndexMap<u64, CocoAnnotation>,
    categories: IndexMap<u64, CocoCategory>,
    image_to_annotations: HashMap<u64, Vec<u64>>,
}

impl CocoIndex {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading annotations from '{}'", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open '{}'", path.display()))?;
        let index = Self::from_json_str(&text)
            .with_context(|| format!("failed to parse '{}'", path.display()))?;
        info!(
            "indexed {} images, {} annotations and {} categories from '{}'",
            index.images.len(),
            index.annotations.len(),
            index.categories.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: CocoFile = serde_json::from_str(text)?;
        Self::build(file)
    }

    fn build(file: CocoFile) -> Result<Self> {
        let CocoFile {
            images: image_list,
            annotations: annotation_list,
            categories: category_list,
        } = file;

        let images = image_list
            .into_iter()
            .try_fold(IndexMap::new(), |mut map, image| -> Result<_> {
                let id = image.id;
                let prev = map.insert(id, image);
                ensure!(prev.is_none(), "duplicated image id {}", id);
                Ok(map)
            })?;
        let categories = category_list.into_iter().try_fold(
            IndexMap::new(),
            |mut map, category| -> Result<_> {
                let id = category.id;
                let prev = map.insert(id, category);
                ensure!(prev.is_none(), "duplicated category id {}", id);
                Ok(map)
            },
        )?;
        if let Some(name) = categories
            .values()
            .map(|cat: &CocoCategory| cat.name.as_str())
            .duplicates()
            .next()
        {
            bail!("duplicated category name '{}'", name);
        }
        let annotations = annotation_list.into_iter().try_fold(
            IndexMap::new(),
            |mut map, ann| -> Result<_> {
                let id = ann.id;
                ensure!(
                    images.contains_key(&ann.image_id),
                    "annotation {} refers to non-existent image id {}",
                    id,
                    ann.image_id
                );
                let prev = map.insert(id, ann);
                ensure!(prev.is_none(), "duplicated annotation id {}", id);
                Ok(map)
            },
        )?;

        let image_to_annotations = annotations
            .values()
            .map(|ann: &CocoAnnotation| (ann.image_id, ann.id))
            .into_group_map();

        Ok(Self {
            images,
            annotations,
            categories,
            image_to_annotations,
        })
    }

    /// Image ids in file order.
    pub fn img_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.images.keys().copied()
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn image(&self, img_id: u64) -> Result<&CocoImage> {
        self.images
            .get(&img_id)
            .ok_or_else(|| format_err!("image id {} does not exist", img_id))
    }

    pub fn categories(&self) -> impl Iterator<Item = &CocoCategory> {
        self.categories.values()
    }

    /// Resolve category names to category ids.
    ///
    /// The returned ids follow the order of `names` rather than the order
    /// of categories in the file.
    pub fn cat_ids_by_names<S>(&self, names: impl IntoIterator<Item = S>) -> Result<Vec<u64>>
    where
        S: AsRef<str>,
    {
        let name_to_id: HashMap<&str, u64> = self
            .categories
            .values()
            .map(|cat| (cat.name.as_str(), cat.id))
            .collect();

        names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                name_to_id
                    .get(name)
                    .copied()
                    .ok_or_else(|| format_err!("category '{}' is not defined in annotations", name))
            })
            .try_collect()
    }

    /// Annotation ids of an image in file order.
    pub fn ann_ids_of_image(&self, img_id: u64) -> Result<&[u64]> {
        ensure!(
            self.images.contains_key(&img_id),
            "image id {} does not exist",
            img_id
        );
        let ids = self
            .image_to_annotations
            .get(&img_id)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[]);
        Ok(ids)
    }

    pub fn annotations<'a>(
        &'a self,
        ann_ids: &'a [u64],
    ) -> impl Iterator<Item = Result<&'a CocoAnnotation>> + 'a {
        ann_ids.iter().map(move |id| {
            self.annotations
                .get(id)
                .ok_or_else(|| format_err!("annotation id {} does not exist", id))
        })
    }
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct IsCrowdVisitor;

    impl<'de> Visitor<'de> for IsCrowdVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
            formatter.write_str("a boolean or a numeric flag")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(false)
        }

        fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value != 0)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value != 0)
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value != 0.0)
        }
    }

    deserializer.deserialize_any(IsCrowdVisitor)
}

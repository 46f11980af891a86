use super::*;
use crate::common::*;

/// Directory names identifying the COCO 2017 image splits.
pub const COCO_SPLIT_MARKERS: [&str; 2] = ["train2017", "val2017"];

/// The Microsoft COCO 2017 dataset for multi-label classification.
///
/// Each image is labeled by the set of categories among its object
/// annotations. Categories annotated as crowd regions are also recorded in
/// [DataSample::gt_label_crowd], so that evaluation can treat them apart,
/// usually as negatives.
///
/// The expected directory layout is
///
/// ```text
/// coco/
/// ├── train2017/
/// ├── val2017/
/// └── annotations/
///     ├── instances_train2017.json
///     └── instances_val2017.json
/// ```
#[derive(Debug, Clone)]
pub struct CocoDataset {
    pub metainfo: MetaInfo,
    pub data_root: PathBuf,
    pub img_prefix: PathBuf,
    pub ann_file: PathBuf,
    pub test_mode: bool,
    pub data_list: Vec<DataSample>,
}

/// The labels extracted from the annotations of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLabels<'a> {
    pub labels: BTreeSet<usize>,
    /// The labels having at least one crowd annotation.
    pub crowd_labels: BTreeSet<usize>,
    /// The image path relative to the image directory.
    pub file_name: &'a str,
}

/// The mapping from category ids of an annotation file to label indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMap {
    cat_to_label: HashMap<u64, usize>,
}

impl CategoryMap {
    /// Build the mapping in the order of `classes`, regardless of the order
    /// of categories in the annotation file.
    pub fn new(index: &CocoIndex, classes: &IndexSet<String>) -> Result<Self> {
        let cat_ids = index.cat_ids_by_names(classes)?;
        let cat_to_label = cat_ids
            .into_iter()
            .enumerate()
            .map(|(label, cat_id)| (cat_id, label))
            .collect();
        Ok(Self { cat_to_label })
    }

    pub fn label_of(&self, cat_id: u64) -> Option<usize> {
        self.cat_to_label.get(&cat_id).copied()
    }
}

impl CocoDataset {
    pub fn new(config: &DatasetConfig) -> Result<Self> {
        let DatasetConfig {
            ref data_prefix,
            ref ann_file,
            ref data_root,
            test_mode,
            ref metainfo,
            ref indices,
            ..
        } = *config;

        let data_prefix = expand_user(data_prefix)?;
        {
            let text = data_prefix.to_string_lossy();
            ensure!(
                COCO_SPLIT_MARKERS
                    .iter()
                    .any(|marker| text.contains(marker)),
                "the data_prefix '{}' must contain one of {:?}",
                text,
                COCO_SPLIT_MARKERS
            );
        }

        let ann_file = ann_file
            .as_ref()
            .ok_or_else(|| format_err!("the COCO dataset requires the 'ann_file' option"))?;
        let ann_file = join_root(data_root.as_deref(), ann_file);
        let img_prefix = join_root(data_root.as_deref(), &data_prefix);
        let data_root = match data_root {
            Some(dir) => dir.clone(),
            None => img_prefix
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let metainfo = metainfo.clone().unwrap_or_else(MetaInfo::coco);

        let index = CocoIndex::load(&ann_file)?;
        let data_list = Self::load_data_list(&index, metainfo.classes(), &img_prefix)
            .with_context(|| format!("failed to load labels from '{}'", ann_file.display()))?;
        let data_list = match indices {
            Some(indices) => indices.select(data_list)?,
            None => data_list,
        };
        info!(
            "loaded {} COCO samples from '{}'",
            data_list.len(),
            img_prefix.display()
        );

        Ok(Self {
            metainfo,
            data_root,
            img_prefix,
            ann_file,
            test_mode,
            data_list,
        })
    }

    /// Build one sample per image of the index, in index order.
    pub fn load_data_list(
        index: &CocoIndex,
        classes: &IndexSet<String>,
        img_prefix: &Path,
    ) -> Result<Vec<DataSample>> {
        let cat_map = CategoryMap::new(index, classes)?;

        index
            .img_ids()
            .map(|img_id| -> Result<_> {
                let ImageLabels {
                    labels,
                    crowd_labels,
                    file_name,
                } = Self::labels_of_image(index, &cat_map, img_id)?;
                DataSample::new(img_prefix.join(file_name), labels, crowd_labels)
            })
            .try_collect()
    }

    /// Collect the deduplicated labels of an image.
    ///
    /// Repeated annotations of a category collapse to one label. An
    /// annotation referring to a category outside the catalog is an error.
    pub fn labels_of_image<'a>(
        index: &'a CocoIndex,
        cat_map: &CategoryMap,
        img_id: u64,
    ) -> Result<ImageLabels<'a>> {
        let image = index.image(img_id)?;
        let ann_ids = index.ann_ids_of_image(img_id)?;

        let (labels, crowd_labels) = index.annotations(ann_ids).try_fold(
            (BTreeSet::new(), BTreeSet::new()),
            |(mut labels, mut crowd_labels), ann| -> Result<_> {
                let ann = ann?;
                let label = cat_map.label_of(ann.category_id).ok_or_else(|| {
                    format_err!(
                        "annotation {} of image {} refers to category id {}, which is not in the class catalog",
                        ann.id,
                        img_id,
                        ann.category_id
                    )
                })?;

                labels.insert(label);
                if ann.iscrowd {
                    crowd_labels.insert(label);
                }
                Ok((labels, crowd_labels))
            },
        )?;

        Ok(ImageLabels {
            labels,
            crowd_labels,
            file_name: &image.file_name,
        })
    }
}

impl GenericDataset for CocoDataset {
    fn name(&self) -> &str {
        "COCO"
    }

    fn metainfo(&self) -> &MetaInfo {
        &self.metainfo
    }

    fn data_list(&self) -> &[DataSample] {
        &self.data_list
    }

    fn test_mode(&self) -> bool {
        self.test_mode
    }

    fn extra_repr(&self) -> Vec<String> {
        vec![
            format!("Prefix of images: \t{}", self.img_prefix.display()),
            format!("Path of annotation file: \t{}", self.ann_file.display()),
        ]
    }
}

impl MultiLabelDataset for CocoDataset {}

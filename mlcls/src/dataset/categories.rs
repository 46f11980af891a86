use crate::common::*;

/// The 80 object categories annotated in COCO 2017, in the canonical order.
pub const COCO_CATEGORIES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Meta information of a dataset.
///
/// The order of `classes` defines the label space: the class at position `i`
/// is labeled by integer `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MetaInfoUnchecked", into = "MetaInfoUnchecked")]
pub struct MetaInfo {
    classes: IndexSet<String>,
}

impl MetaInfo {
    pub fn new<S>(classes: impl IntoIterator<Item = S>) -> Result<Self>
    where
        S: Into<String>,
    {
        let names: Vec<String> = classes.into_iter().map(Into::into).collect();
        let classes: IndexSet<String> = names.iter().cloned().collect();
        ensure!(!classes.is_empty(), "no classes are specified");
        ensure!(
            names.len() == classes.len(),
            "duplicated class names found in {:?}",
            names
        );
        Ok(Self { classes })
    }

    /// The meta information with the COCO 2017 catalog.
    pub fn coco() -> Self {
        Self {
            classes: COCO_CATEGORIES.iter().map(|&name| name.to_owned()).collect(),
        }
    }

    pub fn classes(&self) -> &IndexSet<String> {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Map each class name to its label index.
    pub fn class_to_idx(&self) -> HashMap<&str, usize> {
        self.classes
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_str(), index))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetaInfoUnchecked {
    classes: Vec<String>,
}

impl TryFrom<MetaInfoUnchecked> for MetaInfo {
    type Error = Error;

    fn try_from(MetaInfoUnchecked { classes }: MetaInfoUnchecked) -> Result<Self, Self::Error> {
        Self::new(classes)
    }
}

impl From<MetaInfo> for MetaInfoUnchecked {
    fn from(MetaInfo { classes }: MetaInfo) -> Self {
        Self {
            classes: classes.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_catalog_test() {
        let metainfo = MetaInfo::coco();
        assert_eq!(metainfo.num_classes(), 80);

        let class_to_idx = metainfo.class_to_idx();
        assert_eq!(class_to_idx["person"], 0);
        assert_eq!(class_to_idx["dog"], 16);
        assert_eq!(class_to_idx["toothbrush"], 79);
    }

    #[test]
    fn reject_bad_classes_test() {
        assert!(MetaInfo::new(Vec::<String>::new()).is_err());
        assert!(MetaInfo::new(["cat", "dog", "cat"]).is_err());

        let result: Result<MetaInfo, _> = serde_json::from_str(r#"{ "classes": ["a", "a"] }"#);
        assert!(result.is_err());
    }
}

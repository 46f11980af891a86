use crate::common::*;

/// One sample of a multi-label dataset, without image pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSample {
    pub img_path: PathBuf,
    /// Label indices of the classes present in the image.
    pub gt_label: BTreeSet<usize>,
    /// The subset of `gt_label` annotated as crowd regions.
    pub gt_label_crowd: BTreeSet<usize>,
}

impl DataSample {
    pub fn new(
        img_path: PathBuf,
        gt_label: BTreeSet<usize>,
        gt_label_crowd: BTreeSet<usize>,
    ) -> Result<Self> {
        ensure!(
            gt_label_crowd.is_subset(&gt_label),
            "crowd labels {:?} of '{}' are not contained in labels {:?}",
            gt_label_crowd,
            img_path.display(),
            gt_label
        );
        Ok(Self {
            img_path,
            gt_label,
            gt_label_crowd,
        })
    }
}

use super::*;
use crate::common::*;

/// The generic dataset trait.
///
/// A dataset is a list of samples built once at construction and never
/// modified afterwards.
pub trait GenericDataset
where
    Self: Debug + Send + Sync,
{
    /// The registered type name of the dataset.
    fn name(&self) -> &str;

    fn metainfo(&self) -> &MetaInfo;

    /// All samples in order.
    fn data_list(&self) -> &[DataSample];

    fn test_mode(&self) -> bool;

    /// Dataset specific lines appended to the summary.
    fn extra_repr(&self) -> Vec<String> {
        vec![]
    }

    /// The list of class names of the dataset.
    fn classes(&self) -> &IndexSet<String> {
        self.metainfo().classes()
    }

    fn class_to_idx(&self) -> HashMap<&str, usize> {
        self.metainfo().class_to_idx()
    }

    fn len(&self) -> usize {
        self.data_list().len()
    }

    fn is_empty(&self) -> bool {
        self.data_list().is_empty()
    }

    /// Get the nth sample in the dataset.
    fn get(&self, index: usize) -> Result<&DataSample> {
        let len = self.len();
        self.data_list()
            .get(index)
            .ok_or_else(|| format_err!("index {} is out of range with {} samples", index, len))
    }
}

/// The dataset where each sample carries a set of labels.
pub trait MultiLabelDataset
where
    Self: GenericDataset,
{
    /// Get the label indices of the nth sample.
    fn get_cat_ids(&self, index: usize) -> Result<Vec<usize>> {
        Ok(self.get(index)?.gt_label.iter().copied().collect())
    }
}

/// Printable summary of a dataset.
pub struct DatasetSummary<'a>(pub &'a dyn MultiLabelDataset);

impl Display for DatasetSummary<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self(dataset) = *self;
        writeln!(f, "Dataset {}", dataset.name())?;
        writeln!(f, "    Number of samples: \t{}", dataset.len())?;
        writeln!(f, "    Number of categories: \t{}", dataset.classes().len())?;
        writeln!(f, "    Test mode: \t{}", dataset.test_mode())?;
        for line in dataset.extra_repr() {
            writeln!(f, "    {}", line)?;
        }
        Ok(())
    }
}

/// Per-class occurrence counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelStat {
    pub class: String,
    /// The number of images labeled with the class.
    pub num_images: usize,
    /// The number of images where the class is a crowd label.
    pub num_crowd: usize,
}

/// Count how many samples contain each class.
pub fn label_histogram(dataset: &dyn MultiLabelDataset) -> Vec<LabelStat> {
    let mut stats: Vec<_> = dataset
        .classes()
        .iter()
        .map(|class| LabelStat {
            class: class.to_owned(),
            num_images: 0,
            num_crowd: 0,
        })
        .collect();

    dataset.data_list().iter().for_each(|sample| {
        sample.gt_label.iter().for_each(|&label| {
            if let Some(stat) = stats.get_mut(label) {
                stat.num_images += 1;
            }
        });
        sample.gt_label_crowd.iter().for_each(|&label| {
            if let Some(stat) = stats.get_mut(label) {
                stat.num_crowd += 1;
            }
        });
    });

    stats
}

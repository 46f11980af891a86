//! Run configuration format.

use crate::{common::*, unit};
use mlcls::dataset::{DatasetConfig, COCO_CATEGORIES};

pub use data::*;
pub use model::*;
pub use optimizer::*;
pub use runtime::*;
pub use schedule::*;

/// The main run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub evaluation: Option<EvaluationConfig>,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub optimizer_config: OptimizerHookConfig,
    pub lr_config: LrConfig,
    pub runner: RunnerConfig,
    #[serde(default)]
    pub checkpoint_config: CheckpointConfig,
    #[serde(default)]
    pub log_config: Option<LogConfig>,
    #[serde(default)]
    pub custom_hooks: Vec<HookConfig>,
    /// Initialize model weights from this checkpoint.
    #[serde(default)]
    pub load_from: Option<PathBuf>,
    /// Resume model weights, optimizer state and epoch from this checkpoint.
    #[serde(default)]
    pub resume_from: Option<PathBuf>,
    #[serde(default = "default_workflow")]
    pub workflow: Vec<(WorkflowPhase, NonZeroUsize)>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub dist_params: Option<Value>,
    /// Top-level entries not interpreted here.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Config {
    /// Load, merge and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_opt(path, unit::DEFAULT_MAX_DEPTH)
    }

    pub fn load_opt(path: impl AsRef<Path>, max_depth: usize) -> Result<Self> {
        let path = path.as_ref();
        let value = unit::load_merged_opt(path, max_depth)?;
        let config = Self::from_value(value)
            .with_context(|| format!("invalid configuration '{}'", path.display()))?;
        Ok(config)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.optimizer.validate()?;
        self.lr_config.validate()?;

        if let Some(num_classes) = self.model.num_classes() {
            Split::ALL.iter().try_for_each(|&split| -> Result<_> {
                let dataset = self.data.split(split);
                if let Some(num_categories) = catalog_size(dataset) {
                    ensure!(
                        num_categories == num_classes,
                        "the model predicts {} classes but the {} dataset has {} categories",
                        num_classes,
                        split,
                        num_categories
                    );
                }
                Ok(())
            })?;
        }

        if let (Some(load_from), Some(resume_from)) = (&self.load_from, &self.resume_from) {
            warn!(
                "both load_from '{}' and resume_from '{}' are set, resume_from takes precedence",
                load_from.display(),
                resume_from.display()
            );
        }

        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The number of categories of a dataset, if known without loading it.
fn catalog_size(dataset: &DatasetConfig) -> Option<usize> {
    match (&dataset.metainfo, dataset.kind.as_str()) {
        (Some(metainfo), _) => Some(metainfo.num_classes()),
        (None, "COCO") => Some(COCO_CATEGORIES.len()),
        _ => None,
    }
}

fn default_workflow() -> Vec<(WorkflowPhase, NonZeroUsize)> {
    vec![(WorkflowPhase::Train, NonZeroUsize::MIN)]
}

fn default_log_level() -> String {
    "INFO".into()
}

fn default_true() -> bool {
    true
}

fn one() -> R64 {
    r64(1.0)
}

fn zero() -> R64 {
    r64(0.0)
}

mod model {
    use super::*;

    const VGG_DEPTHS: [usize; 4] = [11, 13, 16, 19];
    const CONVNEXT_ARCHS: [&str; 5] = ["tiny", "small", "base", "large", "xlarge"];

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum ClassifierKind {
        ImageClassifier,
    }

    /// The model configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelConfig {
        #[serde(rename = "type")]
        pub kind: ClassifierKind,
        pub backbone: BackboneConfig,
        #[serde(default)]
        pub neck: Option<NeckConfig>,
        pub head: HeadConfig,
        #[serde(default)]
        pub train_cfg: Option<Value>,
        #[serde(default)]
        pub init_cfg: Option<Value>,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    impl ModelConfig {
        /// The number of predicted classes, taken from the head or else the
        /// backbone.
        pub fn num_classes(&self) -> Option<usize> {
            self.head
                .num_classes()
                .or_else(|| self.backbone.num_classes())
        }

        pub fn validate(&self) -> Result<()> {
            match self.backbone {
                BackboneConfig::Vgg { depth, .. } => {
                    ensure!(
                        VGG_DEPTHS.contains(&depth),
                        "VGG depth must be one of {:?}, but get {}",
                        VGG_DEPTHS,
                        depth
                    );
                }
                BackboneConfig::ConvNeXt {
                    ref arch,
                    drop_path_rate,
                    ..
                } => {
                    ensure!(
                        CONVNEXT_ARCHS.contains(&arch.as_str()),
                        "ConvNeXt arch must be one of {:?}, but get '{}'",
                        CONVNEXT_ARCHS,
                        arch
                    );
                    ensure!(
                        (0.0..1.0).contains(&drop_path_rate.raw()),
                        "drop_path_rate must be in range [0, 1)"
                    );
                }
            }

            if let (Some(head), Some(backbone)) =
                (self.head.num_classes(), self.backbone.num_classes())
            {
                ensure!(
                    head == backbone,
                    "head predicts {} classes while backbone predicts {}",
                    head,
                    backbone
                );
            }

            ensure!(
                self.head.num_classes().is_some() || self.backbone.num_classes().is_some(),
                "neither the head nor the backbone sets num_classes"
            );

            Ok(())
        }
    }

    /// Feature extractors.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum BackboneConfig {
        #[serde(rename = "VGG")]
        Vgg {
            depth: usize,
            /// If set, the backbone keeps its own classifier layers.
            #[serde(default)]
            num_classes: Option<NonZeroUsize>,
            #[serde(default)]
            out_indices: Option<Vec<usize>>,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        ConvNeXt {
            arch: String,
            #[serde(default = "zero")]
            drop_path_rate: R64,
            #[serde(default)]
            gap_before_final_norm: Option<bool>,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
    }

    impl BackboneConfig {
        pub fn num_classes(&self) -> Option<usize> {
            match *self {
                Self::Vgg { num_classes, .. } => num_classes.map(NonZeroUsize::get),
                Self::ConvNeXt { .. } => None,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum NeckConfig {
        GlobalAveragePooling {
            #[serde(default)]
            dim: Option<usize>,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
    }

    /// Classification heads.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum HeadConfig {
        LinearClsHead {
            num_classes: NonZeroUsize,
            in_channels: NonZeroUsize,
            loss: LossConfig,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        /// Multi-label head on top of logits computed by the backbone.
        MultiLabelClsHead {
            #[serde(default = "default_multi_label_loss")]
            loss: LossConfig,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        MultiLabelLinearClsHead {
            num_classes: NonZeroUsize,
            in_channels: NonZeroUsize,
            #[serde(default = "default_multi_label_loss")]
            loss: LossConfig,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
    }

    impl HeadConfig {
        pub fn num_classes(&self) -> Option<usize> {
            match *self {
                Self::LinearClsHead { num_classes, .. }
                | Self::MultiLabelLinearClsHead { num_classes, .. } => Some(num_classes.get()),
                Self::MultiLabelClsHead { .. } => None,
            }
        }

        pub fn loss(&self) -> &LossConfig {
            match self {
                Self::LinearClsHead { loss, .. }
                | Self::MultiLabelClsHead { loss, .. }
                | Self::MultiLabelLinearClsHead { loss, .. } => loss,
            }
        }
    }

    fn default_multi_label_loss() -> LossConfig {
        LossConfig::CrossEntropyLoss {
            use_sigmoid: true,
            loss_weight: one(),
            extra: IndexMap::new(),
        }
    }

    /// Loss functions.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LossConfig {
        CrossEntropyLoss {
            #[serde(default)]
            use_sigmoid: bool,
            #[serde(default = "one")]
            loss_weight: R64,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        LabelSmoothLoss {
            label_smooth_val: R64,
            #[serde(default)]
            mode: Option<String>,
            #[serde(default = "one")]
            loss_weight: R64,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        /// Asymmetric loss for multi-label classification.
        AsymmetricLoss {
            #[serde(default = "zero")]
            gamma_pos: R64,
            #[serde(default = "default_gamma_neg")]
            gamma_neg: R64,
            #[serde(default = "default_clip")]
            clip: R64,
            #[serde(default = "default_true")]
            use_sigmoid: bool,
            #[serde(default = "one")]
            loss_weight: R64,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        FocalLoss {
            #[serde(default = "default_focal_gamma")]
            gamma: R64,
            #[serde(default = "default_focal_alpha")]
            alpha: R64,
            #[serde(default = "one")]
            loss_weight: R64,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
    }

    fn default_gamma_neg() -> R64 {
        r64(4.0)
    }

    fn default_clip() -> R64 {
        r64(0.05)
    }

    fn default_focal_gamma() -> R64 {
        r64(2.0)
    }

    fn default_focal_alpha() -> R64 {
        r64(0.25)
    }
}

mod data {
    use super::*;

    /// Dataset splits.
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
    )]
    #[serde(rename_all = "lowercase")]
    #[strum(serialize_all = "lowercase")]
    pub enum Split {
        Train,
        Val,
        Test,
    }

    impl Split {
        pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];
    }

    /// Data loading options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DataConfig {
        /// The batch size on each device.
        pub samples_per_gpu: NonZeroUsize,
        /// The number of loading workers on each device.
        #[serde(default)]
        pub workers_per_gpu: usize,
        pub train: DatasetConfig,
        pub val: DatasetConfig,
        pub test: DatasetConfig,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    impl DataConfig {
        pub fn split(&self, split: Split) -> &DatasetConfig {
            match split {
                Split::Train => &self.train,
                Split::Val => &self.val,
                Split::Test => &self.test,
            }
        }
    }

    /// Periodic evaluation options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EvaluationConfig {
        pub interval: NonZeroUsize,
        pub metric: MetricSpec,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum MetricSpec {
        Single(String),
        Multiple(Vec<String>),
    }

    impl MetricSpec {
        pub fn names(&self) -> Vec<&str> {
            match self {
                Self::Single(name) => vec![name.as_str()],
                Self::Multiple(names) => names.iter().map(|name| name.as_str()).collect(),
            }
        }
    }
}

mod optimizer {
    use super::*;

    /// The optimizer configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum OptimizerConfig {
        #[serde(rename = "SGD")]
        Sgd {
            lr: R64,
            #[serde(default = "zero")]
            momentum: R64,
            #[serde(default = "zero")]
            weight_decay: R64,
            #[serde(default)]
            nesterov: bool,
            #[serde(default)]
            paramwise_cfg: Option<ParamwiseConfig>,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        Adam {
            lr: R64,
            #[serde(default = "zero")]
            weight_decay: R64,
            #[serde(default = "default_betas")]
            betas: (R64, R64),
            #[serde(default)]
            paramwise_cfg: Option<ParamwiseConfig>,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        AdamW {
            lr: R64,
            #[serde(default = "default_adamw_weight_decay")]
            weight_decay: R64,
            #[serde(default = "default_eps")]
            eps: R64,
            #[serde(default = "default_betas")]
            betas: (R64, R64),
            #[serde(default)]
            paramwise_cfg: Option<ParamwiseConfig>,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
    }

    impl OptimizerConfig {
        pub fn lr(&self) -> R64 {
            match *self {
                Self::Sgd { lr, .. } | Self::Adam { lr, .. } | Self::AdamW { lr, .. } => lr,
            }
        }

        pub fn weight_decay(&self) -> R64 {
            match *self {
                Self::Sgd { weight_decay, .. }
                | Self::Adam { weight_decay, .. }
                | Self::AdamW { weight_decay, .. } => weight_decay,
            }
        }

        pub fn paramwise_cfg(&self) -> Option<&ParamwiseConfig> {
            match self {
                Self::Sgd { paramwise_cfg, .. }
                | Self::Adam { paramwise_cfg, .. }
                | Self::AdamW { paramwise_cfg, .. } => paramwise_cfg.as_ref(),
            }
        }

        pub fn validate(&self) -> Result<()> {
            ensure!(self.lr() > 0.0, "learning rate must be positive");
            ensure!(self.weight_decay() >= 0.0, "weight_decay must be non-negative");
            if let Self::Sgd { momentum, .. } = *self {
                ensure!(momentum >= 0.0, "momentum must be non-negative");
            }
            Ok(())
        }
    }

    /// Per-parameter overrides of optimizer options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ParamwiseConfig {
        #[serde(default)]
        pub norm_decay_mult: Option<R64>,
        #[serde(default)]
        pub bias_decay_mult: Option<R64>,
        /// Overrides for parameters whose names contain the key.
        #[serde(default)]
        pub custom_keys: IndexMap<String, ParamGroupConfig>,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ParamGroupConfig {
        #[serde(default)]
        pub lr_mult: Option<R64>,
        #[serde(default)]
        pub decay_mult: Option<R64>,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    /// Options of the optimizer step hook.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct OptimizerHookConfig {
        #[serde(default)]
        pub grad_clip: Option<GradClipConfig>,
        /// Hook options such as `type` and `cumulative_iters`.
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GradClipConfig {
        pub max_norm: R64,
        #[serde(default = "default_norm_type")]
        pub norm_type: R64,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    fn default_betas() -> (R64, R64) {
        (r64(0.9), r64(0.999))
    }

    fn default_adamw_weight_decay() -> R64 {
        r64(0.01)
    }

    fn default_eps() -> R64 {
        r64(1e-8)
    }

    fn default_norm_type() -> R64 {
        r64(2.0)
    }
}

mod schedule {
    use super::*;

    /// The learning rate scheduling policy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "policy")]
    pub enum LrConfig {
        /// Multiply the learning rate by `gamma` at milestones.
        #[serde(rename = "step")]
        Step {
            step: StepMilestones,
            #[serde(default = "default_gamma")]
            gamma: R64,
            #[serde(default)]
            min_lr: Option<R64>,
            #[serde(default = "default_true")]
            by_epoch: bool,
            #[serde(flatten)]
            warmup: WarmupConfig,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        /// Cosine decay down to `min_lr` or `min_lr_ratio` times the initial rate.
        CosineAnnealing {
            #[serde(default)]
            min_lr: Option<R64>,
            #[serde(default)]
            min_lr_ratio: Option<R64>,
            #[serde(default = "default_true")]
            by_epoch: bool,
            #[serde(flatten)]
            warmup: WarmupConfig,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        #[serde(rename = "fixed")]
        Fixed {
            #[serde(default = "default_true")]
            by_epoch: bool,
            #[serde(flatten)]
            warmup: WarmupConfig,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
    }

    impl LrConfig {
        pub fn warmup(&self) -> &WarmupConfig {
            match self {
                Self::Step { warmup, .. }
                | Self::CosineAnnealing { warmup, .. }
                | Self::Fixed { warmup, .. } => warmup,
            }
        }

        pub fn validate(&self) -> Result<()> {
            match *self {
                Self::Step {
                    ref step, gamma, ..
                } => {
                    ensure!(gamma > 0.0, "gamma must be positive");
                    if let StepMilestones::At(milestones) = step {
                        ensure!(!milestones.is_empty(), "step milestones must not be empty");
                        ensure!(
                            milestones.iter().tuple_windows().all(|(lhs, rhs)| lhs < rhs),
                            "step milestones must be strictly increasing"
                        );
                    }
                }
                Self::CosineAnnealing {
                    min_lr,
                    min_lr_ratio,
                    ..
                } => {
                    ensure!(
                        min_lr.is_some() ^ min_lr_ratio.is_some(),
                        "exactly one of min_lr and min_lr_ratio must be set"
                    );
                }
                Self::Fixed { .. } => {}
            }

            let WarmupConfig {
                warmup,
                warmup_iters,
                warmup_ratio,
                ..
            } = *self.warmup();
            if warmup.is_some() {
                ensure!(warmup_iters > 0, "warmup_iters must be positive");
                ensure!(
                    warmup_ratio > 0.0 && warmup_ratio <= 1.0,
                    "warmup_ratio must be in range (0, 1]"
                );
            }

            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum StepMilestones {
        /// Decay every N epochs or iterations.
        Every(NonZeroUsize),
        /// Decay at the listed epochs or iterations.
        At(Vec<usize>),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum WarmupKind {
        Constant,
        Linear,
        Exp,
    }

    /// Learning rate warm-up options, flattened into the policy entry.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct WarmupConfig {
        #[serde(default)]
        pub warmup: Option<WarmupKind>,
        #[serde(default)]
        pub warmup_iters: usize,
        #[serde(default = "default_warmup_ratio")]
        pub warmup_ratio: R64,
        #[serde(default)]
        pub warmup_by_epoch: bool,
    }

    fn default_gamma() -> R64 {
        r64(0.1)
    }

    fn default_warmup_ratio() -> R64 {
        r64(0.1)
    }
}

mod runtime {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum WorkflowPhase {
        Train,
        Val,
    }

    /// The training loop.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum RunnerConfig {
        EpochBasedRunner {
            max_epochs: NonZeroUsize,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
        IterBasedRunner {
            max_iters: NonZeroUsize,
            #[serde(flatten)]
            extra: IndexMap<String, Value>,
        },
    }

    /// Checkpoint saving options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CheckpointConfig {
        /// Save a checkpoint per this many epochs or iterations.
        #[serde(default = "default_interval")]
        pub interval: NonZeroUsize,
        /// If set, only keep this many recent checkpoints.
        #[serde(default)]
        pub max_keep_ckpts: Option<NonZeroUsize>,
        #[serde(default = "default_true")]
        pub by_epoch: bool,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    impl Default for CheckpointConfig {
        fn default() -> Self {
            Self {
                interval: default_interval(),
                max_keep_ckpts: None,
                by_epoch: true,
                extra: IndexMap::new(),
            }
        }
    }

    /// Logging hooks.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LogConfig {
        pub interval: NonZeroUsize,
        #[serde(default)]
        pub hooks: Vec<HookConfig>,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    /// A hook registered by type name, for example `EMAHook`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HookConfig {
        #[serde(rename = "type")]
        pub kind: String,
        #[serde(default)]
        pub priority: Option<String>,
        #[serde(flatten)]
        pub extra: IndexMap<String, Value>,
    }

    fn default_interval() -> NonZeroUsize {
        NonZeroUsize::MIN
    }
}

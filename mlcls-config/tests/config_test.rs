use anyhow::Result;
use mlcls::dataset::Indices;
use mlcls_config::{
    load_merged, BackboneConfig, Config, HeadConfig, LossConfig, LrConfig, OptimizerConfig,
    RunnerConfig, Split, StepMilestones, WarmupKind,
};
use noisy_float::prelude::*;
use serde_json::{json, Value};
use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

lazy_static::lazy_static! {
    static ref CONFIG_DIR: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("configs");
    static ref TEST_CONFIG_DIR: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("cfg");
}

#[test]
fn load_all_configs_test() -> Result<()> {
    let pattern = format!("{}/*/*.json5", CONFIG_DIR.display());
    let mut count = 0;

    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if path.components().any(|comp| comp.as_os_str() == "_base_") {
            continue;
        }
        let config = Config::load(&path)?;
        let text = config.to_json_pretty()?;
        assert!(!text.is_empty());
        count += 1;
    }

    assert_eq!(count, 2);
    Ok(())
}

/// Check that every entry of the merged file appears unchanged in the dump.
/// The dump may carry additional entries for defaulted options.
fn assert_preserved(merged: &Value, dumped: &Value, path: &str) {
    match (merged, dumped) {
        (Value::Object(merged), Value::Object(dumped)) => {
            for (key, value) in merged {
                let child = format!("{}.{}", path, key);
                let dumped_value = dumped
                    .get(key)
                    .unwrap_or_else(|| panic!("'{}' is dropped", child));
                assert_preserved(value, dumped_value, &child);
            }
        }
        (Value::Array(merged), Value::Array(dumped)) => {
            assert_eq!(merged.len(), dumped.len(), "length of '{}' differs", path);
            for (idx, (lhs, rhs)) in merged.iter().zip(dumped).enumerate() {
                assert_preserved(lhs, rhs, &format!("{}[{}]", path, idx));
            }
        }
        // integers may be stored as floats
        (Value::Number(lhs), Value::Number(rhs)) => {
            assert_eq!(lhs.as_f64(), rhs.as_f64(), "'{}' differs", path);
        }
        (lhs, rhs) => assert_eq!(lhs, rhs, "'{}' differs", path),
    }
}

#[test]
fn dump_preserves_merged_entries_test() -> Result<()> {
    let mut paths = vec![
        TEST_CONFIG_DIR.join("passthrough.json5"),
        TEST_CONFIG_DIR.join("replace_optimizer.json5"),
    ];
    let pattern = format!("{}/*/*.json5", CONFIG_DIR.display());
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if !path.components().any(|comp| comp.as_os_str() == "_base_") {
            paths.push(path);
        }
    }
    assert_eq!(paths.len(), 4);

    for path in paths {
        let merged = load_merged(&path)?;
        let config = Config::from_value(merged.clone())?;
        let dumped = serde_json::to_value(&config)?;
        assert_preserved(&merged, &dumped, &path.display().to_string());
    }
    Ok(())
}

#[test]
fn unknown_keys_passthrough_test() -> Result<()> {
    let config = Config::load(TEST_CONFIG_DIR.join("passthrough.json5"))?;
    let dumped: Value = serde_json::from_str(&config.to_json_pretty()?)?;

    assert_eq!(dumped["model"]["pretrained"], json!("torchvision://vgg16"));
    assert_eq!(dumped["model"]["neck"]["keep_dims"], json!(true));
    assert_eq!(dumped["data"]["persistent_workers"], json!(true));
    assert_eq!(
        dumped["optimizer"]["paramwise_cfg"]["custom_keys"][".backbone.features"]
            ["dcn_offset_lr_mult"],
        json!(0.1)
    );
    assert_eq!(
        dumped["optimizer_config"]["type"],
        json!("GradientCumulativeOptimizerHook")
    );
    assert_eq!(dumped["optimizer_config"]["cumulative_iters"], json!(4));
    assert_eq!(
        dumped["optimizer_config"]["grad_clip"]["error_if_nonfinite"],
        json!(false)
    );
    assert_eq!(dumped["lr_config"]["verbose"], json!(true));
    assert_eq!(dumped["lr_config"]["policy"], json!("step"));
    assert_eq!(dumped["runner"]["meta"], json!({ "exp_name": "vgg16_coco" }));
    assert_eq!(dumped["checkpoint_config"]["save_optimizer"], json!(true));
    assert_eq!(dumped["log_config"]["ignore_last"], json!(false));

    // typed options next to the pass-through entries are still interpreted
    assert_eq!(config.log_config.as_ref().unwrap().interval.get(), 50);
    assert_eq!(
        config.optimizer_config.grad_clip.as_ref().unwrap().max_norm,
        35.0
    );
    match &config.lr_config {
        LrConfig::Step {
            gamma,
            warmup,
            extra,
            ..
        } => {
            assert_eq!(*gamma, 0.1);
            assert_eq!(warmup.warmup_ratio, 0.5);
            assert!(extra.contains_key("verbose"));
            assert!(!extra.contains_key("warmup_ratio"));
        }
        lr_config => panic!("unexpected lr_config {:?}", lr_config),
    }
    assert!(matches!(
        config.runner,
        RunnerConfig::EpochBasedRunner { max_epochs, .. } if max_epochs.get() == 200
    ));
    Ok(())
}

#[test]
fn vgg_coco_config_test() -> Result<()> {
    let config = Config::load(CONFIG_DIR.join("vgg").join("vgg16_8xb64_coco.json5"))?;

    assert!(matches!(
        config.model.backbone,
        BackboneConfig::Vgg { depth: 16, .. }
    ));
    assert!(config.model.neck.is_none());
    assert_eq!(config.model.num_classes(), Some(80));
    match &config.model.head {
        HeadConfig::MultiLabelClsHead { loss, .. } => match *loss {
            LossConfig::AsymmetricLoss {
                use_sigmoid,
                loss_weight,
                gamma_neg,
                ..
            } => {
                assert!(use_sigmoid);
                assert_eq!(loss_weight, 1.0);
                assert_eq!(gamma_neg, 4.0);
            }
            _ => panic!("unexpected loss {:?}", loss),
        },
        head => panic!("unexpected head {:?}", head),
    }

    match &config.optimizer {
        OptimizerConfig::Sgd {
            lr,
            momentum,
            paramwise_cfg,
            ..
        } => {
            assert_eq!(*lr, 0.00025);
            assert_eq!(*momentum, 0.9);
            let paramwise_cfg = paramwise_cfg.as_ref().unwrap();
            assert_eq!(
                paramwise_cfg.custom_keys[".backbone.classifier"].lr_mult,
                Some(r64(10.0))
            );
        }
        optimizer => panic!("unexpected optimizer {:?}", optimizer),
    }
    assert!(config.optimizer_config.grad_clip.is_none());

    match &config.lr_config {
        LrConfig::Step { step, gamma, .. } => {
            assert_eq!(*step, StepMilestones::Every(NonZeroUsize::new(20).unwrap()));
            assert_eq!(*gamma, 0.1);
        }
        lr_config => panic!("unexpected lr_config {:?}", lr_config),
    }
    assert!(matches!(
        config.runner,
        RunnerConfig::EpochBasedRunner { max_epochs, .. } if max_epochs.get() == 200
    ));
    assert_eq!(config.checkpoint_config.interval.get(), 5);
    assert_eq!(
        config.resume_from.as_deref(),
        Some(Path::new("work_dirs/vgg16_8xb64_coco/latest.pth"))
    );
    assert!(config.load_from.is_none());

    // inherited from the dataset base
    assert_eq!(config.data.samples_per_gpu.get(), 16);
    let train = config.data.split(Split::Train);
    assert_eq!(train.kind, "COCO");
    assert_eq!(train.data_prefix, "data/coco/train2017");
    assert!(!train.test_mode);
    assert_eq!(train.pipeline.len(), 7);
    assert!(config.data.split(Split::Val).test_mode);
    assert_eq!(
        config.evaluation.as_ref().unwrap().metric.names(),
        vec!["mAP", "CP", "OP", "CR", "OR", "CF1", "OF1"]
    );

    // inherited from the runtime base
    assert_eq!(config.log_level, "INFO");
    assert_eq!(config.log_config.as_ref().unwrap().hooks[0].kind, "TextLoggerHook");
    Ok(())
}

#[test]
fn convnext_config_test() -> Result<()> {
    let config = Config::load(
        CONFIG_DIR
            .join("convnext")
            .join("convnext-tiny_32xb128_in1k_hw.json5"),
    )?;

    match &config.model.backbone {
        BackboneConfig::ConvNeXt {
            arch,
            drop_path_rate,
            extra,
            ..
        } => {
            assert_eq!(arch, "tiny");
            assert_eq!(*drop_path_rate, 0.1);
            assert!(extra.contains_key("init_cfg"));
        }
        backbone => panic!("unexpected backbone {:?}", backbone),
    }
    assert_eq!(config.model.num_classes(), Some(5));

    // the override keeps the remaining AdamW options of the base
    match &config.optimizer {
        OptimizerConfig::AdamW {
            lr, weight_decay, ..
        } => {
            assert_eq!(*lr, 4e-3);
            assert_eq!(*weight_decay, 0.05);
        }
        optimizer => panic!("unexpected optimizer {:?}", optimizer),
    }
    assert!(config.optimizer.paramwise_cfg().is_some());
    assert_eq!(
        config
            .optimizer_config
            .grad_clip
            .as_ref()
            .unwrap()
            .max_norm,
        5.0
    );

    match &config.lr_config {
        LrConfig::CosineAnnealing {
            min_lr,
            min_lr_ratio,
            by_epoch,
            warmup,
            ..
        } => {
            assert!(min_lr.is_none());
            assert_eq!(min_lr_ratio.unwrap(), 1e-2);
            assert!(!by_epoch);
            assert_eq!(warmup.warmup, Some(WarmupKind::Linear));
            assert_eq!(warmup.warmup_iters, 20);
            assert!(warmup.warmup_by_epoch);
        }
        lr_config => panic!("unexpected lr_config {:?}", lr_config),
    }

    assert_eq!(config.data.samples_per_gpu.get(), 128);
    assert_eq!(config.data.workers_per_gpu, 2);
    assert_eq!(config.data.split(Split::Train).kind, "ImageNet");

    assert_eq!(config.custom_hooks.len(), 1);
    assert_eq!(config.custom_hooks[0].kind, "EMAHook");
    assert_eq!(config.custom_hooks[0].priority.as_deref(), Some("ABOVE_NORMAL"));
    assert!(config.custom_hooks[0].extra.contains_key("momentum"));

    assert_eq!(config.checkpoint_config.interval.get(), 10);
    assert!(matches!(
        config.runner,
        RunnerConfig::EpochBasedRunner { max_epochs, .. } if max_epochs.get() == 100
    ));
    assert!(config
        .load_from
        .as_ref()
        .unwrap()
        .starts_with("checkpoints"));
    assert!(config.resume_from.is_none());
    Ok(())
}

#[test]
fn delete_and_override_test() -> Result<()> {
    let config = Config::load(TEST_CONFIG_DIR.join("replace_optimizer.json5"))?;

    match &config.optimizer {
        OptimizerConfig::Sgd {
            lr,
            weight_decay,
            paramwise_cfg,
            ..
        } => {
            assert_eq!(*lr, 0.01);
            assert_eq!(*weight_decay, 0.0);
            assert!(paramwise_cfg.is_none());
        }
        optimizer => panic!("unexpected optimizer {:?}", optimizer),
    }
    match &config.lr_config {
        LrConfig::Step { step, warmup, .. } => {
            assert_eq!(*step, StepMilestones::At(vec![30, 60, 90]));
            assert!(warmup.warmup.is_none());
        }
        lr_config => panic!("unexpected lr_config {:?}", lr_config),
    }
    assert_eq!(
        config.data.split(Split::Train).indices,
        Some(Indices::First(100))
    );
    Ok(())
}

#[test]
fn reject_bad_configs_test() {
    let err = load_merged(TEST_CONFIG_DIR.join("cycle_a.json5")).unwrap_err();
    assert!(format!("{:#}", err).contains("circular"));

    let err = load_merged(TEST_CONFIG_DIR.join("conflict.json5")).unwrap_err();
    assert!(format!("{:#}", err).contains("checkpoint_config"));

    let err = Config::load(TEST_CONFIG_DIR.join("class_mismatch.json5")).unwrap_err();
    assert!(format!("{:#}", err).contains("categories"));

    assert!(Config::load(TEST_CONFIG_DIR.join("missing.json5")).is_err());
}

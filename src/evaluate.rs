use std::ops::Range;
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use indicatif::ProgressBar;
use log::{debug, warn};
use ndarray::{Array2, ArrayView2, Axis};

use crate::config::EvalConfig;
use crate::dataset::{EvalDataset, Split};
use crate::index::IndexKind;
use crate::loader::DataLoader;
use crate::model::Model;
use crate::recall::{Recalls, compute_recalls};
use crate::utils::{pb_style, timed};
use crate::visual::Visualizer;

/// 计算数据集中所有图片的特征，并在 test 划分上计算 recall@K
///
/// 当数据集为 test 划分且配置了可视化时，会在最后调用 `visualizer`
pub fn evaluate<D, M>(
    config: &EvalConfig,
    dataset: &D,
    model: &mut M,
    visualizer: Option<&mut dyn Visualizer<D, M>>,
) -> Result<Recalls>
where
    D: EvalDataset,
    M: Model<Input = D::Item>,
{
    config.validate()?;
    let database_num = dataset.database_num();
    if dataset.queries_num() == 0 {
        bail!("数据集中没有查询图片");
    }
    debug!("pin_memory: {}", config.pin_memory());

    let mut all_features = Array2::<f32>::zeros((dataset.len(), config.features_dim));

    debug!("Extracting database features for evaluation/testing");
    let t_database =
        extract_features(config, dataset, model, 0..database_num, &mut all_features, "database")?;
    debug!("Extracting queries features for evaluation/testing");
    let t_queries = extract_features(
        config,
        dataset,
        model,
        database_num..dataset.len(),
        &mut all_features,
        "queries",
    )?;
    let tot = (t_database + t_queries).as_secs_f64();
    debug!("mean execution time per image: {:.5}", tot / dataset.len() as f64);

    let (database_features, queries_features) = all_features.view().split_at(Axis(0), database_num);
    let predictions =
        retrieve(config.index, database_features, queries_features, config.max_recall())?;
    drop(all_features);

    debug!("Calculating recalls");
    let positives = dataset.positives()?;
    let recalls = compute_recalls(predictions.view(), &positives, &config.recall_values)?;

    if dataset.split() == Split::Test && config.visual.is_some() {
        match visualizer {
            Some(visualizer) => {
                debug!("Saving images");
                visualizer.view(config, dataset, predictions.view(), model)?;
            }
            None => warn!("已启用可视化，但没有提供可视化实现"),
        }
    }

    Ok(recalls)
}

/// 计算 `range` 内所有图片的特征，并写入 `features` 对应的行
///
/// 返回推理所用的时间。每一行只允许写入一次，且只能写入 `range` 范围内的行
pub fn extract_features<D, M>(
    config: &EvalConfig,
    dataset: &D,
    model: &mut M,
    range: Range<usize>,
    features: &mut Array2<f32>,
    name: &str,
) -> Result<Duration>
where
    D: EvalDataset,
    M: Model<Input = D::Item>,
{
    ensure!(range.end <= features.nrows(), "range {:?} exceeds feature matrix", range);
    ensure!(
        features.ncols() == config.features_dim,
        "feature matrix has {} columns, expected {}",
        features.ncols(),
        config.features_dim
    );

    let loader =
        DataLoader::new(dataset, range.clone(), config.infer_batch_size, config.num_workers);
    let pb = ProgressBar::new(loader.num_batches() as u64).with_style(pb_style());
    pb.set_prefix(name.to_owned());

    let mut written = vec![false; range.len()];
    let (result, elapsed) = timed(|| {
        loader.for_each(|batch| {
            let output = model.forward(batch.items, config.device)?;
            if output.nrows() != batch.indices.len() {
                bail!("模型输出 {} 行，但批次大小为 {}", output.nrows(), batch.indices.len());
            }
            if output.ncols() != config.features_dim {
                bail!("模型输出维度 {} 与配置 {} 不一致", output.ncols(), config.features_dim);
            }
            for (row, &index) in output.rows().into_iter().zip(&batch.indices) {
                ensure!(range.contains(&index), "index {} outside {:?}", index, range);
                let slot = &mut written[index - range.start];
                ensure!(!*slot, "index {} written twice", index);
                *slot = true;
                features.row_mut(index).assign(&row);
            }
            pb.inc(1);
            Ok(())
        })
    });
    result?;
    pb.finish_and_clear();

    if let Some(missing) = written.iter().position(|w| !w) {
        bail!("index {} was never written", range.start + missing);
    }
    Ok(elapsed)
}

/// 使用数据库特征建立索引，并为每个查询返回最近的 k 个数据库索引
pub fn retrieve(
    kind: IndexKind,
    database: ArrayView2<f32>,
    queries: ArrayView2<f32>,
    k: usize,
) -> Result<Array2<i64>> {
    let mut index = kind.build(database.ncols())?;
    index.add(database)?;
    let result = index.search(queries, k)?;
    Ok(result.labels)
}

use std::fs::{self, File};
use std::io::BufWriter;

use anyhow::{Context, Result, anyhow};
use log::info;
use ndarray::ArrayView2;
use serde::Serialize;

use crate::config::EvalConfig;
use crate::dataset::EvalDataset;
use crate::model::Model;

/// 评估结束后对检索结果进行可视化
pub trait Visualizer<D: EvalDataset, M: Model> {
    fn view(
        &mut self,
        config: &EvalConfig,
        dataset: &D,
        predictions: ArrayView2<i64>,
        model: &M,
    ) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct QueryPrediction<'a> {
    /// 查询在数据集中的索引
    query: usize,
    predictions: Vec<i64>,
    positives: &'a [usize],
    correct: bool,
}

/// 将每个查询的检索结果保存为 predictions.json
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionDump;

impl PredictionDump {
    pub const FILE_NAME: &'static str = "predictions.json";
}

impl<D: EvalDataset, M: Model> Visualizer<D, M> for PredictionDump {
    fn view(
        &mut self,
        config: &EvalConfig,
        dataset: &D,
        predictions: ArrayView2<i64>,
        _model: &M,
    ) -> Result<()> {
        let visual = config.visual.as_ref().ok_or_else(|| anyhow!("未配置可视化输出目录"))?;
        let folder = visual.img_folder();
        fs::create_dir_all(&folder)
            .with_context(|| format!("创建目录 {} 失败", folder.display()))?;

        let positives = dataset.positives()?;
        let records = predictions
            .rows()
            .into_iter()
            .zip(positives.iter())
            .enumerate()
            .map(|(q, (pred, pos))| QueryPrediction {
                query: dataset.database_num() + q,
                predictions: pred.to_vec(),
                positives: pos.as_slice(),
                correct: pred.get(0).is_some_and(|&p| p >= 0 && pos.contains(&(p as usize))),
            })
            .collect::<Vec<_>>();

        let path = folder.join(Self::FILE_NAME);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &records)?;
        info!("检索结果已保存至 {}", path.display());
        Ok(())
    }
}

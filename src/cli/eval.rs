use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{EvalConfig, InferOptions, RecallOptions, VisualConfig, VisualOptions};
use crate::dataset::{DatasetDir, EvalDataset, FeatureDataset, Split};
use crate::evaluate::evaluate;
use crate::model::{Backbone, PrecomputedModel};
use crate::positives::DEFAULT_POSITIVE_DIST_THRESHOLD;
use crate::recall::Recalls;
use crate::visual::PredictionDump;

#[derive(Parser, Debug, Clone)]
pub struct EvalCommand {
    #[command(flatten)]
    pub infer: InferOptions,
    #[command(flatten)]
    pub recall: RecallOptions,
    #[command(flatten)]
    pub visual: VisualOptions,
    /// 数据集目录，包含 database.npy、queries.npy 以及正样本信息
    pub dataset: PathBuf,
    /// 数据集划分，只有 test 划分会进行可视化
    #[arg(long, value_enum, default_value_t = Split::Test)]
    pub split: Split,
    /// 提取特征使用的骨干网络，用于确定特征维度
    #[arg(long, value_enum)]
    pub net: Option<Backbone>,
    /// 特征维度，优先于 --net
    #[arg(long, value_name = "DIM")]
    pub features_dim: Option<usize>,
    /// 对特征进行 L2 归一化
    #[arg(long)]
    pub normalize: bool,
    /// 根据 UTM 坐标计算正样本时的距离阈值（米）
    #[arg(long, value_name = "METERS", default_value_t = DEFAULT_POSITIVE_DIST_THRESHOLD)]
    pub positive_dist_threshold: f64,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl EvalCommand {
    /// 确定特征维度，并检查是否与数据集一致
    fn features_dim(&self, dataset: &FeatureDataset) -> Result<usize> {
        let dim = self
            .features_dim
            .or(self.net.map(|net| net.features_dim()))
            .unwrap_or(dataset.features_dim());
        if dim != dataset.features_dim() {
            bail!("特征维度 {} 与数据集中的特征维度 {} 不一致", dim, dataset.features_dim());
        }
        Ok(dim)
    }
}

impl SubCommandExtend for EvalCommand {
    fn run(&self) -> Result<()> {
        let dir = DatasetDir::new(&self.dataset);
        let dataset = FeatureDataset::open(&dir, self.split, self.positive_dist_threshold)?;
        info!(
            "数据库图片 {} 张，查询图片 {} 张",
            dataset.database_num(),
            dataset.queries_num()
        );

        let visual = self.visual.visual.then(|| VisualConfig {
            output_folder: self.visual.output_folder.clone(),
            net: self.net.map_or("precomputed".to_owned(), |net| net.to_string()),
        });
        let config =
            EvalConfig::from_options(self.features_dim(&dataset)?, &self.infer, &self.recall, visual)?;

        let mut model = PrecomputedModel::new(self.normalize);
        let mut dump = PredictionDump;
        let recalls = evaluate(&config, &dataset, &mut model, Some(&mut dump))?;
        info!("{} 划分评估完成", dataset.split());

        print_result(&recalls, self.output_format)
    }
}

fn print_result(recalls: &Recalls, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(recalls)?)
        }
        OutputFormat::Table => {
            for (k, r) in recalls.values.iter().zip(&recalls.recalls) {
                println!("R@{}\t{:.1}", k, r);
            }
            println!("{}", recalls);
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}

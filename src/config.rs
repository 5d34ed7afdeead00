use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::cli::*;
use crate::index::IndexKind;
use crate::model::Device;
use crate::recall::validate_recall_values;

#[derive(Parser, Debug, Clone)]
pub struct InferOptions {
    /// 推理时每个批次的图片数量
    #[arg(short = 'b', long, value_name = "SIZE", default_value_t = 16)]
    pub infer_batch_size: usize,
    /// 数据加载线程数量，为 0 时在主线程中加载，默认为 CPU 核数
    #[arg(short = 'j', long, value_name = "N", default_value_t = num_cpus::get())]
    pub num_workers: usize,
    /// 推理使用的设备
    #[arg(long, value_enum, default_value_t = Device::Cpu)]
    pub device: Device,
}

#[derive(Parser, Debug, Clone)]
pub struct RecallOptions {
    /// 计算 recall@K 时使用的 K，必须严格递增
    #[arg(short = 'r', long, value_name = "K,...", value_delimiter = ',', default_values_t = [1, 5, 10, 20])]
    pub recall_values: Vec<usize>,
    /// 最近邻索引的实现
    #[arg(long, value_enum, default_value_t = IndexKind::Flat)]
    pub index: IndexKind,
}

#[derive(Parser, Debug, Clone)]
pub struct VisualOptions {
    /// 在 test 划分上保存检索结果
    #[arg(long)]
    pub visual: bool,
    /// 保存检索结果的目录
    #[arg(long, value_name = "DIR", default_value = "runs")]
    pub output_folder: PathBuf,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imeval", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 使用预先提取的特征评估检索效果，输出 recall@K
    Eval(EvalCommand),
    /// 根据 UTM 坐标计算每个查询的正样本
    Positives(PositivesCommand),
    /// 显示数据集信息
    Info(InfoCommand),
}

/// 可视化相关的配置
#[derive(Debug, Clone, Serialize)]
pub struct VisualConfig {
    pub output_folder: PathBuf,
    /// 模型名称，作为图片目录的子目录
    pub net: String,
}

impl VisualConfig {
    /// 返回保存可视化结果的目录
    pub fn img_folder(&self) -> PathBuf {
        self.output_folder.join("img").join(&self.net)
    }
}

/// 一次评估所需要的全部参数
#[derive(Debug, Clone, Serialize)]
pub struct EvalConfig {
    pub device: Device,
    pub infer_batch_size: usize,
    pub num_workers: usize,
    /// 模型输出的特征维度
    pub features_dim: usize,
    pub recall_values: Vec<usize>,
    pub index: IndexKind,
    /// 为 None 时不进行可视化
    pub visual: Option<VisualConfig>,
}

impl EvalConfig {
    pub fn new(features_dim: usize) -> Self {
        Self {
            device: Device::Cpu,
            infer_batch_size: 16,
            num_workers: 0,
            features_dim,
            recall_values: vec![1, 5, 10, 20],
            index: IndexKind::Flat,
            visual: None,
        }
    }

    pub fn from_options(
        features_dim: usize,
        infer: &InferOptions,
        recall: &RecallOptions,
        visual: Option<VisualConfig>,
    ) -> Result<Self> {
        let config = Self {
            device: infer.device,
            infer_batch_size: infer.infer_batch_size,
            num_workers: infer.num_workers,
            features_dim,
            recall_values: recall.recall_values.clone(),
            index: recall.index,
            visual,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.features_dim == 0 {
            bail!("特征维度不能为 0");
        }
        if self.infer_batch_size == 0 {
            bail!("推理批次大小不能为 0");
        }
        validate_recall_values(&self.recall_values)
    }

    /// 检索时需要返回的最近邻数量
    pub fn max_recall(&self) -> usize {
        self.recall_values.iter().copied().max().unwrap_or(0)
    }

    pub fn pin_memory(&self) -> bool {
        self.device == Device::Cuda
    }
}

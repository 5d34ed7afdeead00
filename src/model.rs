use std::fmt;

use anyhow::{Result, ensure};
use clap::ValueEnum;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

/// 常用骨干网络及其输出的特征维度
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backbone {
    Alexnet,
    Vgg16,
    Resnet18conv4,
    Resnet18conv5,
    Resnet50conv4,
    Resnet50conv5,
    Resnet101conv4,
    Resnet101conv5,
    Cct384,
    Vit,
}

impl Backbone {
    pub fn features_dim(&self) -> usize {
        match self {
            Self::Alexnet => 256,
            Self::Vgg16 => 512,
            Self::Resnet18conv4 => 256,
            Self::Resnet18conv5 => 512,
            Self::Resnet50conv4 | Self::Resnet101conv4 => 1024,
            Self::Resnet50conv5 | Self::Resnet101conv5 => 2048,
            Self::Cct384 => 384,
            Self::Vit => 768,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Alexnet => "alexnet",
            Self::Vgg16 => "vgg16",
            Self::Resnet18conv4 => "resnet18conv4",
            Self::Resnet18conv5 => "resnet18conv5",
            Self::Resnet50conv4 => "resnet50conv4",
            Self::Resnet50conv5 => "resnet50conv5",
            Self::Resnet101conv4 => "resnet101conv4",
            Self::Resnet101conv5 => "resnet101conv5",
            Self::Cct384 => "cct384",
            Self::Vit => "vit",
        }
    }
}

impl fmt::Display for Backbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 将一批图片映射为特征向量的模型
pub trait Model {
    /// 模型接受的单张图片类型
    type Input;

    /// 对一个批次做前向推理
    ///
    /// 返回形状为 (batch.len(), features_dim) 的矩阵，且必须位于主机内存中
    fn forward(&mut self, batch: Vec<Self::Input>, device: Device) -> Result<Array2<f32>>;
}

/// 直接返回预先提取好的特征，可选地进行 L2 归一化
#[derive(Debug, Clone, Default)]
pub struct PrecomputedModel {
    normalize: bool,
}

impl PrecomputedModel {
    pub fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl Model for PrecomputedModel {
    type Input = Array1<f32>;

    fn forward(&mut self, batch: Vec<Array1<f32>>, _device: Device) -> Result<Array2<f32>> {
        ensure!(!batch.is_empty(), "empty batch");
        let views = batch.iter().map(|x| x.view()).collect::<Vec<_>>();
        let mut features = ndarray::stack(Axis(0), &views)?;
        if self.normalize {
            for mut row in features.rows_mut() {
                let norm = row.dot(&row).sqrt();
                if norm > 0.0 {
                    row.mapv_inplace(|x| x / norm);
                }
            }
        }
        Ok(features)
    }
}

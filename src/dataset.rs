use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::ValueEnum;
use log::{info, warn};
use ndarray::{Array1, Array2};
use ndarray_npy::read_npy;
use serde::{Deserialize, Serialize};

use crate::positives::positives_by_radius;

/// 数据集划分
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => f.write_str("train"),
            Self::Val => f.write_str("val"),
            Self::Test => f.write_str("test"),
        }
    }
}

/// 用于评估的数据集
///
/// 索引 `0..database_num` 为数据库图片，`database_num..len` 为查询图片
pub trait EvalDataset: Sync {
    /// 单张图片的类型
    type Item: Send;

    /// 数据库图片数量
    fn database_num(&self) -> usize;

    /// 查询图片数量
    fn queries_num(&self) -> usize;

    fn len(&self) -> usize {
        self.database_num() + self.queries_num()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn split(&self) -> Split;

    /// 读取指定索引的图片
    fn get(&self, index: usize) -> Result<Self::Item>;

    /// 返回每个查询的正样本，即被视为正确匹配的数据库图片索引
    fn positives(&self) -> Result<Cow<'_, [Vec<usize>]>>;
}

/// 数据集目录下的文件布局
#[derive(Debug, Clone)]
pub struct DatasetDir {
    path: PathBuf,
}

impl DatasetDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 数据库特征文件
    pub fn database(&self) -> PathBuf {
        self.path.join("database.npy")
    }

    /// 查询特征文件
    pub fn queries(&self) -> PathBuf {
        self.path.join("queries.npy")
    }

    /// 正样本文件
    pub fn positives(&self) -> PathBuf {
        self.path.join("positives.json")
    }

    /// 数据库图片的 UTM 坐标
    pub fn database_utm(&self) -> PathBuf {
        self.path.join("database_utm.npy")
    }

    /// 查询图片的 UTM 坐标
    pub fn queries_utm(&self) -> PathBuf {
        self.path.join("queries_utm.npy")
    }

    /// 读取 UTM 坐标，返回 (database, queries)
    pub fn read_utm(&self) -> Result<(Array2<f64>, Array2<f64>)> {
        let database = read_npy(self.database_utm())
            .with_context(|| format!("读取 {} 失败", self.database_utm().display()))?;
        let queries = read_npy(self.queries_utm())
            .with_context(|| format!("读取 {} 失败", self.queries_utm().display()))?;
        Ok((database, queries))
    }

    /// 读取正样本，优先使用 positives.json，否则根据 UTM 坐标计算
    pub fn read_positives(&self, dist_threshold: f64) -> Result<Vec<Vec<usize>>> {
        let path = self.positives();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let positives = serde_json::from_reader(reader)
                .with_context(|| format!("解析 {} 失败", path.display()))?;
            return Ok(positives);
        }
        if self.database_utm().exists() && self.queries_utm().exists() {
            let (database, queries) = self.read_utm()?;
            return positives_by_radius(database.view(), queries.view(), dist_threshold);
        }
        Err(anyhow!("{} 中既没有 positives.json 也没有 UTM 坐标", self.path.display()))
    }
}

/// 由预先提取的特征组成的数据集
#[derive(Debug, Clone)]
pub struct FeatureDataset {
    database: Array2<f32>,
    queries: Array2<f32>,
    positives: Vec<Vec<usize>>,
    split: Split,
}

impl FeatureDataset {
    pub fn new(
        database: Array2<f32>,
        queries: Array2<f32>,
        positives: Vec<Vec<usize>>,
        split: Split,
    ) -> Result<Self> {
        if database.ncols() != queries.ncols() {
            bail!("数据库特征维度 {} 与查询特征维度 {} 不一致", database.ncols(), queries.ncols());
        }
        if positives.len() != queries.nrows() {
            bail!("正样本数量 {} 与查询数量 {} 不一致", positives.len(), queries.nrows());
        }
        let database_num = database.nrows();
        if let Some(&index) = positives.iter().flatten().find(|&&i| i >= database_num) {
            bail!("正样本索引 {} 超出数据库范围 {}", index, database_num);
        }
        let empty = positives.iter().filter(|p| p.is_empty()).count();
        if empty > 0 {
            warn!("{} 个查询没有任何正样本", empty);
        }
        Ok(Self { database, queries, positives, split })
    }

    /// 从数据集目录中加载
    pub fn open(dir: &DatasetDir, split: Split, dist_threshold: f64) -> Result<Self> {
        info!("加载数据集: {}", dir.path().display());
        let database: Array2<f32> = read_npy(dir.database())
            .with_context(|| format!("读取 {} 失败", dir.database().display()))?;
        let queries: Array2<f32> = read_npy(dir.queries())
            .with_context(|| format!("读取 {} 失败", dir.queries().display()))?;
        let positives = dir.read_positives(dist_threshold)?;
        Self::new(database, queries, positives, split)
    }

    pub fn features_dim(&self) -> usize {
        self.database.ncols()
    }
}

impl EvalDataset for FeatureDataset {
    type Item = Array1<f32>;

    fn database_num(&self) -> usize {
        self.database.nrows()
    }

    fn queries_num(&self) -> usize {
        self.queries.nrows()
    }

    fn split(&self) -> Split {
        self.split
    }

    fn get(&self, index: usize) -> Result<Array1<f32>> {
        let database_num = self.database_num();
        if index < database_num {
            Ok(self.database.row(index).to_owned())
        } else if index < self.len() {
            Ok(self.queries.row(index - database_num).to_owned())
        } else {
            bail!("索引 {} 超出数据集范围 {}", index, self.len())
        }
    }

    fn positives(&self) -> Result<Cow<'_, [Vec<usize>]>> {
        Ok(Cow::Borrowed(&self.positives))
    }
}

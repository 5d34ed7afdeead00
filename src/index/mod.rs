mod flat;
#[cfg(feature = "usearch")]
mod usearch;

use anyhow::Result;
use clap::ValueEnum;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

pub use flat::*;
#[cfg(feature = "usearch")]
pub use self::usearch::USearchFlatIndex;

/// 最近邻搜索结果
///
/// 两个矩阵的形状均为 (nq, k)，每一行按距离从近到远排列，
/// 找不到足够的邻居时，标签填充 -1，距离填充 f32::INFINITY
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub distances: Array2<f32>,
    pub labels: Array2<i64>,
}

/// 基于 L2 距离的精确最近邻索引
pub trait NeighborIndex {
    /// 向量维度
    fn dim(&self) -> usize;

    /// 已添加的向量数量
    fn ntotal(&self) -> usize;

    /// 添加一组向量，ID 为添加的顺序
    fn add(&mut self, x: ArrayView2<f32>) -> Result<()>;

    /// 为每个查询向量搜索最近的 k 个向量
    fn search(&self, x: ArrayView2<f32>, k: usize) -> Result<SearchResult>;
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// 暴力搜索
    Flat,
    /// usearch 的精确搜索，需要启用 usearch feature
    Usearch,
}

impl IndexKind {
    pub fn build(&self, dim: usize) -> Result<Box<dyn NeighborIndex>> {
        match self {
            Self::Flat => Ok(Box::new(FlatL2Index::new(dim))),
            #[cfg(feature = "usearch")]
            Self::Usearch => Ok(Box::new(USearchFlatIndex::new(dim)?)),
            #[cfg(not(feature = "usearch"))]
            Self::Usearch => Err(anyhow::anyhow!("未启用 usearch feature")),
        }
    }
}

/// 将每个查询的 (距离, ID) 列表整理为定长矩阵
fn pack_neighbors(rows: Vec<Vec<(f32, usize)>>, k: usize) -> SearchResult {
    let nq = rows.len();
    let mut distances = Array2::from_elem((nq, k), f32::INFINITY);
    let mut labels = Array2::from_elem((nq, k), -1i64);
    for (q, row) in rows.into_iter().enumerate() {
        for (j, (d, id)) in row.into_iter().take(k).enumerate() {
            distances[[q, j]] = d;
            labels[[q, j]] = id as i64;
        }
    }
    SearchResult { distances, labels }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_flat() {
        let index = IndexKind::Flat.build(4).unwrap();
        assert_eq!(index.dim(), 4);
        assert_eq!(index.ntotal(), 0);
    }

    #[cfg(not(feature = "usearch"))]
    #[test]
    fn test_usearch_requires_feature() {
        assert!(IndexKind::Usearch.build(2).is_err());
    }
}

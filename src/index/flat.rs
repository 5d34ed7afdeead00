use anyhow::{Result, ensure};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use super::{NeighborIndex, SearchResult, pack_neighbors};

#[inline(always)]
pub fn l2_sqr(va: ArrayView1<f32>, vb: ArrayView1<f32>) -> f32 {
    va.iter().zip(vb.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// 计算向量 va 到 vb 中每一行的 L2 距离，返回距离最小的 k 个 (距离, 索引)
///
/// 结果按距离升序排列，距离相同时索引小的在前
pub fn knn_l2(va: ArrayView1<f32>, vb: ArrayView2<f32>, k: usize) -> Vec<(f32, usize)> {
    let mut best: Vec<(f32, usize)> = Vec::with_capacity(k + 1);
    if k == 0 {
        return best;
    }
    for (i, row) in vb.rows().into_iter().enumerate() {
        let d = l2_sqr(va, row);
        // NaN 距离排在最后
        let d = if d.is_nan() { f32::INFINITY } else { d };
        if best.len() == k && d >= best[k - 1].0 {
            continue;
        }
        // 插在所有距离相同的元素之后，保证索引小的优先
        let pos = best.partition_point(|&(bd, _)| bd <= d);
        best.insert(pos, (d, i));
        best.truncate(k);
    }
    best
}

/// 暴力搜索的 L2 索引，距离为 L2 距离的平方
pub struct FlatL2Index {
    dim: usize,
    data: Array2<f32>,
}

impl FlatL2Index {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Array2::zeros((0, dim)) }
    }
}

impl NeighborIndex for FlatL2Index {
    fn dim(&self) -> usize {
        self.dim
    }

    fn ntotal(&self) -> usize {
        self.data.nrows()
    }

    fn add(&mut self, x: ArrayView2<f32>) -> Result<()> {
        ensure!(x.ncols() == self.dim, "dimension mismatch: {} != {}", x.ncols(), self.dim);
        self.data.append(Axis(0), x)?;
        Ok(())
    }

    fn search(&self, x: ArrayView2<f32>, k: usize) -> Result<SearchResult> {
        ensure!(x.ncols() == self.dim, "dimension mismatch: {} != {}", x.ncols(), self.dim);
        let data = self.data.view();
        let rows = (0..x.nrows())
            .into_par_iter()
            .map(|q| knn_l2(x.row(q), data, k))
            .collect::<Vec<_>>();
        Ok(pack_neighbors(rows, k))
    }
}

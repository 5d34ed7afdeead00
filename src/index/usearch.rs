use anyhow::{Result, ensure};
use ndarray::ArrayView2;
use rayon::prelude::*;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{NeighborIndex, SearchResult, pack_neighbors};

/// 使用 usearch 精确搜索的 L2 索引
pub struct USearchFlatIndex {
    index: Index,
    dim: usize,
}

impl USearchFlatIndex {
    pub fn new(dim: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions: dim,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            ..Default::default()
        };
        let index = Index::new(&options)?;
        Ok(Self { index, dim })
    }
}

impl NeighborIndex for USearchFlatIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn ntotal(&self) -> usize {
        self.index.size()
    }

    fn add(&mut self, x: ArrayView2<f32>) -> Result<()> {
        ensure!(x.ncols() == self.dim, "dimension mismatch: {} != {}", x.ncols(), self.dim);
        let start = self.index.size();
        self.index.reserve(start + x.nrows())?;
        for (i, row) in x.rows().into_iter().enumerate() {
            self.index.add((start + i) as u64, &row.to_vec())?;
        }
        Ok(())
    }

    fn search(&self, x: ArrayView2<f32>, k: usize) -> Result<SearchResult> {
        ensure!(x.ncols() == self.dim, "dimension mismatch: {} != {}", x.ncols(), self.dim);
        let rows = (0..x.nrows())
            .into_par_iter()
            .map(|q| -> Result<Vec<(f32, usize)>> {
                let m = self.index.exact_search(&x.row(q).to_vec(), k)?;
                Ok(m.distances.into_iter().zip(m.keys.into_iter().map(|key| key as usize)).collect())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(pack_neighbors(rows, k))
    }
}

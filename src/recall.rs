use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, bail, ensure};
use ndarray::ArrayView2;
use serde::Serialize;

/// 检查 recall@K 的 K 列表：非空、均大于 0 且严格递增
pub fn validate_recall_values(values: &[usize]) -> Result<()> {
    ensure!(!values.is_empty(), "recall values must not be empty");
    ensure!(values[0] > 0, "recall values must be positive: {:?}", values);
    ensure!(
        values.windows(2).all(|w| w[0] < w[1]),
        "recall values must be strictly increasing: {:?}",
        values
    );
    Ok(())
}

/// 每个 K 对应的召回率，单位为百分比
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recalls {
    pub values: Vec<usize>,
    pub recalls: Vec<f64>,
}

impl Recalls {
    /// 返回 recall@k，k 不在列表中时返回 None
    pub fn get(&self, k: usize) -> Option<f64> {
        self.values.iter().position(|&v| v == k).map(|i| self.recalls[i])
    }

    /// 形如 `R@1: 50.0, R@5: 75.0` 的摘要
    pub fn summary(&self) -> String {
        self.values
            .iter()
            .zip(&self.recalls)
            .map(|(k, r)| format!("R@{}: {:.1}", k, r))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Recalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// 根据检索结果计算 recall@K
///
/// 参数：
/// - predictions: (nq, k) 的最近邻索引，按距离从近到远排列，-1 表示空位
/// - positives: 每个查询的正样本
/// - recall_values: 严格递增的 K 列表
///
/// 对每个查询，找到第一个前 K 个结果中包含正样本的 K，
/// 该 K 以及之后所有更大的 K 都计为命中
pub fn compute_recalls(
    predictions: ArrayView2<i64>,
    positives: &[Vec<usize>],
    recall_values: &[usize],
) -> Result<Recalls> {
    validate_recall_values(recall_values)?;
    let nq = predictions.nrows();
    if nq != positives.len() {
        bail!("查询数量 {} 与正样本数量 {} 不一致", nq, positives.len());
    }
    if nq == 0 {
        bail!("没有查询，无法计算召回率");
    }

    let mut hits = vec![0usize; recall_values.len()];
    for (pred, positives) in predictions.rows().into_iter().zip(positives) {
        let positives = positives.iter().map(|&p| p as i64).collect::<HashSet<_>>();
        for (i, &n) in recall_values.iter().enumerate() {
            let n = n.min(pred.len());
            if pred.iter().take(n).any(|p| *p >= 0 && positives.contains(p)) {
                hits[i..].iter_mut().for_each(|h| *h += 1);
                break;
            }
        }
    }

    let recalls = hits.into_iter().map(|h| h as f64 / nq as f64 * 100.0).collect();
    Ok(Recalls { values: recall_values.to_vec(), recalls })
}

use anyhow::{Result, ensure};
use ndarray::ArrayView2;
use rayon::prelude::*;

/// 判定为同一地点的默认 UTM 距离阈值，单位为米
pub const DEFAULT_POSITIVE_DIST_THRESHOLD: f64 = 25.0;

/// 根据 UTM 坐标计算每个查询的正样本
///
/// 与查询距离不超过 `radius` 的数据库图片均为正样本，结果按距离从近到远排序
pub fn positives_by_radius(
    database_utm: ArrayView2<f64>,
    queries_utm: ArrayView2<f64>,
    radius: f64,
) -> Result<Vec<Vec<usize>>> {
    ensure!(database_utm.ncols() == 2, "数据库 UTM 坐标必须为 (N, 2)");
    ensure!(queries_utm.ncols() == 2, "查询 UTM 坐标必须为 (N, 2)");
    ensure!(radius >= 0.0, "距离阈值不能为负数: {}", radius);

    let radius_sq = radius * radius;
    let positives = (0..queries_utm.nrows())
        .into_par_iter()
        .map(|q| {
            let (qe, qn) = (queries_utm[[q, 0]], queries_utm[[q, 1]]);
            let mut found = database_utm
                .rows()
                .into_iter()
                .enumerate()
                .filter_map(|(i, row)| {
                    let d = (row[0] - qe).powi(2) + (row[1] - qn).powi(2);
                    (d <= radius_sq).then_some((d, i))
                })
                .collect::<Vec<_>>();
            found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            found.into_iter().map(|(_, i)| i).collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    Ok(positives)
}

/// 正样本统计信息
#[derive(Debug, Clone, PartialEq)]
pub struct PositiveStats {
    /// 没有正样本的查询数量
    pub empty: usize,
    /// 平均每个查询的正样本数量
    pub mean: f64,
    pub max: usize,
}

pub fn positive_stats(positives: &[Vec<usize>]) -> PositiveStats {
    let empty = positives.iter().filter(|p| p.is_empty()).count();
    let total = positives.iter().map(Vec::len).sum::<usize>();
    let max = positives.iter().map(Vec::len).max().unwrap_or(0);
    let mean = if positives.is_empty() { 0.0 } else { total as f64 / positives.len() as f64 };
    PositiveStats { empty, mean, max }
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::dataset::{DatasetDir, EvalDataset, FeatureDataset, Split};
use crate::positives::{DEFAULT_POSITIVE_DIST_THRESHOLD, positive_stats};

#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {
    /// 数据集目录
    pub dataset: PathBuf,
    /// 根据 UTM 坐标计算正样本时的距离阈值（米）
    #[arg(long, value_name = "METERS", default_value_t = DEFAULT_POSITIVE_DIST_THRESHOLD)]
    pub positive_dist_threshold: f64,
}

impl SubCommandExtend for InfoCommand {
    fn run(&self) -> Result<()> {
        let dir = DatasetDir::new(&self.dataset);
        let dataset = FeatureDataset::open(&dir, Split::Test, self.positive_dist_threshold)?;
        let stats = positive_stats(&dataset.positives()?);

        println!("database_num\t{}", dataset.database_num());
        println!("queries_num\t{}", dataset.queries_num());
        println!("features_dim\t{}", dataset.features_dim());
        println!("mean_positives\t{:.2}", stats.mean);
        println!("max_positives\t{}", stats.max);
        println!("no_positives\t{}", stats.empty);
        Ok(())
    }
}

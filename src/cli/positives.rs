use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::dataset::DatasetDir;
use crate::positives::{DEFAULT_POSITIVE_DIST_THRESHOLD, positive_stats, positives_by_radius};

#[derive(Parser, Debug, Clone)]
pub struct PositivesCommand {
    /// 数据集目录，需要包含 database_utm.npy 和 queries_utm.npy
    pub dataset: PathBuf,
    /// 判定为正样本的距离阈值（米）
    #[arg(long, value_name = "METERS", default_value_t = DEFAULT_POSITIVE_DIST_THRESHOLD)]
    pub positive_dist_threshold: f64,
    /// 输出文件，默认为数据集目录下的 positives.json
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SubCommandExtend for PositivesCommand {
    fn run(&self) -> Result<()> {
        let dir = DatasetDir::new(&self.dataset);
        let (database, queries) = dir.read_utm()?;
        let positives =
            positives_by_radius(database.view(), queries.view(), self.positive_dist_threshold)?;

        let stats = positive_stats(&positives);
        info!(
            "平均每个查询 {:.2} 个正样本，{} 个查询没有正样本",
            stats.mean, stats.empty
        );

        let output = self.output.clone().unwrap_or_else(|| dir.positives());
        let writer = BufWriter::new(File::create(&output)?);
        serde_json::to_writer(writer, &positives)?;
        info!("正样本已保存至 {}", output.display());
        Ok(())
    }
}

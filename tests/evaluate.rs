use std::borrow::Cow;

use anyhow::Result;
use imeval::EvalConfig;
use imeval::config::VisualConfig;
use imeval::dataset::{EvalDataset, FeatureDataset, Split};
use imeval::evaluate;
use imeval::evaluate::extract_features;
use imeval::model::{Device, Model, PrecomputedModel};
use imeval::visual::{PredictionDump, Visualizer};
use ndarray::{Array1, Array2, ArrayView2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::*;
use tempfile::TempDir;

const DIM: usize = 8;

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| rng.random::<f32>())
}

/// 查询为数据库前 nq 行加上微小扰动，正样本为对应的数据库图片
#[fixture]
fn matched_dataset() -> FeatureDataset {
    let mut rng = StdRng::seed_from_u64(42);
    let database = random_matrix(&mut rng, 50, DIM);
    let noise = random_matrix(&mut rng, 20, DIM) * 1e-4f32;
    let queries = &database.slice(ndarray::s![..20, ..]) + &noise;
    let positives = (0..20).map(|i| vec![i]).collect();
    FeatureDataset::new(database, queries, positives, Split::Test).unwrap()
}

#[fixture]
fn random_dataset() -> FeatureDataset {
    let mut rng = StdRng::seed_from_u64(7);
    let database = random_matrix(&mut rng, 200, DIM);
    let queries = random_matrix(&mut rng, 40, DIM);
    let positives = (0..40)
        .map(|_| (0..3).map(|_| rng.random_range(0..200)).collect::<Vec<usize>>())
        .collect();
    FeatureDataset::new(database, queries, positives, Split::Val).unwrap()
}

fn config(num_workers: usize, batch_size: usize) -> EvalConfig {
    let mut config = EvalConfig::new(DIM);
    config.num_workers = num_workers;
    config.infer_batch_size = batch_size;
    config
}

#[rstest]
#[case::sequential(0, 4)]
#[case::workers(3, 4)]
#[case::single_batch(2, 1000)]
fn test_nearest_is_positive(matched_dataset: FeatureDataset, #[case] workers: usize, #[case] bs: usize) {
    let mut model = PrecomputedModel::new(false);
    let recalls = evaluate(&config(workers, bs), &matched_dataset, &mut model, None).unwrap();
    assert_eq!(recalls.recalls, vec![100.0; 4]);
    assert_eq!(recalls.summary(), "R@1: 100.0, R@5: 100.0, R@10: 100.0, R@20: 100.0");
}

#[rstest]
fn test_recalls_monotonic_and_bounded(random_dataset: FeatureDataset) {
    let mut model = PrecomputedModel::new(false);
    let mut config = config(2, 7);
    config.recall_values = vec![1, 2, 5, 10, 50, 200];
    let recalls = evaluate(&config, &random_dataset, &mut model, None).unwrap();

    assert!(recalls.recalls.windows(2).all(|w| w[0] <= w[1]));
    assert!(recalls.recalls.iter().all(|r| (0.0..=100.0).contains(r)));
    // K 等于数据库大小时，每个有正样本的查询都会命中
    assert_eq!(recalls.get(200), Some(100.0));
}

#[rstest]
fn test_no_positive_in_top_k() {
    // 正样本都是离查询最远的数据库图片
    let database = array![[0.0f32, 0.0], [1.0, 0.0], [2.0, 0.0], [100.0, 0.0]];
    let queries = array![[0.0f32, 0.0], [1.5, 0.0]];
    let ds = FeatureDataset::new(database, queries, vec![vec![3], vec![3]], Split::Test).unwrap();
    let mut config = EvalConfig::new(2);
    config.recall_values = vec![1, 2, 3];

    let recalls = evaluate(&config, &ds, &mut PrecomputedModel::new(false), None).unwrap();
    assert_eq!(recalls.recalls, vec![0.0, 0.0, 0.0]);
}

#[rstest]
fn test_dim_mismatch_is_error(matched_dataset: FeatureDataset) {
    let config = EvalConfig::new(DIM + 1);
    let r = evaluate(&config, &matched_dataset, &mut PrecomputedModel::new(false), None);
    assert!(r.is_err());
}

#[rstest]
fn test_invalid_recall_values(matched_dataset: FeatureDataset) {
    let mut config = config(0, 4);
    config.recall_values = vec![10, 5];
    let r = evaluate(&config, &matched_dataset, &mut PrecomputedModel::new(false), None);
    assert!(r.is_err());
}

#[rstest]
fn test_no_queries_is_error() {
    let ds = FeatureDataset::new(array![[0.0f32]], Array2::zeros((0, 1)), vec![], Split::Test)
        .unwrap();
    let r = evaluate(&EvalConfig::new(1), &ds, &mut PrecomputedModel::new(false), None);
    assert!(r.is_err());
}

/// 将每张图片映射为只包含其索引的特征，用于检查特征矩阵的写入位置
struct IndexModel;

impl Model for IndexModel {
    type Input = Array1<f32>;

    fn forward(&mut self, batch: Vec<Array1<f32>>, _device: Device) -> Result<Array2<f32>> {
        Ok(Array2::from_shape_fn((batch.len(), 1), |(i, _)| batch[i][0]))
    }
}

#[rstest]
#[case(0)]
#[case(4)]
fn test_feature_rows_do_not_overlap(#[case] workers: usize) {
    let database = Array2::from_shape_fn((13, 1), |(i, _)| i as f32);
    let queries = Array2::from_shape_fn((9, 1), |(i, _)| (13 + i) as f32);
    let ds = FeatureDataset::new(database, queries, vec![vec![]; 9], Split::Test).unwrap();
    let mut config = EvalConfig::new(1);
    config.num_workers = workers;
    config.infer_batch_size = 2;

    let mut features = Array2::from_elem((ds.len(), 1), -1.0f32);
    extract_features(&config, &ds, &mut IndexModel, 0..13, &mut features, "database").unwrap();
    // 查询部分尚未写入
    assert!(features.slice(ndarray::s![13.., 0]).iter().all(|&x| x == -1.0));
    extract_features(&config, &ds, &mut IndexModel, 13..22, &mut features, "queries").unwrap();

    for (i, x) in features.column(0).iter().enumerate() {
        assert_eq!(*x, i as f32);
    }
}

/// 输出行数与批次不一致的模型
struct ShortModel;

impl Model for ShortModel {
    type Input = Array1<f32>;

    fn forward(&mut self, _batch: Vec<Array1<f32>>, _device: Device) -> Result<Array2<f32>> {
        Ok(Array2::zeros((1, DIM)))
    }
}

#[rstest]
fn test_bad_model_output(matched_dataset: FeatureDataset) {
    let r = evaluate(&config(0, 4), &matched_dataset, &mut ShortModel, None);
    assert!(r.is_err());
}

#[derive(Default)]
struct CountingVisualizer {
    calls: usize,
    rows: usize,
}

impl<D: EvalDataset, M: Model> Visualizer<D, M> for CountingVisualizer {
    fn view(
        &mut self,
        _config: &EvalConfig,
        _dataset: &D,
        predictions: ArrayView2<i64>,
        _model: &M,
    ) -> Result<()> {
        self.calls += 1;
        self.rows = predictions.nrows();
        Ok(())
    }
}

fn visual_config(dir: &TempDir) -> EvalConfig {
    let mut config = config(0, 8);
    config.visual =
        Some(VisualConfig { output_folder: dir.path().to_path_buf(), net: "test".into() });
    config
}

#[rstest]
fn test_visualizer_only_on_test_split(matched_dataset: FeatureDataset, random_dataset: FeatureDataset) {
    let dir = TempDir::new().unwrap();
    let config = visual_config(&dir);
    let mut model = PrecomputedModel::new(false);

    let mut visualizer = CountingVisualizer::default();
    evaluate(&config, &matched_dataset, &mut model, Some(&mut visualizer)).unwrap();
    assert_eq!(visualizer.calls, 1);
    assert_eq!(visualizer.rows, 20);

    let mut visualizer = CountingVisualizer::default();
    evaluate(&config, &random_dataset, &mut model, Some(&mut visualizer)).unwrap();
    assert_eq!(visualizer.calls, 0);
}

#[rstest]
fn test_visualizer_requires_flag(matched_dataset: FeatureDataset) {
    let mut visualizer = CountingVisualizer::default();
    let mut model = PrecomputedModel::new(false);
    evaluate(&config(0, 8), &matched_dataset, &mut model, Some(&mut visualizer)).unwrap();
    assert_eq!(visualizer.calls, 0);
}

#[rstest]
fn test_prediction_dump(matched_dataset: FeatureDataset) {
    let dir = TempDir::new().unwrap();
    let config = visual_config(&dir);
    let mut dump = PredictionDump;
    evaluate(&config, &matched_dataset, &mut PrecomputedModel::new(false), Some(&mut dump))
        .unwrap();

    let path = dir.path().join("img/test").join(PredictionDump::FILE_NAME);
    let records: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 20);
    assert_eq!(records[0]["query"], 50);
    assert_eq!(records[0]["predictions"].as_array().unwrap().len(), 20);
    assert!(records.iter().all(|r| r["correct"] == true));
}

/// 正样本在运行时计算的数据集
struct LazyPositives(FeatureDataset);

impl EvalDataset for LazyPositives {
    type Item = Array1<f32>;

    fn database_num(&self) -> usize {
        self.0.database_num()
    }

    fn queries_num(&self) -> usize {
        self.0.queries_num()
    }

    fn split(&self) -> Split {
        Split::Train
    }

    fn get(&self, index: usize) -> Result<Array1<f32>> {
        self.0.get(index)
    }

    fn positives(&self) -> Result<Cow<'_, [Vec<usize>]>> {
        Ok(Cow::Owned(vec![vec![0]; self.queries_num()]))
    }
}

#[rstest]
fn test_custom_dataset(matched_dataset: FeatureDataset) {
    let ds = LazyPositives(matched_dataset);
    let mut config = config(1, 3);
    config.recall_values = vec![1, 50];
    let recalls = evaluate(&config, &ds, &mut PrecomputedModel::new(false), None).unwrap();
    // 只有第 0 个查询的最近邻是数据库第 0 张图片
    assert!((recalls.recalls[0] - 5.0).abs() < 1e-9);
    assert_eq!(recalls.recalls[1], 100.0);
}

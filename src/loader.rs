use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, ensure};
use crossbeam_channel::bounded;

use crate::dataset::EvalDataset;

/// 一个批次的数据，`indices` 为每张图片在数据集中的原始索引
pub struct Batch<T> {
    pub indices: Vec<usize>,
    pub items: Vec<T>,
}

/// 按批次读取数据集中的一段连续索引
pub struct DataLoader<'a, D: EvalDataset> {
    dataset: &'a D,
    range: Range<usize>,
    batch_size: usize,
    num_workers: usize,
}

impl<'a, D: EvalDataset> DataLoader<'a, D> {
    pub fn new(dataset: &'a D, range: Range<usize>, batch_size: usize, num_workers: usize) -> Self {
        Self { dataset, range, batch_size, num_workers }
    }

    pub fn num_batches(&self) -> usize {
        self.range.len().div_ceil(self.batch_size.max(1))
    }

    fn load_batch(&self, batch_no: usize) -> Result<Batch<D::Item>> {
        let start = self.range.start + batch_no * self.batch_size;
        let end = (start + self.batch_size).min(self.range.end);
        let indices = (start..end).collect::<Vec<_>>();
        let items = indices.iter().map(|&i| self.dataset.get(i)).collect::<Result<Vec<_>>>()?;
        Ok(Batch { indices, items })
    }

    /// 在当前线程中依次处理每个批次
    ///
    /// `num_workers > 0` 时由多个线程并行读取数据，批次到达的顺序不确定。
    /// 任意一个批次出错都会中止整个过程
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Batch<D::Item>) -> Result<()>,
    {
        ensure!(self.batch_size > 0, "batch size must be positive");
        let nbatch = self.num_batches();

        if self.num_workers == 0 {
            for batch_no in 0..nbatch {
                f(self.load_batch(batch_no)?)?;
            }
            return Ok(());
        }

        let next = AtomicUsize::new(0);
        std::thread::scope(|s| -> Result<()> {
            let (tx, rx) = bounded(self.num_workers * 2);

            for _ in 0..self.num_workers.min(nbatch) {
                let tx = tx.clone();
                let next = &next;
                s.spawn(move || {
                    loop {
                        let batch_no = next.fetch_add(1, Ordering::Relaxed);
                        if batch_no >= nbatch {
                            break;
                        }
                        // 接收端关闭说明主线程已出错退出
                        if tx.send(self.load_batch(batch_no)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for batch in rx {
                f(batch?)?;
            }
            Ok(())
        })
    }
}

use std::time::{Duration, Instant};

use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:>10} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} ({eta}) {msg}",
    )
    .expect("invalid progress bar template")
    .progress_chars("##-")
}

/// 执行 f 并返回其结果和耗时
pub fn timed<F, R>(f: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let r = f();
    (r, start.elapsed())
}

mod eval;
mod info;
mod positives;

pub use eval::*;
pub use info::*;
pub use positives::*;

pub trait SubCommandExtend {
    fn run(&self) -> anyhow::Result<()>;
}

pub mod cli;
pub mod config;
pub mod dataset;
pub mod evaluate;
pub mod index;
pub mod loader;
pub mod model;
pub mod positives;
pub mod recall;
pub mod utils;
pub mod visual;

pub use config::{EvalConfig, Opts};
pub use evaluate::evaluate;
pub use recall::Recalls;

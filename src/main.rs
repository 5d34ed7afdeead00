use clap::Parser;
use imeval::cli::SubCommandExtend;
use imeval::config::{Opts, SubCommand};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Eval(config) => config.run(),
        SubCommand::Positives(config) => config.run(),
        SubCommand::Info(config) => config.run(),
    }
}

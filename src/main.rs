use clap::Parser;
use iconsearch::Opts;
use iconsearch::cli::SubCommandExtend;
use iconsearch::config::SubCommand;
use log::debug;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    rayon::ThreadPoolBuilder::new().num_threads(opts.threads).build_global()?;
    debug!("使用 {} 个线程", opts.threads);

    match &opts.subcmd {
        SubCommand::Build(config) => config.run(&opts),
        SubCommand::Add(config) => config.run(&opts),
        SubCommand::Match(config) => config.run(&opts),
        SubCommand::Show(config) => config.run(&opts),
        SubCommand::Export(config) => config.run(&opts),
    }
}

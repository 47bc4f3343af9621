use clap::Parser;
use imvision::Opts;
use imvision::cli::SubCommandExtend;
use imvision::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Ask(config) => config.run(&opts).await,
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Remove(config) => config.run(&opts).await,
        SubCommand::Video(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}

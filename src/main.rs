use anyhow::Result;
use clap::Parser;
use songbreak::{
    cli::{
        handle_config_command, handle_devices_command, handle_record_command, Cli, CliCommand,
    },
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        CliCommand::Version => {
            println!("songbreak {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Devices => handle_devices_command(),
        CliCommand::Config => handle_config_command(),
        CliCommand::Record(args) => {
            let config = Config::load()?;
            handle_record_command(args, config).await
        }
    }
}

use crate::audio::AudioFormat;
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "songbreak")]
#[command(about = "Gapless live audio capture with on-demand file breaks", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// List capture-capable input devices
    Devices,
    /// Record from an input device, splitting files on demand
    Record(RecordCliArgs),
    /// Show the config file location and effective settings
    Config,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RecordCliArgs {
    /// Device index as shown by `songbreak devices` (default: system default input)
    #[arg(short, long)]
    pub device: Option<usize>,
    /// Output format (default: from config)
    #[arg(short, long, value_enum)]
    pub format: Option<AudioFormat>,
    /// Directory to write recordings into (default: from config)
    #[arg(short, long)]
    pub output: Option<String>,
    /// Base file name; files are written as <name>_1.<ext>, <name>_2.<ext>, ...
    #[arg(short, long)]
    pub name: Option<String>,
    /// Do not start the HTTP control server
    #[arg(long)]
    pub no_control: bool,
}

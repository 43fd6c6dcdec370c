//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::path::PathBuf;

/// Emberserve development web server CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory to serve (overrides config file)
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    /// Port number to start binding from
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Virtual base path the site is mounted under (e.g., /docs/)
    #[arg(long = "prefix")]
    pub path_prefix: Option<String>,

    /// Disable live reload entirely
    #[arg(long)]
    pub no_live_reload: bool,

    /// Disable DOM diffing (HTML changes always full-reload)
    #[arg(long)]
    pub no_dom_diff: bool,

    /// Additional paths to watch for changes
    #[arg(short, long, value_hint = clap::ValueHint::AnyPath)]
    pub watch: Vec<PathBuf>,

    /// Config file path
    #[arg(short = 'C', long, default_value = "emberserve.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,

    /// Show debug output
    #[arg(short, long)]
    pub verbose: bool,
}

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    name = "mapiprobe",
    version,
    about = "Log on to the messaging subsystem and list the default inbox"
)]
pub(crate) struct Cli {
    /// Config file to use instead of the usual search path.
    #[arg(long, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,
    /// Mail profile (TOML) served by the in-memory provider.
    #[arg(long, value_name = "PATH")]
    pub(crate) profile: Option<PathBuf>,
    #[arg(long = "log-file", value_name = "PATH", conflicts_with = "no_log_file")]
    pub(crate) log_file: Option<PathBuf>,
    /// Log to the console only.
    #[arg(long = "no-log-file")]
    pub(crate) no_log_file: bool,
    /// Visit at most N messages per folder.
    #[arg(long, value_name = "N")]
    pub(crate) limit: Option<usize>,
    /// Convert opened messages to MIME (first message only unless --limit is given).
    #[arg(long)]
    pub(crate) convert: bool,
    /// Write converted messages here as message-<n>.eml. Implies --convert.
    #[arg(long = "export-dir", value_name = "DIR")]
    pub(crate) export_dir: Option<PathBuf>,
    /// Print a JSON report on stdout; log lines go to stderr.
    #[arg(long)]
    pub(crate) json: bool,
}

use std::io;

use anyhow::Result;
use clap::Parser;
use mapiprobe_core::ProbeLog;
use mapiprobe_fixture::FixtureProvider;
use mapiprobe_probe::{ProbeReport, run_probe};

mod cli;
mod cli_config;
mod cli_output;

use cli::Cli;
use cli_config::{config_notice, load_probe_config, resolve_settings};
use cli_output::{output_error, output_report};

pub(crate) const CLI_SCHEMA_VERSION: u32 = 1;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match load_probe_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) if cli.json => {
            output_error(&format!("{:#}", err))?;
            std::process::exit(2);
        }
        Err(err) => return Err(err),
    };
    let settings = resolve_settings(&cli, &config);

    let provider = match &settings.profile {
        Some(path) => match FixtureProvider::load(path) {
            Ok(provider) => provider,
            Err(err) if settings.json => {
                output_error(&format!("{:#}", err))?;
                std::process::exit(2);
            }
            Err(err) => return Err(err),
        },
        None => FixtureProvider::demo(),
    };

    let log = if settings.json {
        ProbeLog::with_console(io::stderr())
    } else {
        ProbeLog::stdout()
    };
    if let Some(notice) = config_notice(&config) {
        log.write(notice);
    }
    let report = run_probe(&provider, &log, &settings.options);
    if settings.json {
        output_report(&report, &log.entries())?;
    }

    let code = exit_code(&report);
    if code != 0 {
        drop(log);
        std::process::exit(code);
    }
    Ok(())
}

/// Process exit code for `report`. Zero only when no failure was recorded.
///
/// Only the low byte survives on Unix, so a failure whose low byte is zero
/// would read as success there; it becomes 1 instead.
fn exit_code(report: &ProbeReport) -> i32 {
    if report.error.is_none() {
        return 0;
    }
    let code = report.status().code();
    if code != 0 && (cfg!(windows) || code & 0xFF != 0) {
        code
    } else {
        1
    }
}

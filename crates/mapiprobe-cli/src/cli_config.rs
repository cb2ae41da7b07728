use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mapiprobe_core::LogEntry;
use mapiprobe_probe::ProbeOptions;

use crate::cli::Cli;

/// The `[probe]` table of `mapiprobe.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProbeConfig {
    /// File the table was read from, if any.
    pub(crate) source: Option<PathBuf>,
    pub(crate) profile: Option<PathBuf>,
    pub(crate) log_file: Option<PathBuf>,
    /// `log_file = false` turns the file off.
    pub(crate) log_to_file: Option<bool>,
    pub(crate) limit: Option<usize>,
    pub(crate) convert: Option<bool>,
    pub(crate) export_dir: Option<PathBuf>,
    pub(crate) json: Option<bool>,
}

/// Command line and config file merged: flags win over the file, the file
/// wins over built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    /// `None` runs against the built-in demo profile.
    pub(crate) profile: Option<PathBuf>,
    pub(crate) options: ProbeOptions,
    pub(crate) json: bool,
}

fn config_path_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("mapiprobe.toml"),
        xdg_config_dir().join("mapiprobe").join("mapiprobe.toml"),
    ]
}

fn xdg_config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

fn load_config_text() -> Option<(PathBuf, String)> {
    for path in config_path_candidates() {
        if let Ok(content) = std::fs::read_to_string(&path) {
            return Some((path, content));
        }
    }
    None
}

pub(crate) fn default_log_path() -> PathBuf {
    std::env::temp_dir().join("mapiprobe.log")
}

/// Reads `explicit` when given, otherwise the first config file found on
/// the search path. A missing file on the search path is not an error.
pub(crate) fn load_probe_config(explicit: Option<&Path>) -> Result<ProbeConfig> {
    let (path, content) = match explicit {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            (path.to_path_buf(), content)
        }
        None => match load_config_text() {
            Some(found) => found,
            None => return Ok(ProbeConfig::default()),
        },
    };
    let config = parse_probe_config(&content).with_context(|| format!("in {}", path.display()))?;
    Ok(ProbeConfig {
        source: Some(path),
        ..config
    })
}

/// Log line announcing which config file shaped this run.
pub(crate) fn config_notice(config: &ProbeConfig) -> Option<LogEntry> {
    config
        .source
        .as_ref()
        .map(|path| LogEntry::info(format!("Using config: {}", path.display())))
}

pub(crate) fn parse_probe_config(content: &str) -> Result<ProbeConfig> {
    let value: toml::Value = toml::from_str(content).context("invalid config")?;
    let Some(probe) = value.get("probe") else {
        return Ok(ProbeConfig::default());
    };
    let path = |key: &str| probe.get(key).and_then(|v| v.as_str()).map(PathBuf::from);
    let limit = match probe.get("limit") {
        Some(v) => {
            let n = v
                .as_integer()
                .with_context(|| format!("probe.limit must be an integer, got {}", v))?;
            Some(usize::try_from(n).context("probe.limit must not be negative")?)
        }
        None => None,
    };
    Ok(ProbeConfig {
        source: None,
        profile: path("profile"),
        log_file: path("log_file"),
        log_to_file: probe.get("log_file").and_then(|v| v.as_bool()),
        limit,
        convert: probe.get("convert").and_then(parse_bool),
        export_dir: path("export_dir"),
        json: probe.get("json").and_then(parse_bool),
    })
}

fn parse_bool(value: &toml::Value) -> Option<bool> {
    value.as_bool().or_else(|| {
        value
            .as_str()
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
    })
}

pub(crate) fn resolve_settings(cli: &Cli, config: &ProbeConfig) -> Settings {
    let log_file = if cli.no_log_file {
        None
    } else if let Some(path) = &cli.log_file {
        Some(path.clone())
    } else if config.log_to_file == Some(false) {
        None
    } else {
        Some(config.log_file.clone().unwrap_or_else(default_log_path))
    };

    let export_dir = cli.export_dir.clone().or_else(|| config.export_dir.clone());
    let convert = cli.convert || config.convert.unwrap_or(false) || export_dir.is_some();
    let mut max_messages = cli.limit.or(config.limit);
    if convert && max_messages.is_none() {
        max_messages = Some(1);
    }

    Settings {
        profile: cli.profile.clone().or_else(|| config.profile.clone()),
        options: ProbeOptions {
            log_file,
            max_messages,
            convert,
            export_dir,
        },
        json: cli.json || config.json.unwrap_or(false),
    }
}

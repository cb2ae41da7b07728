use anyhow::Result;
use mapiprobe_core::LogEntry;
use mapiprobe_probe::ProbeReport;
use serde_json::{Value as JsonValue, json};

use crate::CLI_SCHEMA_VERSION;

pub(crate) fn output_error(message: &str) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "schema": CLI_SCHEMA_VERSION,
            "ok": false,
            "error": message
        }))?
    );
    Ok(())
}

pub(crate) fn output_report(report: &ProbeReport, log: &[LogEntry]) -> Result<()> {
    println!("{}", serde_json::to_string(&report_json(report, log)?)?);
    Ok(())
}

/// `ok` follows the run: false when the probe stopped before the stores
/// could be walked, with that failure as `error`.
pub(crate) fn report_json(report: &ProbeReport, log: &[LogEntry]) -> Result<JsonValue> {
    let result = serde_json::to_value(report)?;
    let log = serde_json::to_value(log)?;
    let mut value = json!({
        "schema": CLI_SCHEMA_VERSION,
        "ok": report.succeeded(),
        "result": result,
        "log": log,
    });
    if let Some(err) = &report.error {
        value["error"] = JsonValue::String(err.to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use mapiprobe_core::ProbeLog;
    use mapiprobe_fixture::{FixtureProvider, Profile};
    use mapiprobe_probe::{ProbeOptions, run_probe};

    use super::report_json;

    #[test]
    fn report_carries_stores_outcomes_and_log() -> anyhow::Result<()> {
        let provider = FixtureProvider::demo();
        let log = ProbeLog::silent();
        let report = run_probe(&provider, &log, &ProbeOptions::listing());
        let value = report_json(&report, &log.entries())?;

        assert_eq!(value["ok"], true);
        assert_eq!(value["result"]["stores"].as_array().map(Vec::len), Some(3));
        assert_eq!(
            value["result"]["processed"][0]["display_name"],
            "Mailbox - Probe User"
        );
        assert_eq!(value["result"]["processed"][0]["listing"]["opened"], 3);
        assert!(value["result"]["stores"][0].get("entry_id").is_none());
        assert_eq!(value["log"][0]["message"], "Initialising MAPI probe");
        assert!(value.get("error").is_none());
        Ok(())
    }

    #[test]
    fn failed_run_reports_the_stopping_error() -> anyhow::Result<()> {
        let mut profile = Profile::demo();
        profile.faults.logon = Some(0x8004_0111);
        let provider = FixtureProvider::new(profile);
        let log = ProbeLog::silent();
        let report = run_probe(&provider, &log, &ProbeOptions::listing());
        let value = report_json(&report, &log.entries())?;

        assert_eq!(value["ok"], false);
        assert_eq!(value["result"]["error"]["op"], "MAPILogonEx");
        assert_eq!(value["result"]["error"]["status"], -2147221231);
        assert_eq!(
            value["error"],
            "MAPILogonEx failed: 0x80040111 (MAPI_E_LOGON_FAILED)"
        );
        assert_eq!(value["log"][3]["level"], "error");
        Ok(())
    }
}

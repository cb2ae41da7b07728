//! The probe itself: log on, walk the message stores, open the default
//! store's receive folder and list (optionally convert) what is in it.
//!
//! Each step logs what it did and releases what it acquired before the next
//! one sees the result. A failure ends only the branch it happened in.

use std::path::PathBuf;

use chrono::Local;
use mapiprobe_core::{LogEntry, MapiError, MapiProvider, ProbeLog, Status};
use serde::Serialize;

mod convert;
mod inbox;
mod messages;
mod session;
mod store;
mod stores;

pub use convert::convert_message;
pub use inbox::{OpenedFolder, open_inbox};
pub use messages::{MESSAGE_COLUMNS, MessageFailure, MessageListing, MessageRow, list_messages};
pub use session::ProbeSession;
pub use store::{STORE_OPEN_FLAGS, StoreOutcome, process_store};
pub use stores::{STORE_COLUMNS, StoreDescriptor, StoreEnumeration, enumerate_stores, list_stores};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Duplicate of the console log, truncated at startup.
    pub log_file: Option<PathBuf>,
    /// Rows visited per folder; `None` visits all of them.
    pub max_messages: Option<usize>,
    pub convert: bool,
    /// Where converted messages are written as `message-<n>.eml`.
    pub export_dir: Option<PathBuf>,
}

impl ProbeOptions {
    /// List every message in the default inbox.
    pub fn listing() -> Self {
        Self::default()
    }

    /// Open and convert the first message only.
    pub fn conversion() -> Self {
        Self {
            max_messages: Some(1),
            convert: true,
            ..Self::default()
        }
    }
}

/// Everything a step needs besides the handles it works on.
#[derive(Clone, Copy)]
pub struct ProbeContext<'a> {
    pub provider: &'a dyn MapiProvider,
    pub log: &'a ProbeLog,
    pub options: &'a ProbeOptions,
}

/// Logs `message` with the failing status and names the operation.
pub(crate) fn log_failure<'l>(
    log: &'l ProbeLog,
    op: &'static str,
    message: &'static str,
) -> impl FnOnce(Status) -> MapiError + 'l {
    move |status| {
        log.write(LogEntry::error(message, status));
        MapiError::new(op, status)
    }
}

/// Like [`log_failure`], with the object the operation was working on.
pub(crate) fn log_failure_for<'l>(
    log: &'l ProbeLog,
    op: &'static str,
    message: &'static str,
    detail: &'l str,
) -> impl FnOnce(Status) -> MapiError + 'l {
    move |status| {
        log.write(LogEntry::error(message, status).detail(detail));
        MapiError::new(op, status)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub started: String,
    pub finished: String,
    /// The failure that stopped the run before or while listing stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MapiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logoff_error: Option<MapiError>,
    pub stores: Vec<StoreDescriptor>,
    pub processed: Vec<StoreOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub errors_logged: usize,
}

impl ProbeReport {
    fn started_now() -> Self {
        Self {
            started: Local::now().to_rfc3339(),
            finished: String::new(),
            error: None,
            logoff_error: None,
            stores: Vec::new(),
            processed: Vec::new(),
            log_file: None,
            errors_logged: 0,
        }
    }

    /// `S_OK` unless initialization, logon or the store table failed.
    pub fn status(&self) -> Status {
        self.error.map_or(Status::S_OK, |err| err.status)
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the whole probe against `provider`.
///
/// Never panics on subsystem failures; the report says how far it got.
pub fn run_probe(provider: &dyn MapiProvider, log: &ProbeLog, options: &ProbeOptions) -> ProbeReport {
    let mut report = ProbeReport::started_now();
    log.write(LogEntry::info("Initialising MAPI probe"));

    if let Some(path) = &options.log_file {
        log.write(LogEntry::info("Creating log file"));
        match log.open_file(path) {
            Ok(()) => report.log_file = Some(path.clone()),
            Err(err) => log.write(LogEntry::failure(format!(
                "Failed to create log file: {}: {}",
                path.display(),
                err
            ))),
        }
    }

    log.write(LogEntry::info("Starting MAPI log-on test"));
    match ProbeSession::initialize(provider, log) {
        Ok(session) => {
            let ctx = ProbeContext {
                provider,
                log,
                options,
            };
            match enumerate_stores(&ctx, session.session()) {
                Ok(enumeration) => {
                    report.stores = enumeration.stores;
                    report.processed = enumeration.processed;
                }
                Err(err) => report.error = Some(err),
            }
            if let Err(err) = session.shutdown() {
                report.logoff_error = Some(err);
            }
        }
        Err(err) => report.error = Some(err),
    }

    report.errors_logged = log.error_count();
    report.finished = Local::now().to_rfc3339();
    log.close_file();
    report
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use mapiprobe_core::{ProbeLog, Status};
    use mapiprobe_fixture::{
        FixtureProvider, FolderFixture, MessageFixture, Profile, StoreFixture,
    };

    use super::{ProbeOptions, ProbeReport, run_probe};

    fn temp_path(label: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("mapiprobe-{}-{}-{}", label, std::process::id(), ts))
    }

    fn mailbox(name: &str, subjects: &[&str]) -> StoreFixture {
        let inbox = subjects
            .iter()
            .fold(FolderFixture::new("Inbox"), |folder, subject| {
                folder.message(MessageFixture::new(subject).body("Body text.\r\n"))
            });
        StoreFixture::new(name)
            .email(&format!("{}@example.com", name.to_lowercase()))
            .default_store()
            .folder(inbox)
    }

    fn probe(profile: Profile, options: &ProbeOptions) -> (FixtureProvider, ProbeLog, ProbeReport) {
        let provider = FixtureProvider::new(profile);
        let log = ProbeLog::silent();
        let report = run_probe(&provider, &log, options);
        (provider, log, report)
    }

    type Inject = fn(&mut Profile, i64);

    fn fault_points() -> [(&'static str, Inject); 18] {
        [
            ("initialize", |p, c| p.faults.initialize = Some(c)),
            ("logon", |p, c| p.faults.logon = Some(c)),
            ("logoff", |p, c| p.faults.logoff = Some(c)),
            ("stores_table", |p, c| p.faults.stores_table = Some(c)),
            ("stores_query", |p, c| p.faults.stores_query = Some(c)),
            ("store_open", |p, c| p.stores[0].open_status = Some(c)),
            ("root_open", |p, c| p.stores[0].root_status = Some(c)),
            ("receive_folder", |p, c| p.stores[0].receive_folder_status = Some(c)),
            ("inbox_open", |p, c| p.stores[0].folders[0].open_status = Some(c)),
            ("inbox_name", |p, c| p.stores[0].folders[0].name_status = Some(c)),
            ("contents_table", |p, c| p.stores[0].folders[0].contents_status = Some(c)),
            ("contents_query", |p, c| p.stores[0].folders[0].query_status = Some(c)),
            ("message_open", |p, c| p.stores[0].folders[0].messages[0].open_status = Some(c)),
            ("create_converter", |p, c| p.faults.create_converter = Some(c)),
            ("set_encoding", |p, c| p.faults.set_encoding = Some(c)),
            ("set_save_format", |p, c| p.faults.set_save_format = Some(c)),
            ("create_stream", |p, c| p.faults.create_stream = Some(c)),
            ("conversion", |p, c| p.stores[0].folders[0].messages[0].convert_status = Some(c)),
        ]
    }

    const FATAL: [&str; 4] = ["initialize", "logon", "stores_table", "stores_query"];

    #[test]
    fn every_injected_fault_is_contained_and_balanced() {
        let options = ProbeOptions {
            convert: true,
            ..ProbeOptions::listing()
        };
        for (index, (point, inject)) in fault_points().iter().enumerate() {
            let code = 0x8004_1100 + index as i64;
            let status = Status::try_from_wide(code).expect("32-bit code");
            let mut profile = Profile::new("faults")
                .store(mailbox("Primary", &["first", "second"]))
                .store(mailbox("Secondary", &["third", "fourth"]));
            inject(&mut profile, code);

            let (provider, log, report) = probe(profile, &options);

            assert!(
                log.contains(&status.code().to_string()),
                "{}: injected code not logged in {:?}",
                point,
                log.lines()
            );
            let ledger = provider.ledger();
            assert!(ledger.is_balanced(), "{}: unbalanced {:?}", point, ledger.unbalanced());
            assert_eq!(ledger.logoffs(), usize::from(!matches!(*point, "initialize" | "logon")));

            if FATAL.contains(point) {
                assert_eq!(report.status(), status, "{}", point);
                assert!(report.processed.is_empty(), "{}", point);
                continue;
            }
            assert_eq!(report.status(), Status::S_OK, "{}", point);
            assert_eq!(report.processed.len(), 2, "{}", point);
            let sibling = report.processed[1]
                .listing
                .as_ref()
                .map(|listing| listing.opened);
            assert_eq!(sibling, Some(2), "{}: sibling store did not finish", point);

            match *point {
                "logoff" => {
                    assert_eq!(report.logoff_error.map(|e| e.status), Some(status));
                }
                "message_open" | "conversion" => {
                    let primary = report.processed[0].listing.as_ref();
                    assert_eq!(primary.map(|l| l.processed), Some(2), "{}", point);
                    assert_eq!(primary.map(|l| l.failures.len()), Some(1), "{}", point);
                    assert_eq!(primary.map(|l| l.failures[0].row), Some(0), "{}", point);
                }
                "create_converter" | "set_encoding" | "set_save_format" | "create_stream" => {
                    let primary = report.processed[0].listing.as_ref();
                    assert_eq!(primary.map(|l| l.opened), Some(2), "{}", point);
                    assert_eq!(primary.map(|l| l.converted.len()), Some(0), "{}", point);
                }
                _ => {
                    assert_eq!(
                        report.processed[0].error.map(|e| e.status),
                        Some(status),
                        "{}",
                        point
                    );
                }
            }
        }
    }

    #[test]
    fn only_the_default_store_is_processed() {
        let profile = Profile::new("three")
            .store(StoreFixture::new("Alpha"))
            .store(mailbox("Bravo", &["hello"]))
            .store(StoreFixture::new("Charlie"));
        let (provider, log, report) = probe(profile, &ProbeOptions::listing());

        let opens = provider.ledger().store_opens();
        assert_eq!(opens.len(), 1);
        assert_eq!(opens[0].display_name, "Bravo");

        let lines = log.lines();
        assert!(lines.contains(&"Message store: Alpha".to_string()));
        assert!(lines.contains(&"Default message store: Bravo".to_string()));
        assert!(lines.contains(&"Message store: Charlie".to_string()));
        assert!(!log.contains("Default message store: Alpha"));
        assert!(!log.contains("Default message store: Charlie"));
        assert!(!lines.contains(&"Message store: Bravo".to_string()));

        assert_eq!(report.stores.len(), 3);
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].inbox.as_deref(), Some("Inbox"));
        assert!(report.succeeded());
    }

    #[test]
    fn listing_opens_all_and_conversion_only_the_first() {
        let subjects = ["one", "two", "three", "four", "five"];

        let (provider, log, report) = probe(
            Profile::new("five").store(mailbox("Mailbox", &subjects)),
            &ProbeOptions::listing(),
        );
        let listing = report.processed[0].listing.clone().unwrap_or_default();
        assert_eq!(listing.subjects, subjects);
        assert_eq!(listing.opened, 5);
        assert_eq!(provider.ledger().message_opens().len(), 5);
        assert_eq!(provider.ledger().conversions(), 0);
        assert!(!log.contains("Converted message to MIME"));

        let (provider, log, report) = probe(
            Profile::new("five").store(mailbox("Mailbox", &subjects)),
            &ProbeOptions::conversion(),
        );
        let listing = report.processed[0].listing.clone().unwrap_or_default();
        assert_eq!(listing.rows, 5);
        assert_eq!(listing.subjects, ["one"]);
        assert_eq!(listing.opened, 1);
        assert_eq!(listing.converted.len(), 1);
        assert_eq!(provider.ledger().message_opens().len(), 1);
        assert_eq!(provider.ledger().conversions(), 1);
        assert!(log.contains("Converted message to MIME: "));
        assert!(log.contains("Message limit reached, rows skipped: 4"));
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn message_without_subject_is_still_opened() {
        let (provider, log, report) = probe(Profile::demo(), &ProbeOptions::listing());
        let listing = report.processed[0].listing.clone().unwrap_or_default();
        assert_eq!(listing.processed, 3);
        assert_eq!(listing.subjects.len(), 2);
        assert_eq!(listing.opened, 3);
        let subject_lines = log
            .lines()
            .iter()
            .filter(|line| line.starts_with("Item subject: "))
            .count();
        assert_eq!(subject_lines, 2);
        assert_eq!(provider.ledger().message_opens().len(), 3);
        assert_eq!(log.error_count(), 0);
    }

    #[test]
    fn log_file_receives_everything_after_it_opens() -> anyhow::Result<()> {
        let path = temp_path("run.log");
        let options = ProbeOptions {
            log_file: Some(path.clone()),
            ..ProbeOptions::listing()
        };
        let (_provider, log, report) = probe(Profile::demo(), &options);

        let lines = log.lines();
        assert_eq!(lines[0], "Initialising MAPI probe");
        assert_eq!(lines[1], "Creating log file");
        let expected: String = lines[2..].iter().map(|line| format!("{}\n", line)).collect();
        assert_eq!(std::fs::read_to_string(&path)?, expected);
        assert_eq!(report.log_file.as_deref(), Some(path.as_path()));
        assert!(log.file_path().is_none());

        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn unwritable_log_file_falls_back_to_console() {
        let options = ProbeOptions {
            log_file: Some(temp_path("missing-dir").join("probe.log")),
            ..ProbeOptions::listing()
        };
        let (provider, log, report) = probe(Profile::demo(), &options);
        assert!(log.contains("Failed to create log file: "));
        assert!(log.contains("LogOff succeeded"));
        assert!(report.succeeded());
        assert_eq!(report.log_file, None);
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn exports_converted_messages_as_eml() -> anyhow::Result<()> {
        let dir = temp_path("export");
        std::fs::create_dir_all(&dir)?;
        let options = ProbeOptions {
            export_dir: Some(dir.clone()),
            ..ProbeOptions::conversion()
        };
        let (_provider, log, report) = probe(Profile::demo(), &options);

        let exported = report.processed[0]
            .listing
            .as_ref()
            .map(|listing| listing.exported.clone())
            .unwrap_or_default();
        assert_eq!(exported, [dir.join("message-1.eml")]);
        assert!(log.contains("Exported message: "));

        let bytes = std::fs::read(&exported[0])?;
        let parsed = mailparse::parse_mail(&bytes)?;
        assert_eq!(
            parsed.headers.iter().find(|h| h.get_key() == "Subject").map(|h| h.get_value()),
            Some("Welcome to your mailbox".to_string())
        );
        assert_eq!(parsed.get_body()?.trim_end(), "Your mailbox is ready.");

        let _ = std::fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn export_failure_does_not_stop_listing() {
        let options = ProbeOptions {
            export_dir: Some(temp_path("no-such-export-dir")),
            convert: true,
            ..ProbeOptions::listing()
        };
        let (provider, log, report) = probe(Profile::demo(), &options);
        let listing = report.processed[0].listing.clone().unwrap_or_default();
        assert_eq!(listing.converted.len(), 3);
        assert!(listing.exported.is_empty());
        assert!(log.contains("Failed to export message: "));
        assert!(provider.ledger().is_balanced());
    }
}

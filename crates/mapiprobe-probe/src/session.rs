use mapiprobe_core::{
    LogEntry, LogonFlags, MapiError, MapiProvider, MapiSession, ProbeLog, SubsystemGuard,
};

use crate::log_failure;

/// A logged-on session with the subsystem initialized underneath it.
///
/// Dropping it logs off (once), releases the session and then uninitializes
/// the subsystem, in that order.
pub struct ProbeSession<'a> {
    session: Box<dyn MapiSession>,
    log: &'a ProbeLog,
    logged_off: bool,
    _subsystem: SubsystemGuard<'a>,
}

impl<'a> ProbeSession<'a> {
    pub fn initialize(provider: &'a dyn MapiProvider, log: &'a ProbeLog) -> Result<Self, MapiError> {
        let subsystem = SubsystemGuard::initialize(provider).map_err(log_failure(
            log,
            "MAPIInitialize",
            "Fatal Error: MAPIInitialize failed ",
        ))?;
        log.write(LogEntry::info("MAPIInitialize succeeded"));

        let flags = LogonFlags::NEW_SESSION | LogonFlags::EXTENDED | LogonFlags::USE_DEFAULT;
        let session = provider
            .logon(flags)
            .map_err(log_failure(log, "MAPILogonEx", "Error: MAPILogonEx failed "))?;
        log.write(LogEntry::info("MAPILogonEx succeeded"));

        Ok(Self {
            session,
            log,
            logged_off: false,
            _subsystem: subsystem,
        })
    }

    pub fn session(&self) -> &dyn MapiSession {
        self.session.as_ref()
    }

    pub fn shutdown(mut self) -> Result<(), MapiError> {
        self.logoff()
    }

    fn logoff(&mut self) -> Result<(), MapiError> {
        if self.logged_off {
            return Ok(());
        }
        self.logged_off = true;
        match self.session.logoff() {
            Ok(()) => {
                self.log.write(LogEntry::info("LogOff succeeded"));
                Ok(())
            }
            Err(status) => {
                self.log.write(LogEntry::error("Error at Logoff: ", status));
                Err(MapiError::new("Logoff", status))
            }
        }
    }
}

impl Drop for ProbeSession<'_> {
    fn drop(&mut self) {
        let _ = self.logoff();
    }
}

#[cfg(test)]
mod tests {
    use mapiprobe_core::{ProbeLog, Status};
    use mapiprobe_fixture::{FixtureProvider, HandleKind, Profile};

    use super::ProbeSession;

    #[test]
    fn initialize_failure_leaves_nothing_to_release() {
        let mut profile = Profile::demo();
        profile.faults.initialize = Some(0x8004_0605);
        let provider = FixtureProvider::new(profile);
        let log = ProbeLog::silent();

        let err = ProbeSession::initialize(&provider, &log).err();
        assert_eq!(err.map(|e| e.status), Some(Status::MAPI_E_NOT_INITIALIZED));
        assert!(log.contains("Fatal Error: MAPIInitialize failed -2147219963"));
        assert_eq!(provider.ledger().acquired(HandleKind::Subsystem), 0);
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn logon_failure_uninitializes() {
        let mut profile = Profile::demo();
        profile.faults.logon = Some(0x8004_0111);
        let provider = FixtureProvider::new(profile);
        let log = ProbeLog::silent();

        let err = ProbeSession::initialize(&provider, &log).err();
        assert_eq!(err.map(|e| e.op), Some("MAPILogonEx"));
        assert!(log.contains("MAPIInitialize succeeded"));
        assert!(log.contains("Error: MAPILogonEx failed -2147221231"));
        assert_eq!(provider.ledger().released(HandleKind::Subsystem), 1);
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn drop_without_shutdown_still_logs_off_once() {
        let provider = FixtureProvider::demo();
        let log = ProbeLog::silent();
        {
            let _session = ProbeSession::initialize(&provider, &log).ok();
        }
        assert_eq!(provider.ledger().logoffs(), 1);
        assert!(log.contains("LogOff succeeded"));
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn logoff_failure_is_reported_and_session_released() -> anyhow::Result<()> {
        let mut profile = Profile::demo();
        profile.faults.logoff = Some(-7);
        let provider = FixtureProvider::new(profile);
        let log = ProbeLog::silent();

        let session = ProbeSession::initialize(&provider, &log)?;
        let result = session.shutdown();
        assert_eq!(result.err().map(|e| e.status), Some(Status::new(-7)));
        assert!(log.contains("Error at Logoff: -7"));
        assert_eq!(provider.ledger().logoffs(), 1);
        assert!(provider.ledger().is_balanced());
        Ok(())
    }
}

use mapiprobe_core::{
    LogEntry, MapiError, MapiObject, MapiSession, MsgStore, OpenFlags, Status,
};
use serde::Serialize;

use crate::inbox::open_inbox;
use crate::messages::{MessageListing, list_messages};
use crate::stores::StoreDescriptor;
use crate::{ProbeContext, log_failure_for};

pub const STORE_OPEN_FLAGS: OpenFlags =
    OpenFlags(OpenFlags::BEST_ACCESS.0 | OpenFlags::NO_DIALOG.0 | OpenFlags::ONLINE.0);

/// What happened to one default store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    pub display_name: String,
    pub inbox: Option<String>,
    pub listing: Option<MessageListing>,
    pub error: Option<MapiError>,
}

impl StoreOutcome {
    fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            inbox: None,
            listing: None,
            error: None,
        }
    }

    pub fn failed(display_name: &str, error: MapiError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(display_name)
        }
    }
}

/// Opens the store and its root folder, then lists the receive folder.
///
/// Fails only when the store or its root folder cannot be opened; inbox and
/// listing failures are recorded in the outcome. Handles are released in
/// reverse order of acquisition and each release is logged.
pub fn process_store(
    ctx: &ProbeContext<'_>,
    session: &dyn MapiSession,
    descriptor: &StoreDescriptor,
) -> Result<StoreOutcome, MapiError> {
    let name = descriptor.display_name.as_str();
    let opened = match &descriptor.entry_id {
        Some(entry_id) => session.open_msg_store(entry_id, STORE_OPEN_FLAGS),
        None => Err(Status::MAPI_E_INVALID_ENTRYID),
    };
    let store = opened.map_err(log_failure_for(
        ctx.log,
        "OpenMsgStore",
        "Failed on OpenMsgStore: ",
        name,
    ))?;
    ctx.log
        .write(LogEntry::info("Opened message store: ").detail(name));

    let result = process_root(ctx, store.as_ref(), name);

    drop(store);
    ctx.log
        .write(LogEntry::info("Released message store: ").detail(name));
    result
}

fn process_root(
    ctx: &ProbeContext<'_>,
    store: &dyn MsgStore,
    name: &str,
) -> Result<StoreOutcome, MapiError> {
    let root = store
        .open_entry(None, OpenFlags::BEST_ACCESS)
        .and_then(MapiObject::into_folder)
        .map_err(log_failure_for(
            ctx.log,
            "OpenEntry",
            "Failed to open root folder of message store: ",
            name,
        ))?;
    ctx.log
        .write(LogEntry::info("Opened root folder of message store: ").detail(name));

    let mut outcome = StoreOutcome::new(name);
    match open_inbox(ctx, store) {
        Ok(inbox) => {
            outcome.inbox = Some(inbox.display_name.clone());
            match list_messages(ctx, store, inbox.folder.as_ref()) {
                Ok(listing) => outcome.listing = Some(listing),
                Err(err) => outcome.error = Some(err),
            }
            drop(inbox);
            ctx.log.write(LogEntry::info("Receive folder released"));
        }
        Err(err) => outcome.error = Some(err),
    }

    drop(root);
    ctx.log
        .write(LogEntry::info("Released root folder of message store: ").detail(name));
    Ok(outcome)
}

use mapiprobe_core::{
    EntryId, LogEntry, MapiError, MapiSession, PR_DEFAULT_STORE, PR_DISPLAY_NAME_W,
    PR_EMAIL_ADDRESS_W, PR_ENTRYID, PropRow, PropTag, PropValue, ProbeLog,
};
use serde::Serialize;

use crate::store::{StoreOutcome, process_store};
use crate::{ProbeContext, log_failure};

/// Columns requested from the store table, in row order.
pub const STORE_COLUMNS: [PropTag; 4] =
    [PR_ENTRYID, PR_EMAIL_ADDRESS_W, PR_DISPLAY_NAME_W, PR_DEFAULT_STORE];

const COL_ENTRY_ID: usize = 0;
const COL_EMAIL: usize = 1;
const COL_DISPLAY_NAME: usize = 2;
const COL_DEFAULT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreDescriptor {
    #[serde(skip)]
    pub entry_id: Option<EntryId>,
    pub display_name: String,
    pub email: Option<String>,
    pub is_default: bool,
}

impl StoreDescriptor {
    /// Reads one store-table row projected onto [`STORE_COLUMNS`]. Columns
    /// that came back as errors are treated as absent.
    pub fn from_row(row: &PropRow) -> Self {
        Self {
            entry_id: row
                .value_if(COL_ENTRY_ID, PR_ENTRYID)
                .and_then(PropValue::as_binary)
                .map(|bytes| EntryId::new(bytes.to_vec())),
            display_name: row
                .value_if(COL_DISPLAY_NAME, PR_DISPLAY_NAME_W)
                .and_then(PropValue::as_text)
                .unwrap_or_default(),
            email: row
                .value_if(COL_EMAIL, PR_EMAIL_ADDRESS_W)
                .and_then(PropValue::as_text),
            is_default: row
                .value_if(COL_DEFAULT, PR_DEFAULT_STORE)
                .and_then(PropValue::as_bool)
                .unwrap_or(false),
        }
    }
}

pub fn list_stores(
    session: &dyn MapiSession,
    log: &ProbeLog,
) -> Result<Vec<StoreDescriptor>, MapiError> {
    let table = session
        .msg_stores_table()
        .map_err(log_failure(log, "GetMsgStoresTable", "GetMsgStoresTable failed: "))?;
    log.write(LogEntry::info("GetMsgStoresTable succeeded"));

    let rows = table
        .query_all_rows(&STORE_COLUMNS)
        .map_err(log_failure(log, "HrQueryAllRows", "HrQueryAllRows failed: "))?;
    Ok(rows.iter().map(StoreDescriptor::from_row).collect())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreEnumeration {
    pub stores: Vec<StoreDescriptor>,
    pub processed: Vec<StoreOutcome>,
}

/// Logs every store and runs the processor on each one flagged as default.
pub fn enumerate_stores(
    ctx: &ProbeContext<'_>,
    session: &dyn MapiSession,
) -> Result<StoreEnumeration, MapiError> {
    let stores = list_stores(session, ctx.log)?;
    let mut processed = Vec::new();
    for store in &stores {
        if store.is_default {
            ctx.log
                .write(LogEntry::info("Default message store: ").detail(&store.display_name));
            let outcome = process_store(ctx, session, store)
                .unwrap_or_else(|err| StoreOutcome::failed(&store.display_name, err));
            processed.push(outcome);
        } else {
            ctx.log
                .write(LogEntry::info("Message store: ").detail(&store.display_name));
        }
    }
    Ok(StoreEnumeration { stores, processed })
}

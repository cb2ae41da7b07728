use std::path::{Path, PathBuf};

use mapiprobe_core::{
    EntryId, LogEntry, MapiError, MapiFolder, MapiMessage, MapiObject, MsgStore, OpenFlags,
    PR_ENTRYID, PR_SUBJECT_W, PropRow, PropTag, PropValue, Status,
};
use serde::Serialize;

use crate::convert::convert_message;
use crate::{ProbeContext, log_failure};

/// Columns requested from a folder's contents table, in row order.
pub const MESSAGE_COLUMNS: [PropTag; 2] = [PR_SUBJECT_W, PR_ENTRYID];

const COL_SUBJECT: usize = 0;
const COL_ENTRY_ID: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    /// Present only when the row carried a real subject rather than an
    /// error value.
    pub subject: Option<String>,
    pub entry_id: Option<EntryId>,
}

impl MessageRow {
    pub fn from_row(row: &PropRow) -> Self {
        Self {
            subject: row
                .value_if(COL_SUBJECT, PR_SUBJECT_W)
                .and_then(PropValue::as_text),
            entry_id: row
                .value_if(COL_ENTRY_ID, PR_ENTRYID)
                .and_then(PropValue::as_binary)
                .map(|bytes| EntryId::new(bytes.to_vec())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFailure {
    /// Zero-based row in the contents table.
    pub row: usize,
    pub error: MapiError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageListing {
    /// Rows returned by the contents table.
    pub rows: usize,
    /// Rows actually visited, after the message limit.
    pub processed: usize,
    pub subjects: Vec<String>,
    pub opened: usize,
    /// MIME size in bytes of each converted message.
    pub converted: Vec<usize>,
    pub exported: Vec<PathBuf>,
    pub failures: Vec<MessageFailure>,
}

pub fn list_messages(
    ctx: &ProbeContext<'_>,
    store: &dyn MsgStore,
    folder: &dyn MapiFolder,
) -> Result<MessageListing, MapiError> {
    let log = ctx.log;
    log.write(LogEntry::info("Attempting to list items in folder"));

    let table = folder
        .contents_table()
        .map_err(log_failure(log, "GetContentsTable", "Failed on GetContentsTable: "))?;
    let rows = table
        .query_all_rows(&MESSAGE_COLUMNS)
        .map_err(log_failure(log, "HrQueryAllRows", "Failed on HrQueryAllRows: "))?;

    let limit = ctx
        .options
        .max_messages
        .map_or(rows.len(), |max| max.min(rows.len()));
    let mut listing = MessageListing {
        rows: rows.len(),
        ..MessageListing::default()
    };

    for (index, row) in rows.iter().take(limit).enumerate() {
        listing.processed += 1;
        let row = MessageRow::from_row(row);
        if let Some(subject) = &row.subject {
            log.write(LogEntry::info("Item subject: ").detail(subject));
            listing.subjects.push(subject.clone());
        }

        let message = match open_message(ctx, store, &row) {
            Ok(message) => message,
            Err(error) => {
                listing.failures.push(MessageFailure { row: index, error });
                continue;
            }
        };
        listing.opened += 1;

        if ctx.options.convert {
            match convert_message(ctx, message.as_ref()) {
                Ok(mime) => {
                    listing.converted.push(mime.len());
                    if let Some(dir) = &ctx.options.export_dir {
                        listing.exported.extend(export_message(ctx, dir, index, &mime));
                    }
                }
                Err(error) => listing.failures.push(MessageFailure { row: index, error }),
            }
        }
    }

    if limit < rows.len() {
        log.write(
            LogEntry::info("Message limit reached, rows skipped: ")
                .detail((rows.len() - limit).to_string()),
        );
    }
    Ok(listing)
}

fn open_message(
    ctx: &ProbeContext<'_>,
    store: &dyn MsgStore,
    row: &MessageRow,
) -> Result<Box<dyn MapiMessage>, MapiError> {
    let opened = match &row.entry_id {
        Some(entry_id) => store
            .open_entry(Some(entry_id), OpenFlags::BEST_ACCESS)
            .and_then(MapiObject::into_message),
        None => Err(Status::MAPI_E_INVALID_ENTRYID),
    };
    opened.map_err(log_failure(ctx.log, "OpenEntry", "OpenEntry error: "))
}

fn export_message(ctx: &ProbeContext<'_>, dir: &Path, index: usize, mime: &[u8]) -> Option<PathBuf> {
    let path = dir.join(format!("message-{}.eml", index + 1));
    match std::fs::write(&path, mime) {
        Ok(()) => {
            ctx.log.write(
                LogEntry::info("Exported message: ").detail(path.display().to_string()),
            );
            Some(path)
        }
        Err(err) => {
            ctx.log.write(LogEntry::failure(format!(
                "Failed to export message: {}: {}",
                path.display(),
                err
            )));
            None
        }
    }
}

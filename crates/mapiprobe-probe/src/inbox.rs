use mapiprobe_core::{
    LogEntry, MapiError, MapiFolder, MapiObject, MsgStore, OpenFlags, PR_DISPLAY_NAME_W,
};

use crate::{ProbeContext, log_failure};

/// The store's default receive folder, opened.
pub struct OpenedFolder {
    pub folder: Box<dyn MapiFolder>,
    pub display_name: String,
}

pub fn open_inbox(ctx: &ProbeContext<'_>, store: &dyn MsgStore) -> Result<OpenedFolder, MapiError> {
    let log = ctx.log;
    let entry_id = store
        .receive_folder()
        .map_err(log_failure(log, "GetReceiveFolder", "Failed on GetReceiveFolder: "))?;

    let folder = store
        .open_entry(Some(&*entry_id), OpenFlags::BEST_ACCESS)
        .and_then(MapiObject::into_folder)
        .map_err(log_failure(
            log,
            "OpenEntry",
            "Failed on OpenEntry (receive folder): ",
        ))?;

    let name = folder.get_one_prop(PR_DISPLAY_NAME_W).map_err(log_failure(
        log,
        "HrGetOneProp",
        "Failed on HrGetOneProp (receive folder): ",
    ))?;
    let display_name = name.as_text().unwrap_or_default();
    log.write(LogEntry::info("Opened receive folder: ").detail(&display_name));

    Ok(OpenedFolder {
        folder,
        display_name,
    })
}

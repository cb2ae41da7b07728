//! Types and traits shared by the probe and the subsystems it drives.

pub mod boundary;
pub mod log;
pub mod props;
pub mod status;

pub use boundary::{
    ConvertFlags, FreeHook, LogonFlags, MapiBuffer, MapiFolder, MapiMessage, MapiObject,
    MapiProvider, MapiSession, MapiStream, MapiTable, MimeConverter, MimeEncoding, MsgStore,
    OpenFlags, PropertySource, RowSet, SaveFormat, SubsystemGuard,
};
pub use log::{Level, LogEntry, ProbeLog};
pub use props::{
    EntryId, PR_DEFAULT_STORE, PR_DISPLAY_NAME_W, PR_EMAIL_ADDRESS_W, PR_ENTRYID, PR_SUBJECT_W,
    PropRow, PropTag, PropValue, PropertyValue, wide_to_utf8,
};
pub use status::{HResult, MapiError, Status};

//! The messaging and conversion subsystems as seen from the probe.
//!
//! Every handle is an owned trait object and releasing it is its `Drop`.
//! Memory the subsystem allocates on our behalf comes back as a
//! [`MapiBuffer`], which frees itself the same way.

use std::fmt;
use std::io::Write;
use std::ops::{BitOr, Deref};

use crate::props::{EntryId, PropRow, PropTag, PropValue};
use crate::status::{HResult, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const BEST_ACCESS: OpenFlags = OpenFlags(0x0000_0010);
    pub const NO_DIALOG: OpenFlags = OpenFlags(0x0000_0001);
    pub const ONLINE: OpenFlags = OpenFlags(0x0000_0100);

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogonFlags(pub u32);

impl LogonFlags {
    pub const NEW_SESSION: LogonFlags = LogonFlags(0x0000_0002);
    pub const EXTENDED: LogonFlags = LogonFlags(0x0000_0020);
    pub const USE_DEFAULT: LogonFlags = LogonFlags(0x0000_0040);

    pub const fn contains(self, other: LogonFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LogonFlags {
    type Output = LogonFlags;

    fn bitor(self, rhs: LogonFlags) -> LogonFlags {
        LogonFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeEncoding {
    SevenBit,
    EightBit,
    QuotedPrintable,
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// Plain RFC 822, no MIME structure.
    Rfc822,
    /// RFC 1521 MIME.
    Rfc1521,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertFlags(pub u32);

impl ConvertFlags {
    pub const SMTP: ConvertFlags = ConvertFlags(0x0002);

    pub const fn contains(self, other: ConvertFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Runs the deallocation a subsystem buffer needs, once, when dropped.
pub struct FreeHook(Option<Box<dyn FnOnce()>>);

impl FreeHook {
    pub fn new(free: impl FnOnce() + 'static) -> Self {
        FreeHook(Some(Box::new(free)))
    }

    pub fn none() -> Self {
        FreeHook(None)
    }
}

impl Drop for FreeHook {
    fn drop(&mut self) {
        if let Some(free) = self.0.take() {
            free();
        }
    }
}

impl fmt::Debug for FreeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "FreeHook(pending)" } else { "FreeHook(none)" })
    }
}

/// Subsystem-allocated value.
#[derive(Debug)]
pub struct MapiBuffer<T> {
    value: T,
    _free: FreeHook,
}

impl<T> MapiBuffer<T> {
    pub fn new(value: T, free: FreeHook) -> Self {
        Self { value, _free: free }
    }
}

impl<T> Deref for MapiBuffer<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

pub type RowSet = MapiBuffer<Vec<PropRow>>;

pub trait MapiProvider {
    fn initialize(&self) -> HResult<()>;
    fn uninitialize(&self);
    fn logon(&self, flags: LogonFlags) -> HResult<Box<dyn MapiSession>>;
    /// Instantiates the external MAPI-to-MIME converter component.
    fn create_converter(&self) -> HResult<Box<dyn MimeConverter>>;
    /// Allocates an in-memory output stream.
    fn create_stream(&self) -> HResult<Box<dyn MapiStream>>;
}

pub trait MapiSession {
    fn msg_stores_table(&self) -> HResult<Box<dyn MapiTable>>;
    fn open_msg_store(&self, entry_id: &EntryId, flags: OpenFlags) -> HResult<Box<dyn MsgStore>>;
    fn logoff(&mut self) -> HResult<()>;
}

pub trait MapiTable {
    /// Every row of the table, projected onto `columns` in that order.
    fn query_all_rows(&self, columns: &[PropTag]) -> HResult<RowSet>;
}

pub trait PropertySource {
    fn get_one_prop(&self, tag: PropTag) -> HResult<MapiBuffer<PropValue>>;
}

pub trait MsgStore {
    /// `None` opens the store's root folder.
    fn open_entry(&self, entry_id: Option<&EntryId>, flags: OpenFlags) -> HResult<MapiObject>;
    /// Entry id of the default receive folder.
    fn receive_folder(&self) -> HResult<MapiBuffer<EntryId>>;
}

pub trait MapiFolder: PropertySource {
    fn contents_table(&self) -> HResult<Box<dyn MapiTable>>;
}

pub trait MapiMessage: PropertySource {}

pub trait MapiStream: Write {
    fn contents(&self) -> &[u8];
}

pub trait MimeConverter {
    fn set_encoding(&mut self, encoding: MimeEncoding) -> HResult<()>;
    fn set_save_format(&mut self, format: SaveFormat) -> HResult<()>;
    fn convert_to_stream(
        &mut self,
        message: &dyn MapiMessage,
        stream: &mut dyn MapiStream,
        flags: ConvertFlags,
    ) -> HResult<()>;
}

/// What `open_entry` hands back; the caller decides which kind it needs.
pub enum MapiObject {
    Folder(Box<dyn MapiFolder>),
    Message(Box<dyn MapiMessage>),
}

impl MapiObject {
    pub fn into_folder(self) -> HResult<Box<dyn MapiFolder>> {
        match self {
            MapiObject::Folder(folder) => Ok(folder),
            MapiObject::Message(_) => Err(Status::MAPI_E_INVALID_OBJECT),
        }
    }

    pub fn into_message(self) -> HResult<Box<dyn MapiMessage>> {
        match self {
            MapiObject::Message(message) => Ok(message),
            MapiObject::Folder(_) => Err(Status::MAPI_E_INVALID_OBJECT),
        }
    }
}

/// Keeps the subsystem initialized for as long as it lives.
pub struct SubsystemGuard<'p> {
    provider: &'p dyn MapiProvider,
}

impl<'p> SubsystemGuard<'p> {
    pub fn initialize(provider: &'p dyn MapiProvider) -> HResult<Self> {
        provider.initialize()?;
        Ok(Self { provider })
    }
}

impl Drop for SubsystemGuard<'_> {
    fn drop(&mut self) {
        self.provider.uninitialize();
    }
}

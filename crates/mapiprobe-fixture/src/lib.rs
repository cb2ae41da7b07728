//! In-memory messaging subsystem.
//!
//! Serves a [`Profile`] through the `mapiprobe-core` boundary traits, fails
//! wherever the profile asks it to, and keeps a [`Ledger`] of every handle
//! it hands out so tests can check that each one is released exactly once.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use mapiprobe_core::{
    EntryId, HResult, LogonFlags, MapiBuffer, MapiFolder, MapiMessage, MapiObject, MapiProvider,
    MapiSession, MapiStream, MapiTable, MimeConverter, MsgStore, OpenFlags, PR_DEFAULT_STORE,
    PR_DISPLAY_NAME_W, PR_EMAIL_ADDRESS_W, PR_ENTRYID, PR_SUBJECT_W, PropRow, PropTag, PropValue,
    PropertySource, PropertyValue, RowSet, Status,
};

mod convert;
mod ledger;
mod profile;

pub use ledger::{HandleKind, Ledger, StoreOpen};
pub use profile::{FolderFixture, MessageFixture, Profile, SessionFaults, StoreFixture};

use convert::{FixtureConverter, FixtureStream};
use ledger::Tracked;

struct Shared {
    profile: Profile,
    ledger: Ledger,
    initialized: Cell<bool>,
}

#[derive(Clone)]
pub struct FixtureProvider {
    shared: Rc<Shared>,
}

impl FixtureProvider {
    pub fn new(profile: Profile) -> Self {
        Self {
            shared: Rc::new(Shared {
                profile,
                ledger: Ledger::default(),
                initialized: Cell::new(false),
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(Profile::load(path)?))
    }

    pub fn demo() -> Self {
        Self::new(Profile::demo())
    }

    pub fn ledger(&self) -> Ledger {
        self.shared.ledger.clone()
    }
}

/// Profiles built in code skip [`Profile::validate`], so a code that is not
/// a failure still fails, as `MAPI_E_CALL_FAILED`.
pub(crate) fn fault(status: Option<i64>) -> HResult<()> {
    match status {
        Some(code) => Err(Status::try_from_wide(code)
            .filter(|status| status.failed())
            .unwrap_or(Status::MAPI_E_CALL_FAILED)),
        None => Ok(()),
    }
}

/// Where an entry id issued by the fixture points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryRef {
    Store(usize),
    Folder(usize, usize),
    Message(usize, usize, usize),
}

impl EntryRef {
    pub(crate) fn to_entry_id(self) -> EntryId {
        let text = match self {
            EntryRef::Store(s) => format!("store:{}", s),
            EntryRef::Folder(s, f) => format!("folder:{}:{}", s, f),
            EntryRef::Message(s, f, m) => format!("message:{}:{}:{}", s, f, m),
        };
        EntryId::new(text.into_bytes())
    }

    pub(crate) fn parse(entry_id: &EntryId) -> Option<EntryRef> {
        let text = std::str::from_utf8(entry_id.as_bytes()).ok()?;
        let mut parts = text.split(':');
        let kind = parts.next()?;
        let indices: Vec<usize> = parts.map(|p| p.parse().ok()).collect::<Option<_>>()?;
        match (kind, indices.as_slice()) {
            ("store", [s]) => Some(EntryRef::Store(*s)),
            ("folder", [s, f]) => Some(EntryRef::Folder(*s, *f)),
            ("message", [s, f, m]) => Some(EntryRef::Message(*s, *f, *m)),
            _ => None,
        }
    }
}

fn unicode_or_missing(tag: PropTag, text: Option<&str>) -> PropertyValue {
    match text {
        Some(text) => PropertyValue::new(tag, PropValue::unicode(text)),
        None => PropertyValue::missing(tag, Status::MAPI_E_NOT_FOUND),
    }
}

impl MapiProvider for FixtureProvider {
    fn initialize(&self) -> HResult<()> {
        fault(self.shared.profile.faults.initialize)?;
        if !self.shared.initialized.replace(true) {
            self.shared.ledger.acquire(HandleKind::Subsystem);
        }
        Ok(())
    }

    fn uninitialize(&self) {
        if self.shared.initialized.replace(false) {
            self.shared.ledger.release(HandleKind::Subsystem);
        }
    }

    fn logon(&self, flags: LogonFlags) -> HResult<Box<dyn MapiSession>> {
        if !self.shared.initialized.get() {
            return Err(Status::MAPI_E_NOT_INITIALIZED);
        }
        fault(self.shared.profile.faults.logon)?;
        if !flags.contains(LogonFlags::EXTENDED) {
            return Err(Status::MAPI_E_NO_SUPPORT);
        }
        Ok(Box::new(FixtureSession {
            shared: self.shared.clone(),
            _tracked: self.shared.ledger.track(HandleKind::Session),
        }))
    }

    fn create_converter(&self) -> HResult<Box<dyn MimeConverter>> {
        fault(self.shared.profile.faults.create_converter)?;
        Ok(Box::new(FixtureConverter::new(
            self.shared.clone(),
            self.shared.ledger.track(HandleKind::Converter),
        )))
    }

    fn create_stream(&self) -> HResult<Box<dyn MapiStream>> {
        fault(self.shared.profile.faults.create_stream)?;
        Ok(Box::new(FixtureStream::new(
            self.shared.ledger.track(HandleKind::Stream),
        )))
    }
}

struct FixtureSession {
    shared: Rc<Shared>,
    _tracked: Tracked,
}

impl MapiSession for FixtureSession {
    fn msg_stores_table(&self) -> HResult<Box<dyn MapiTable>> {
        let faults = &self.shared.profile.faults;
        fault(faults.stores_table)?;
        let rows = self
            .shared
            .profile
            .stores
            .iter()
            .enumerate()
            .map(|(index, store)| {
                vec![
                    PropertyValue::new(
                        PR_ENTRYID,
                        PropValue::Binary(EntryRef::Store(index).to_entry_id().as_bytes().to_vec()),
                    ),
                    unicode_or_missing(PR_EMAIL_ADDRESS_W, store.email.as_deref()),
                    PropertyValue::new(PR_DISPLAY_NAME_W, PropValue::unicode(&store.display_name)),
                    PropertyValue::new(PR_DEFAULT_STORE, PropValue::Boolean(store.default)),
                ]
            })
            .collect();
        Ok(Box::new(FixtureTable::new(&self.shared, rows, faults.stores_query)))
    }

    fn open_msg_store(&self, entry_id: &EntryId, flags: OpenFlags) -> HResult<Box<dyn MsgStore>> {
        let Some(EntryRef::Store(index)) = EntryRef::parse(entry_id) else {
            return Err(Status::MAPI_E_INVALID_ENTRYID);
        };
        let store = self
            .shared
            .profile
            .stores
            .get(index)
            .ok_or(Status::MAPI_E_NOT_FOUND)?;
        self.shared.ledger.record_store_open(&store.display_name, flags);
        fault(store.open_status)?;
        Ok(Box::new(FixtureStore {
            shared: self.shared.clone(),
            store: index,
            _tracked: self.shared.ledger.track(HandleKind::Store),
        }))
    }

    fn logoff(&mut self) -> HResult<()> {
        self.shared.ledger.record_logoff();
        fault(self.shared.profile.faults.logoff)
    }
}

struct FixtureTable {
    ledger: Ledger,
    rows: Vec<Vec<PropertyValue>>,
    query_status: Option<i64>,
    _tracked: Tracked,
}

impl FixtureTable {
    fn new(shared: &Shared, rows: Vec<Vec<PropertyValue>>, query_status: Option<i64>) -> Self {
        Self {
            ledger: shared.ledger.clone(),
            rows,
            query_status,
            _tracked: shared.ledger.track(HandleKind::Table),
        }
    }
}

impl MapiTable for FixtureTable {
    fn query_all_rows(&self, columns: &[PropTag]) -> HResult<RowSet> {
        fault(self.query_status)?;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                PropRow(
                    columns
                        .iter()
                        .map(|tag| {
                            row.iter()
                                .find(|prop| prop.tag == *tag)
                                .cloned()
                                .unwrap_or_else(|| {
                                    PropertyValue::missing(*tag, Status::MAPI_E_NOT_FOUND)
                                })
                        })
                        .collect(),
                )
            })
            .collect();
        Ok(MapiBuffer::new(rows, self.ledger.free_hook(HandleKind::RowSet)))
    }
}

struct FixtureStore {
    shared: Rc<Shared>,
    store: usize,
    _tracked: Tracked,
}

impl FixtureStore {
    fn fixture(&self) -> &StoreFixture {
        &self.shared.profile.stores[self.store]
    }

    fn folder(&self, index: Option<usize>) -> MapiObject {
        MapiObject::Folder(Box::new(FixtureFolder {
            shared: self.shared.clone(),
            store: self.store,
            folder: index,
            _tracked: self.shared.ledger.track(HandleKind::Folder),
        }))
    }
}

impl MsgStore for FixtureStore {
    fn open_entry(&self, entry_id: Option<&EntryId>, _flags: OpenFlags) -> HResult<MapiObject> {
        let store = self.fixture();
        let Some(entry_id) = entry_id else {
            fault(store.root_status)?;
            return Ok(self.folder(None));
        };
        match EntryRef::parse(entry_id) {
            Some(EntryRef::Folder(s, f)) if s == self.store => {
                let folder = store.folders.get(f).ok_or(Status::MAPI_E_NOT_FOUND)?;
                fault(folder.open_status)?;
                Ok(self.folder(Some(f)))
            }
            Some(EntryRef::Message(s, f, m)) if s == self.store => {
                let message = store
                    .folders
                    .get(f)
                    .and_then(|folder| folder.messages.get(m))
                    .ok_or(Status::MAPI_E_NOT_FOUND)?;
                self.shared.ledger.record_message_open(entry_id);
                fault(message.open_status)?;
                Ok(MapiObject::Message(Box::new(FixtureMessage {
                    shared: self.shared.clone(),
                    at: (s, f, m),
                    _tracked: self.shared.ledger.track(HandleKind::Message),
                })))
            }
            _ => Err(Status::MAPI_E_INVALID_ENTRYID),
        }
    }

    fn receive_folder(&self) -> HResult<MapiBuffer<EntryId>> {
        let store = self.fixture();
        fault(store.receive_folder_status)?;
        let index = store
            .folders
            .iter()
            .position(|folder| folder.name.eq_ignore_ascii_case(&store.receive_folder))
            .ok_or(Status::MAPI_E_NOT_FOUND)?;
        Ok(MapiBuffer::new(
            EntryRef::Folder(self.store, index).to_entry_id(),
            self.shared.ledger.free_hook(HandleKind::Buffer),
        ))
    }
}

struct FixtureFolder {
    shared: Rc<Shared>,
    store: usize,
    /// `None` is the root folder.
    folder: Option<usize>,
    _tracked: Tracked,
}

impl FixtureFolder {
    fn fixture(&self) -> Option<&FolderFixture> {
        self.folder
            .map(|index| &self.shared.profile.stores[self.store].folders[index])
    }
}

impl PropertySource for FixtureFolder {
    fn get_one_prop(&self, tag: PropTag) -> HResult<MapiBuffer<PropValue>> {
        if tag != PR_DISPLAY_NAME_W {
            return Err(Status::MAPI_E_NOT_FOUND);
        }
        let name = match self.fixture() {
            Some(folder) => {
                fault(folder.name_status)?;
                folder.name.clone()
            }
            None => self.shared.profile.stores[self.store].root_name.clone(),
        };
        Ok(MapiBuffer::new(
            PropValue::unicode(&name),
            self.shared.ledger.free_hook(HandleKind::Buffer),
        ))
    }
}

impl MapiFolder for FixtureFolder {
    fn contents_table(&self) -> HResult<Box<dyn MapiTable>> {
        let Some(folder) = self.fixture() else {
            return Ok(Box::new(FixtureTable::new(&self.shared, Vec::new(), None)));
        };
        fault(folder.contents_status)?;
        let (store, index) = (self.store, self.folder.unwrap_or_default());
        let rows = folder
            .messages
            .iter()
            .enumerate()
            .map(|(m, message)| {
                vec![
                    unicode_or_missing(PR_SUBJECT_W, message.subject.as_deref()),
                    PropertyValue::new(
                        PR_ENTRYID,
                        PropValue::Binary(
                            EntryRef::Message(store, index, m).to_entry_id().as_bytes().to_vec(),
                        ),
                    ),
                ]
            })
            .collect();
        Ok(Box::new(FixtureTable::new(&self.shared, rows, folder.query_status)))
    }
}

struct FixtureMessage {
    shared: Rc<Shared>,
    at: (usize, usize, usize),
    _tracked: Tracked,
}

impl PropertySource for FixtureMessage {
    fn get_one_prop(&self, tag: PropTag) -> HResult<MapiBuffer<PropValue>> {
        let (s, f, m) = self.at;
        let message = &self.shared.profile.stores[s].folders[f].messages[m];
        let value = if tag == PR_ENTRYID {
            PropValue::Binary(EntryRef::Message(s, f, m).to_entry_id().as_bytes().to_vec())
        } else if tag == PR_SUBJECT_W {
            PropValue::unicode(message.subject.as_deref().ok_or(Status::MAPI_E_NOT_FOUND)?)
        } else {
            return Err(Status::MAPI_E_NOT_FOUND);
        };
        Ok(MapiBuffer::new(value, self.shared.ledger.free_hook(HandleKind::Buffer)))
    }
}

impl MapiMessage for FixtureMessage {}

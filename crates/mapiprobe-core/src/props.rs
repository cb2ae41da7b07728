use serde::{Deserialize, Serialize};

use crate::status::Status;

pub const PT_BOOLEAN: u16 = 0x000B;
pub const PT_ERROR: u16 = 0x000A;
pub const PT_UNICODE: u16 = 0x001F;
pub const PT_BINARY: u16 = 0x0102;

/// Property tag: identifier in the high word, value type in the low word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropTag(pub u32);

impl PropTag {
    pub const fn new(id: u16, prop_type: u16) -> Self {
        PropTag(((id as u32) << 16) | prop_type as u32)
    }

    pub const fn id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn prop_type(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// The tag a table reports for a column it could not fill in a row.
    pub const fn as_error(self) -> Self {
        PropTag::new(self.id(), PT_ERROR)
    }
}

pub const PR_SUBJECT_W: PropTag = PropTag::new(0x0037, PT_UNICODE);
pub const PR_ENTRYID: PropTag = PropTag::new(0x0FFF, PT_BINARY);
pub const PR_DISPLAY_NAME_W: PropTag = PropTag::new(0x3001, PT_UNICODE);
pub const PR_EMAIL_ADDRESS_W: PropTag = PropTag::new(0x3003, PT_UNICODE);
pub const PR_DEFAULT_STORE: PropTag = PropTag::new(0x3400, PT_BOOLEAN);

/// Opaque, store-scoped identifier of a folder or message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Vec<u8>);

impl EntryId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        EntryId(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Binary(Vec<u8>),
    /// UTF-16 text as the subsystem hands it out, possibly NUL-terminated.
    Unicode(Vec<u16>),
    Boolean(bool),
    Error(Status),
}

impl PropValue {
    pub fn unicode(text: &str) -> Self {
        PropValue::Unicode(text.encode_utf16().collect())
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            PropValue::Unicode(wide) => Some(wide_to_utf8(wide)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            PropValue::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Decodes subsystem UTF-16 text for logging. Stops at the first NUL;
/// unpaired surrogates become U+FFFD.
pub fn wide_to_utf8(wide: &[u16]) -> String {
    let end = wide.iter().position(|&unit| unit == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    pub tag: PropTag,
    pub value: PropValue,
}

impl PropertyValue {
    pub fn new(tag: PropTag, value: PropValue) -> Self {
        Self { tag, value }
    }

    pub fn missing(tag: PropTag, status: Status) -> Self {
        Self {
            tag: tag.as_error(),
            value: PropValue::Error(status),
        }
    }
}

/// One row of a bulk query, in the order of the requested columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropRow(pub Vec<PropertyValue>);

impl PropRow {
    pub fn get(&self, index: usize) -> Option<&PropertyValue> {
        self.0.get(index)
    }

    /// Value at `index` only if the table returned it under `expected`.
    pub fn value_if(&self, index: usize, expected: PropTag) -> Option<&PropValue> {
        self.get(index)
            .filter(|prop| prop.tag == expected)
            .map(|prop| &prop.value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_to_utf8_stops_at_nul() {
        let mut wide: Vec<u16> = "Inbox".encode_utf16().collect();
        wide.push(0);
        wide.extend("garbage".encode_utf16());
        assert_eq!(wide_to_utf8(&wide), "Inbox");
    }

    #[test]
    fn wide_to_utf8_handles_non_ascii_and_bad_surrogates() {
        let wide: Vec<u16> = "Boîte de réception ✉".encode_utf16().collect();
        assert_eq!(wide_to_utf8(&wide), "Boîte de réception ✉");
        assert_eq!(wide_to_utf8(&[0x0041, 0xD800, 0x0042]), "A\u{FFFD}B");
        assert_eq!(wide_to_utf8(&[]), "");
    }

    #[test]
    fn error_tag_keeps_property_id() {
        assert_eq!(PR_SUBJECT_W.0, 0x0037_001F);
        assert_eq!(PR_SUBJECT_W.as_error().0, 0x0037_000A);
        assert_eq!(PR_ENTRYID.prop_type(), PT_BINARY);
        assert_eq!(PR_DEFAULT_STORE.id(), 0x3400);
    }

    #[test]
    fn value_if_rejects_error_columns() {
        let row = PropRow(vec![
            PropertyValue::missing(PR_SUBJECT_W, Status::MAPI_E_NOT_FOUND),
            PropertyValue::new(PR_ENTRYID, PropValue::Binary(vec![1, 2])),
        ]);
        assert!(row.value_if(0, PR_SUBJECT_W).is_none());
        assert_eq!(
            row.value_if(1, PR_ENTRYID).and_then(PropValue::as_binary),
            Some(&[1u8, 2][..])
        );
        assert!(row.value_if(2, PR_ENTRYID).is_none());
    }
}

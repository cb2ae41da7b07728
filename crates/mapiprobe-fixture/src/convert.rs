use std::io::Write;
use std::rc::Rc;

use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Mailbox, Message, SinglePart};
use mapiprobe_core::{
    ConvertFlags, EntryId, HResult, MapiMessage, MapiStream, MimeConverter, MimeEncoding,
    PR_ENTRYID, SaveFormat, Status,
};

use crate::ledger::Tracked;
use crate::profile::{MessageFixture, StoreFixture};
use crate::{EntryRef, Shared, fault};

/// Stand-in for the external MAPI-to-MIME converter. The message body and
/// headers come from the profile; `lettre` does the actual serialisation.
pub(crate) struct FixtureConverter {
    shared: Rc<Shared>,
    encoding: Option<MimeEncoding>,
    format: Option<SaveFormat>,
    _tracked: Tracked,
}

impl FixtureConverter {
    pub(crate) fn new(shared: Rc<Shared>, tracked: Tracked) -> Self {
        Self {
            shared,
            encoding: None,
            format: None,
            _tracked: tracked,
        }
    }

    fn locate(&self, message: &dyn MapiMessage) -> HResult<(&StoreFixture, &MessageFixture)> {
        let entry_id = message.get_one_prop(PR_ENTRYID)?;
        let entry_id = entry_id
            .as_binary()
            .map(|bytes| EntryId::new(bytes.to_vec()))
            .ok_or(Status::MAPI_E_INVALID_OBJECT)?;
        let Some(EntryRef::Message(s, f, m)) = EntryRef::parse(&entry_id) else {
            return Err(Status::MAPI_E_INVALID_OBJECT);
        };
        let store = self
            .shared
            .profile
            .stores
            .get(s)
            .ok_or(Status::MAPI_E_NOT_FOUND)?;
        let message = store
            .folders
            .get(f)
            .and_then(|folder| folder.messages.get(m))
            .ok_or(Status::MAPI_E_NOT_FOUND)?;
        Ok((store, message))
    }
}

impl MimeConverter for FixtureConverter {
    fn set_encoding(&mut self, encoding: MimeEncoding) -> HResult<()> {
        fault(self.shared.profile.faults.set_encoding)?;
        self.encoding = Some(encoding);
        Ok(())
    }

    fn set_save_format(&mut self, format: SaveFormat) -> HResult<()> {
        fault(self.shared.profile.faults.set_save_format)?;
        self.format = Some(format);
        Ok(())
    }

    fn convert_to_stream(
        &mut self,
        message: &dyn MapiMessage,
        stream: &mut dyn MapiStream,
        flags: ConvertFlags,
    ) -> HResult<()> {
        if !flags.contains(ConvertFlags::SMTP) {
            return Err(Status::MAPI_E_NO_SUPPORT);
        }
        let format = self.format.ok_or(Status::E_INVALIDARG)?;
        let encoding = self.encoding.unwrap_or(MimeEncoding::SevenBit);
        let (store, fixture) = self.locate(message)?;
        fault(fixture.convert_status)?;
        let bytes = render_message(store, fixture, encoding, format)?;
        stream
            .write_all(&bytes)
            .map_err(|_| Status::MAPI_E_CALL_FAILED)?;
        self.shared.ledger.record_conversion();
        Ok(())
    }
}

fn render_message(
    store: &StoreFixture,
    fixture: &MessageFixture,
    encoding: MimeEncoding,
    format: SaveFormat,
) -> HResult<Vec<u8>> {
    let from: Mailbox = fixture.from.parse().map_err(|_| Status::E_INVALIDARG)?;
    let mut builder = Message::builder().from(from);
    if let Some(subject) = &fixture.subject {
        builder = builder.subject(subject.as_str());
    }
    let recipients: Vec<&str> = if fixture.to.is_empty() {
        vec![store.email.as_deref().unwrap_or("postmaster@localhost")]
    } else {
        fixture.to.iter().map(String::as_str).collect()
    };
    for recipient in recipients {
        let to: Mailbox = recipient.parse().map_err(|_| Status::E_INVALIDARG)?;
        builder = builder.to(to);
    }
    let email = match format {
        SaveFormat::Rfc1521 => {
            let transfer = match encoding {
                MimeEncoding::SevenBit => ContentTransferEncoding::SevenBit,
                MimeEncoding::EightBit => ContentTransferEncoding::EightBit,
                MimeEncoding::QuotedPrintable => ContentTransferEncoding::QuotedPrintable,
                MimeEncoding::Base64 => ContentTransferEncoding::Base64,
            };
            let part = SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .header(transfer)
                .body(fixture.body.clone());
            builder.singlepart(part)
        }
        SaveFormat::Rfc822 => builder.body(fixture.body.clone()),
    };
    let email = email.map_err(|_| Status::MAPI_E_CALL_FAILED)?;
    Ok(email.formatted())
}

/// Growable in-memory stream.
pub(crate) struct FixtureStream {
    data: Vec<u8>,
    _tracked: Tracked,
}

impl FixtureStream {
    pub(crate) fn new(tracked: Tracked) -> Self {
        Self {
            data: Vec::new(),
            _tracked: tracked,
        }
    }
}

impl Write for FixtureStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl MapiStream for FixtureStream {
    fn contents(&self) -> &[u8] {
        &self.data
    }
}

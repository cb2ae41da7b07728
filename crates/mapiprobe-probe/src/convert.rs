use mapiprobe_core::{ConvertFlags, LogEntry, MapiError, MapiMessage, MimeEncoding, SaveFormat};

use crate::{ProbeContext, log_failure};

/// Converts one message to RFC 1521 MIME with quoted-printable bodies.
///
/// A fresh converter and stream are created per call and released before
/// returning. Nothing is returned unless every step succeeds.
pub fn convert_message(
    ctx: &ProbeContext<'_>,
    message: &dyn MapiMessage,
) -> Result<Vec<u8>, MapiError> {
    let log = ctx.log;
    let mut converter = ctx.provider.create_converter().map_err(log_failure(
        log,
        "CreateConverter",
        "Failed to create converter session: ",
    ))?;
    converter
        .set_encoding(MimeEncoding::QuotedPrintable)
        .map_err(log_failure(log, "SetEncoding", "Failed on SetEncoding: "))?;
    converter
        .set_save_format(SaveFormat::Rfc1521)
        .map_err(log_failure(log, "SetSaveFormat", "Failed on SetSaveFormat: "))?;

    let mut stream = ctx
        .provider
        .create_stream()
        .map_err(log_failure(log, "CreateStream", "Failed to create stream: "))?;
    converter
        .convert_to_stream(message, &mut *stream, ConvertFlags::SMTP)
        .map_err(log_failure(log, "MAPIToMIMEStm", "Failed on MAPIToMIMEStm: "))?;

    let mime = stream.contents().to_vec();
    log.write(
        LogEntry::info("Converted message to MIME: ").detail(format!("{} bytes", mime.len())),
    );
    Ok(mime)
}

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code returned by every call into the messaging subsystem.
///
/// Zero is success, negative values are failures. The numeric value is what
/// ends up in log lines and in the process exit code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(i32);

pub type HResult<T> = std::result::Result<T, Status>;

const fn hr(code: u32) -> Status {
    Status(code as i32)
}

impl Status {
    pub const S_OK: Status = Status(0);
    pub const E_INVALIDARG: Status = hr(0x8007_0057);
    pub const MAPI_E_CALL_FAILED: Status = hr(0x8000_4005);
    pub const MAPI_E_NO_ACCESS: Status = hr(0x8007_0005);
    pub const MAPI_E_NO_SUPPORT: Status = hr(0x8004_0102);
    pub const MAPI_E_INVALID_ENTRYID: Status = hr(0x8004_0107);
    pub const MAPI_E_INVALID_OBJECT: Status = hr(0x8004_0108);
    pub const MAPI_E_NOT_FOUND: Status = hr(0x8004_010F);
    pub const MAPI_E_LOGON_FAILED: Status = hr(0x8004_0111);
    pub const MAPI_E_NETWORK_ERROR: Status = hr(0x8004_0115);
    pub const MAPI_E_NOT_INITIALIZED: Status = hr(0x8004_0605);

    pub const fn new(code: i32) -> Self {
        Status(code)
    }

    /// Accepts the wider integers found in config files, where
    /// `0x8004010F` arrives as a positive 64-bit value. `None` when the
    /// value fits neither `i32` nor `u32`.
    pub fn try_from_wide(code: i64) -> Option<Self> {
        match i32::try_from(code) {
            Ok(code) => Some(Status(code)),
            Err(_) => u32::try_from(code).ok().map(|code| Status(code as i32)),
        }
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn failed(self) -> bool {
        self.0 < 0
    }

    pub const fn succeeded(self) -> bool {
        !self.failed()
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Status::S_OK => "S_OK",
            Status::E_INVALIDARG => "E_INVALIDARG",
            Status::MAPI_E_CALL_FAILED => "MAPI_E_CALL_FAILED",
            Status::MAPI_E_NO_ACCESS => "MAPI_E_NO_ACCESS",
            Status::MAPI_E_NO_SUPPORT => "MAPI_E_NO_SUPPORT",
            Status::MAPI_E_INVALID_ENTRYID => "MAPI_E_INVALID_ENTRYID",
            Status::MAPI_E_INVALID_OBJECT => "MAPI_E_INVALID_OBJECT",
            Status::MAPI_E_NOT_FOUND => "MAPI_E_NOT_FOUND",
            Status::MAPI_E_LOGON_FAILED => "MAPI_E_LOGON_FAILED",
            Status::MAPI_E_NETWORK_ERROR => "MAPI_E_NETWORK_ERROR",
            Status::MAPI_E_NOT_INITIALIZED => "MAPI_E_NOT_INITIALIZED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)?;
        if let Some(name) = self.name() {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

/// A failed boundary call together with the operation that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("{op} failed: {status}")]
pub struct MapiError {
    pub op: &'static str,
    pub status: Status,
}

impl MapiError {
    pub fn new(op: &'static str, status: Status) -> Self {
        Self { op, status }
    }
}

#[cfg(test)]
mod tests {
    use super::{MapiError, Status};

    #[test]
    fn wide_codes_wrap_into_negative_status() {
        let status = Status::try_from_wide(0x8004_010F);
        assert_eq!(status, Some(Status::MAPI_E_NOT_FOUND));
        assert_eq!(Status::try_from_wide(-2147221233), Some(Status::MAPI_E_NOT_FOUND));
        assert_eq!(Status::try_from_wide(0), Some(Status::S_OK));
    }

    #[test]
    fn codes_wider_than_32_bits_are_rejected() {
        assert_eq!(Status::try_from_wide(0x1_0000_0000), None);
        assert_eq!(Status::try_from_wide(0x1_8004_010F), None);
        assert_eq!(Status::try_from_wide(i64::from(i32::MIN) - 1), None);
    }

    #[test]
    fn display_names_known_codes() {
        assert_eq!(
            Status::MAPI_E_LOGON_FAILED.to_string(),
            "0x80040111 (MAPI_E_LOGON_FAILED)"
        );
        assert_eq!(Status::new(-1).to_string(), "0xFFFFFFFF");
        let err = MapiError::new("OpenMsgStore", Status::MAPI_E_NO_ACCESS);
        assert_eq!(
            err.to_string(),
            "OpenMsgStore failed: 0x80070005 (MAPI_E_NO_ACCESS)"
        );
    }
}

//! TOML description of the mail profile the fixture provider serves.
//!
//! Every `*_status` field injects a failure: when set, the matching call
//! returns that status instead of succeeding. Values may be written in hex
//! (`open_status = 0x80040111`).

use std::path::Path;

use anyhow::{Context, Result, bail};
use mapiprobe_core::Status;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub faults: SessionFaults,
    pub stores: Vec<StoreFixture>,
}

/// Failures that are not tied to a particular store, folder or message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFaults {
    pub initialize: Option<i64>,
    pub logon: Option<i64>,
    pub logoff: Option<i64>,
    pub stores_table: Option<i64>,
    pub stores_query: Option<i64>,
    pub create_converter: Option<i64>,
    pub set_encoding: Option<i64>,
    pub set_save_format: Option<i64>,
    pub create_stream: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreFixture {
    pub display_name: String,
    pub email: Option<String>,
    pub default: bool,
    pub root_name: String,
    /// Name of the folder reported as the default receive folder.
    pub receive_folder: String,
    pub open_status: Option<i64>,
    pub root_status: Option<i64>,
    pub receive_folder_status: Option<i64>,
    pub folders: Vec<FolderFixture>,
}

impl Default for StoreFixture {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            email: None,
            default: false,
            root_name: "Top of Information Store".to_string(),
            receive_folder: "Inbox".to_string(),
            open_status: None,
            root_status: None,
            receive_folder_status: None,
            folders: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderFixture {
    pub name: String,
    pub open_status: Option<i64>,
    pub name_status: Option<i64>,
    pub contents_status: Option<i64>,
    pub query_status: Option<i64>,
    pub messages: Vec<MessageFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageFixture {
    pub subject: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub body: String,
    pub open_status: Option<i64>,
    pub convert_status: Option<i64>,
}

impl Default for MessageFixture {
    fn default() -> Self {
        Self {
            subject: None,
            from: "sender@example.com".to_string(),
            to: Vec::new(),
            body: String::new(),
            open_status: None,
            convert_status: None,
        }
    }
}

impl Profile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(text).context("invalid mail profile")?;
        profile.validate().context("invalid mail profile")?;
        Ok(profile)
    }

    /// Every injected status must be a 32-bit failure code.
    pub fn validate(&self) -> Result<()> {
        for (field, code) in self.fault_codes() {
            match Status::try_from_wide(code) {
                Some(status) if status.failed() => {}
                Some(status) => bail!("{} = {} is not a failure status", field, status.code()),
                None => bail!("{} = {:#X} does not fit in 32 bits", field, code),
            }
        }
        Ok(())
    }

    fn fault_codes(&self) -> Vec<(String, i64)> {
        let f = &self.faults;
        let mut codes: Vec<(String, Option<i64>)> = [
            ("initialize", f.initialize),
            ("logon", f.logon),
            ("logoff", f.logoff),
            ("stores_table", f.stores_table),
            ("stores_query", f.stores_query),
            ("create_converter", f.create_converter),
            ("set_encoding", f.set_encoding),
            ("set_save_format", f.set_save_format),
            ("create_stream", f.create_stream),
        ]
        .into_iter()
        .map(|(name, code)| (format!("faults.{}", name), code))
        .collect();
        for (s, store) in self.stores.iter().enumerate() {
            let at = format!("stores[{}]", s);
            codes.push((format!("{}.open_status", at), store.open_status));
            codes.push((format!("{}.root_status", at), store.root_status));
            codes.push((format!("{}.receive_folder_status", at), store.receive_folder_status));
            for (f, folder) in store.folders.iter().enumerate() {
                let at = format!("{}.folders[{}]", at, f);
                codes.push((format!("{}.open_status", at), folder.open_status));
                codes.push((format!("{}.name_status", at), folder.name_status));
                codes.push((format!("{}.contents_status", at), folder.contents_status));
                codes.push((format!("{}.query_status", at), folder.query_status));
                for (m, message) in folder.messages.iter().enumerate() {
                    let at = format!("{}.messages[{}]", at, m);
                    codes.push((format!("{}.open_status", at), message.open_status));
                    codes.push((format!("{}.convert_status", at), message.convert_status));
                }
            }
        }
        codes
            .into_iter()
            .filter_map(|(field, code)| code.map(|code| (field, code)))
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading mail profile {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn store(mut self, store: StoreFixture) -> Self {
        self.stores.push(store);
        self
    }

    /// Profile used when nothing else is configured.
    pub fn demo() -> Self {
        Profile::new("Demo")
            .store(StoreFixture::new("Public Folders"))
            .store(
                StoreFixture::new("Mailbox - Probe User")
                    .email("probe.user@example.com")
                    .default_store()
                    .folder(
                        FolderFixture::new("Inbox")
                            .message(
                                MessageFixture::new("Welcome to your mailbox")
                                    .sender("postmaster@example.com")
                                    .body("Your mailbox is ready.\r\n"),
                            )
                            .message(
                                MessageFixture::new("Quarterly numbers")
                                    .sender("finance@example.com")
                                    .body("Revenue = 42, costs = 17.\r\n"),
                            )
                            .message(MessageFixture::without_subject().sender("noreply@example.com")),
                    )
                    .folder(FolderFixture::new("Sent Items")),
            )
            .store(StoreFixture::new("Archive").email("archive@example.com"))
    }
}

impl StoreFixture {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            ..Self::default()
        }
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn default_store(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn folder(mut self, folder: FolderFixture) -> Self {
        self.folders.push(folder);
        self
    }

    pub fn receive_folder(mut self, name: &str) -> Self {
        self.receive_folder = name.to_string();
        self
    }
}

impl FolderFixture {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn message(mut self, message: MessageFixture) -> Self {
        self.messages.push(message);
        self
    }
}

impl MessageFixture {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: Some(subject.to_string()),
            ..Self::default()
        }
    }

    pub fn without_subject() -> Self {
        Self::default()
    }

    pub fn sender(mut self, from: &str) -> Self {
        self.from = from.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

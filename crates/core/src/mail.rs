//! Mailboxes and the messages they hold.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::key::digest_decimal;
use crate::dht::Key;
use crate::error::Error;
use crate::error::Result;

/// A single mail message.
///
/// The `read` flag never leaves the client that set it: it is skipped by
/// serde, so it is neither transmitted on the wire nor written to dump
/// files.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Message {
    /// Recipient address.
    pub to: String,
    /// Sender address.
    pub from: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// Seconds since the Unix epoch, stamped by the sender.
    pub date: i64,
    /// Whether the local client has opened the message.
    #[serde(skip)]
    pub read: bool,
}

impl Message {
    /// Build a message stamped with the current time.
    pub fn new(
        to: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::with_date(to, from, subject, body, chrono::Utc::now().timestamp())
    }

    /// Build a message with an explicit date.
    pub fn with_date(
        to: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        date: i64,
    ) -> Self {
        Message {
            to: to.into(),
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
            date,
            read: false,
        }
    }

    /// Field-wise comparison ignoring the local `read` flag.
    pub fn same_as(&self, other: &Message) -> bool {
        self.to == other.to
            && self.from == other.from
            && self.subject == other.subject
            && self.body == other.body
            && self.date == other.date
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let sent = chrono::DateTime::from_timestamp(self.date, 0)
            .map(|d| d.to_rfc2822())
            .unwrap_or_else(|| self.date.to_string());
        writeln!(f, "From: {}", self.from)?;
        writeln!(f, "To: {}", self.to)?;
        writeln!(f, "Sent: {sent}")?;
        writeln!(f, "Subject: {}", self.subject)
    }
}

/// An owner's mailbox: credentials plus the ordered message log.
///
/// Messages keep arrival order; sends append and deletes shift the tail
/// left.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Mailbox {
    owner: String,
    password: i64,
    messages: Vec<Message>,
}

impl Mailbox {
    /// Build an empty mailbox, hashing the cleartext password.
    pub fn new(owner: impl Into<String>, password: &str) -> Self {
        Self::with_hash(owner, Self::hash_password(password))
    }

    /// Build an empty mailbox from an already-hashed password, as received
    /// on the wire.
    pub fn with_hash(owner: impl Into<String>, password: i64) -> Self {
        Mailbox {
            owner: owner.into(),
            password,
            messages: Vec::new(),
        }
    }

    /// Hash a cleartext password into the 64-bit form kept on nodes and
    /// sent on the wire. Same digest as node ids, without the key-space
    /// reduction.
    pub fn hash_password(password: &str) -> i64 {
        digest_decimal(password)
    }

    /// Owner address.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Stored password hash.
    pub fn password(&self) -> i64 {
        self.password
    }

    /// The message log, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The `i`-th message, if any.
    pub fn message(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the mailbox holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message to the log.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a batch of messages, preserving their order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Replace the whole log, as `Receive` does on a client.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Remove the `i`-th message; later messages shift left. Returns the
    /// removed message, or `None` when the index is out of range.
    pub fn remove(&mut self, index: usize) -> Option<Message> {
        if index < self.messages.len() {
            Some(self.messages.remove(index))
        } else {
            None
        }
    }

    /// Drop all messages, keeping owner and password.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Write the mailbox to a JSON archive.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(Error::Serialize)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a mailbox back from a JSON archive.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(Error::Deserialize)
    }
}

/// Encode a node's owned mailboxes into the dump-file format.
pub fn encode_boxes(boxes: &BTreeMap<Key, Mailbox>) -> Result<Vec<u8>> {
    bincode::serialize(boxes).map_err(Error::BincodeSerialize)
}

/// Decode a dump file back into a mailbox map.
pub fn decode_boxes(bytes: &[u8]) -> Result<BTreeMap<Key, Mailbox>> {
    bincode::deserialize(bytes).map_err(Error::BincodeDeserialize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_pinned() {
        assert_eq!(Mailbox::hash_password("test_psw"), 2_051_751_104_143);
        assert_eq!(Mailbox::hash_password("pw"), 261_249_816_659);
    }

    #[test]
    fn push_keeps_order() {
        let mut bx = Mailbox::new("a@test.com", "pw");
        for i in 0..5 {
            bx.push(Message::new("a@test.com", "b@test.com", format!("s{i}"), ""));
        }
        assert_eq!(bx.len(), 5);
        for (i, msg) in bx.messages().iter().enumerate() {
            assert_eq!(msg.subject, format!("s{i}"));
        }
    }

    #[test]
    fn remove_shifts_left() {
        let mut bx = Mailbox::new("a@test.com", "pw");
        for i in 0..4 {
            bx.push(Message::new("a@test.com", "b@test.com", format!("s{i}"), ""));
        }
        let removed = bx.remove(1).unwrap();
        assert_eq!(removed.subject, "s1");
        let subjects: Vec<_> = bx.messages().iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, ["s0", "s2", "s3"]);
        assert!(bx.remove(3).is_none());
    }

    #[test]
    fn read_flag_stays_local() {
        let mut msg = Message::new("a@test.com", "b@test.com", "hi", "body");
        msg.read = true;
        let bytes = bincode::serialize(&msg).unwrap();
        let back: Message = bincode::deserialize(&bytes).unwrap();
        assert!(!back.read);
        assert!(back.same_as(&msg));
    }

    #[test]
    fn dump_format_round_trip() {
        let mut boxes = BTreeMap::new();
        let mut bx = Mailbox::new("a@test.com", "pw");
        bx.push(Message::new("a@test.com", "b@test.com", "s", "b"));
        boxes.insert(Key::hash("a@test.com"), bx);
        boxes.insert(Key::hash("c@test.com"), Mailbox::new("c@test.com", "pw2"));

        let bytes = encode_boxes(&boxes).unwrap();
        let back = decode_boxes(&bytes).unwrap();
        assert_eq!(back.len(), 2);
        let recovered = &back[&Key::hash("a@test.com")];
        assert_eq!(recovered.owner(), "a@test.com");
        assert_eq!(recovered.len(), 1);
    }

    #[test]
    fn json_archive_round_trip() {
        let dir = std::env::temp_dir().join("mailring-mail-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("box.json");

        let mut bx = Mailbox::new("a@test.com", "pw");
        bx.push(Message::new("a@test.com", "b@test.com", "hello", "world"));
        bx.save(&path).unwrap();

        let loaded = Mailbox::load(&path).unwrap();
        assert_eq!(loaded.owner(), "a@test.com");
        assert_eq!(loaded.password(), bx.password());
        assert_eq!(loaded.len(), 1);
        assert!(loaded.message(0).unwrap().same_as(bx.message(0).unwrap()));

        std::fs::remove_file(path).ok();
    }
}

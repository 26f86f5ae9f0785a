//! Wire protocol of the node service.
//!
//! Every exchange is one request frame answered by one reply frame; frames
//! are bincode-encoded by the transport in `mailring-node`. Routed requests
//! carry a TTL that starts at [crate::consts::CHORD_MOD] and is decremented
//! on every forward; a hop that would decrement past zero answers
//! [StatusCode::NotFound] instead of forwarding.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Key;
use crate::dht::PeerInfo;
use crate::mail::Message;

/// Failure kinds carried by [Reply::Failure].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// TTL exhausted during routing, or the mailbox does not exist on the
    /// node expected to own it.
    NotFound,
    /// Password hash mismatch, or the sender is not the authenticated user.
    Unauthenticated,
    /// Duplicate owner on registration.
    AlreadyExists,
    /// Delete index outside the mailbox bounds.
    OutOfRange,
    /// The peer is shutting down and refuses transfers.
    Unavailable,
    /// Inconsistency observed inside a transfer batch.
    Internal,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// A non-ok outcome: a status code plus the peer's message.
///
/// Faults from forwarded hops propagate back to the original caller
/// verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Failure kind.
    pub code: StatusCode,
    /// Human-readable detail from the answering peer.
    pub message: String,
}

impl Fault {
    /// Build a fault.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Fault {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for [StatusCode::NotFound].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    /// Shorthand for [StatusCode::Unauthenticated].
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthenticated, message)
    }

    /// Shorthand for [StatusCode::AlreadyExists].
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(StatusCode::AlreadyExists, message)
    }

    /// Shorthand for [StatusCode::OutOfRange].
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OutOfRange, message)
    }

    /// Shorthand for [StatusCode::Unavailable].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    /// Shorthand for [StatusCode::Internal].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

/// Mailbox credentials presented by clients and carried in transfers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Owner address.
    pub user: String,
    /// 64-bit password hash.
    pub password: i64,
}

/// Reachability probe.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingRequest {
    /// Caller-chosen integer, echoed back.
    pub n: i64,
}

/// Echo of a [PingRequest] with the answering node's coordinates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingReply {
    /// Answering node's address.
    pub address: String,
    /// Answering node's port.
    pub port: u16,
    /// Answering node's id.
    pub id: Key,
    /// The echoed integer.
    pub n: i64,
}

/// A node announcing itself to the ring.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Id of the joining node.
    pub node_id: Key,
}

/// A finger-table rebuild probe.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FingerQuestion {
    /// Id of the rebuilding node; answers loop back to it.
    pub sender_id: Key,
    /// The ring position the finger must cover.
    pub finger_value: Key,
}

/// Mailbox registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InsertMailboxRequest {
    /// Owner address; its hash decides the owning node.
    pub owner: String,
    /// 64-bit password hash.
    pub password: i64,
    /// Remaining hops.
    pub ttl: i32,
}

/// Mailbox location query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupRequest {
    /// Owner address to locate.
    pub owner: String,
    /// Remaining hops.
    pub ttl: i32,
}

/// Mail delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendRequest {
    /// Sender credentials; must match `msg.from`.
    pub auth: Credentials,
    /// The message to append to the recipient's log.
    pub msg: Message,
    /// Remaining hops.
    pub ttl: i32,
}

/// Mail deletion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Owner credentials; the owner's own mailbox is targeted.
    pub auth: Credentials,
    /// 0-based index into the ordered log.
    pub idx: i32,
    /// Remaining hops.
    pub ttl: i32,
}

/// One mailbox on the wire: credentials plus the ordered log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailboxPayload {
    /// Owner credentials.
    pub auth: Credentials,
    /// Messages, oldest first.
    pub messages: Vec<Message>,
}

/// A batch of mailboxes migrating to their new owner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    /// The migrating mailboxes.
    pub boxes: Vec<MailboxPayload>,
}

/// The request side of the node service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    /// Reachability probe.
    Ping(PingRequest),
    /// Find the successor of a joining node.
    NodeJoin(JoinRequest),
    /// "I believe I am your predecessor."
    Stabilize(PeerInfo),
    /// Finger-table rebuild probe.
    SearchFinger(FingerQuestion),
    /// Register a mailbox at the owner of its key.
    InsertMailbox(InsertMailboxRequest),
    /// Locate the node storing a mailbox.
    LookupMailbox(LookupRequest),
    /// Verify credentials on the owning node.
    Authenticate(Credentials),
    /// Deliver a message to its recipient's mailbox.
    Send(SendRequest),
    /// Delete a message from the caller's own mailbox.
    Delete(DeleteRequest),
    /// Fetch the full message log; not forwarded.
    Receive(Credentials),
    /// Accept a batch of migrating mailboxes.
    Transfer(TransferRequest),
}

/// The reply side of the node service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Reply {
    /// Ping echo.
    Pong(PingReply),
    /// A located node.
    Peer(PeerInfo),
    /// The answering node's predecessor; `None` before the first
    /// stabilization reaches it.
    Predecessor(Option<PeerInfo>),
    /// Success without payload.
    Done,
    /// A full mailbox, answering `Receive`.
    Mailbox(MailboxPayload),
    /// Any non-ok outcome.
    Failure(Fault),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_carries_code_and_message() {
        let fault = Fault::already_exists("user already registered");
        assert_eq!(fault.to_string(), "ALREADY_EXISTS: user already registered");
        assert_eq!(Fault::not_found("x").code, StatusCode::NotFound);
    }

    #[test]
    fn requests_survive_the_wire_encoding() {
        let req = Request::Send(SendRequest {
            auth: Credentials {
                user: "a@test.com".into(),
                password: 7,
            },
            msg: Message::with_date("b@test.com", "a@test.com", "hi", "body", 1_700_000_000),
            ttl: 34,
        });
        let bytes = bincode::serialize(&req).unwrap();
        match bincode::deserialize::<Request>(&bytes).unwrap() {
            Request::Send(back) => {
                assert_eq!(back.auth.user, "a@test.com");
                assert_eq!(back.ttl, 34);
                assert_eq!(back.msg.date, 1_700_000_000);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}

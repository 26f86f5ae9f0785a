//! Outbound side of the node service: framing and typed call wrappers.
//!
//! Every call opens a fresh connection, writes one request frame and reads
//! one reply frame. Frames are a big-endian u32 length followed by the
//! bincode encoding of the message. Unreachable peers surface as
//! [Error::Connect] or [Error::Timeout]; a peer that answers with
//! [Reply::Failure] surfaces as [Error::Fault] from the typed wrappers.

use std::time::Duration;

use mailring_core::dht::Key;
use mailring_core::dht::PeerInfo;
use mailring_core::proto::Credentials;
use mailring_core::proto::DeleteRequest;
use mailring_core::proto::FingerQuestion;
use mailring_core::proto::InsertMailboxRequest;
use mailring_core::proto::JoinRequest;
use mailring_core::proto::LookupRequest;
use mailring_core::proto::MailboxPayload;
use mailring_core::proto::PingReply;
use mailring_core::proto::PingRequest;
use mailring_core::proto::Reply;
use mailring_core::proto::Request;
use mailring_core::proto::SendRequest;
use mailring_core::proto::TransferRequest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::Error;
use crate::error::Result;

/// Transfer batches dominate frame sizes; anything above this is a protocol
/// violation.
pub(crate) const MAX_FRAME: usize = 16 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Perform one request/reply exchange with the node at `addr`.
pub async fn call(addr: &str, request: &Request) -> Result<Reply> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(addr.to_string()))?
        .map_err(|e| Error::Connect(addr.to_string(), e))?;
    timeout(EXCHANGE_TIMEOUT, exchange(stream, request))
        .await
        .map_err(|_| Error::Timeout(addr.to_string()))?
}

async fn exchange(mut stream: TcpStream, request: &Request) -> Result<Reply> {
    write_frame(&mut stream, request).await?;
    read_frame(&mut stream).await
}

pub(crate) async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = bincode::serialize(value).map_err(Error::Encode)?;
    if bytes.len() > MAX_FRAME {
        return Err(Error::FrameTooLarge(bytes.len(), MAX_FRAME));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub(crate) async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME {
        return Err(Error::FrameTooLarge(len, MAX_FRAME));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    bincode::deserialize(&buf).map_err(Error::Decode)
}

fn expect_peer(addr: &str, reply: Reply) -> Result<PeerInfo> {
    match reply {
        Reply::Peer(peer) => Ok(peer),
        Reply::Failure(fault) => Err(fault.into()),
        _ => Err(Error::UnexpectedReply(addr.to_string())),
    }
}

fn expect_done(addr: &str, reply: Reply) -> Result<()> {
    match reply {
        Reply::Done => Ok(()),
        Reply::Failure(fault) => Err(fault.into()),
        _ => Err(Error::UnexpectedReply(addr.to_string())),
    }
}

/// Probe a node, expecting `n` echoed back.
pub async fn ping(addr: &str, n: i64) -> Result<PingReply> {
    match call(addr, &Request::Ping(PingRequest { n })).await? {
        Reply::Pong(reply) => Ok(reply),
        Reply::Failure(fault) => Err(fault.into()),
        _ => Err(Error::UnexpectedReply(addr.to_string())),
    }
}

/// Ask the ring for the successor of a joining node.
pub async fn node_join(addr: &str, node_id: Key) -> Result<PeerInfo> {
    let reply = call(addr, &Request::NodeJoin(JoinRequest { node_id })).await?;
    expect_peer(addr, reply)
}

/// Assert to `addr` that `claimant` is its predecessor; returns the
/// receiver's (possibly just-updated) predecessor.
pub async fn stabilize(addr: &str, claimant: &PeerInfo) -> Result<Option<PeerInfo>> {
    match call(addr, &Request::Stabilize(claimant.clone())).await? {
        Reply::Predecessor(predecessor) => Ok(predecessor),
        Reply::Failure(fault) => Err(fault.into()),
        _ => Err(Error::UnexpectedReply(addr.to_string())),
    }
}

/// Ask for the node covering `finger_value` during a table rebuild.
pub async fn search_finger(addr: &str, sender_id: Key, finger_value: Key) -> Result<PeerInfo> {
    let question = FingerQuestion {
        sender_id,
        finger_value,
    };
    let reply = call(addr, &Request::SearchFinger(question)).await?;
    expect_peer(addr, reply)
}

/// Register a mailbox; returns the node that now owns it.
pub async fn insert_mailbox(addr: &str, owner: &str, password: i64, ttl: i32) -> Result<PeerInfo> {
    let request = InsertMailboxRequest {
        owner: owner.to_string(),
        password,
        ttl,
    };
    let reply = call(addr, &Request::InsertMailbox(request)).await?;
    expect_peer(addr, reply)
}

/// Locate the node storing `owner`'s mailbox.
pub async fn lookup_mailbox(addr: &str, owner: &str, ttl: i32) -> Result<PeerInfo> {
    let request = LookupRequest {
        owner: owner.to_string(),
        ttl,
    };
    let reply = call(addr, &Request::LookupMailbox(request)).await?;
    expect_peer(addr, reply)
}

/// Verify credentials on the node that owns the mailbox.
pub async fn authenticate(addr: &str, auth: &Credentials) -> Result<()> {
    let reply = call(addr, &Request::Authenticate(auth.clone())).await?;
    expect_done(addr, reply)
}

/// Deliver a message.
pub async fn send(addr: &str, request: SendRequest) -> Result<()> {
    let reply = call(addr, &Request::Send(request)).await?;
    expect_done(addr, reply)
}

/// Delete a message from the caller's mailbox.
pub async fn delete(addr: &str, request: DeleteRequest) -> Result<()> {
    let reply = call(addr, &Request::Delete(request)).await?;
    expect_done(addr, reply)
}

/// Fetch the caller's full message log from its owning node.
pub async fn receive(addr: &str, auth: &Credentials) -> Result<MailboxPayload> {
    match call(addr, &Request::Receive(auth.clone())).await? {
        Reply::Mailbox(payload) => Ok(payload),
        Reply::Failure(fault) => Err(fault.into()),
        _ => Err(Error::UnexpectedReply(addr.to_string())),
    }
}

/// Ship a batch of mailboxes to their new owner.
pub async fn transfer(addr: &str, request: TransferRequest) -> Result<()> {
    let reply = call(addr, &Request::Transfer(request)).await?;
    expect_done(addr, reply)
}

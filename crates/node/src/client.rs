//! The mail-application facade.
//!
//! A client holds one connection target (the stub) and, once logged in, the
//! cached mailbox credentials. Registration and login both end with the
//! client connected to the node that owns the mailbox, which is the only
//! node `Receive` may be issued against.

use mailring_core::consts::CHORD_MOD;
use mailring_core::dht::PeerInfo;
use mailring_core::mail::Mailbox;
use mailring_core::mail::Message;
use mailring_core::proto::Credentials;
use mailring_core::proto::DeleteRequest;
use mailring_core::proto::SendRequest;

use crate::error::Error;
use crate::error::Result;
use crate::rpc;

/// A single-threaded mail client.
pub struct Client {
    target: String,
    mailbox: Option<Mailbox>,
}

impl Client {
    /// Connect to a node by connection string, probing it with a ping.
    pub async fn connect(conn_string: impl Into<String>) -> Result<Self> {
        let target = conn_string.into();
        let reply = rpc::ping(&target, 1)
            .await
            .map_err(|_| Error::Offline(target.clone()))?;
        if reply.n != 1 {
            return Err(Error::Offline(target));
        }
        Ok(Client {
            target,
            mailbox: None,
        })
    }

    /// Connect to a node by descriptor.
    pub async fn connect_peer(node: &PeerInfo) -> Result<Self> {
        Self::connect(node.conn_string()).await
    }

    /// Point the stub at another node; the current target is dropped.
    pub fn connect_to(&mut self, node: &PeerInfo) {
        self.target = node.conn_string();
    }

    /// Ping the connected node, expecting `n` echoed back.
    pub async fn ping(&self, n: i64) -> Result<bool> {
        Ok(rpc::ping(&self.target, n).await?.n == n)
    }

    /// Register a new account and log into it. On success the client is
    /// connected to the node owning the new mailbox.
    pub async fn account_register(&mut self, address: &str, password: &str) -> Result<PeerInfo> {
        self.auth(Mailbox::new(address, password), false).await
    }

    /// Log into an existing account. On success the client is connected to
    /// the node owning the mailbox.
    pub async fn account_login(&mut self, address: &str, password: &str) -> Result<PeerInfo> {
        self.auth(Mailbox::new(address, password), true).await
    }

    async fn auth(&mut self, mailbox: Mailbox, login: bool) -> Result<PeerInfo> {
        let manager = if login {
            rpc::lookup_mailbox(&self.target, mailbox.owner(), CHORD_MOD).await?
        } else {
            rpc::insert_mailbox(&self.target, mailbox.owner(), mailbox.password(), CHORD_MOD)
                .await?
        };
        self.connect_to(&manager);
        let auth = Credentials {
            user: mailbox.owner().to_string(),
            password: mailbox.password(),
        };
        rpc::authenticate(&self.target, &auth).await?;
        self.mailbox = Some(mailbox);
        Ok(manager)
    }

    /// Fetch the message log from the owning node, replacing the local
    /// list.
    pub async fn get_messages(&mut self) -> Result<&[Message]> {
        let auth = self.credentials()?;
        let payload = rpc::receive(&self.target, &auth).await?;
        let mailbox = self.mailbox.as_mut().ok_or(Error::NotLoggedIn)?;
        mailbox.set_messages(payload.messages);
        Ok(mailbox.messages())
    }

    /// Send a message as the logged-in account.
    pub async fn send(&self, msg: Message) -> Result<()> {
        let auth = self.credentials()?;
        rpc::send(
            &self.target,
            SendRequest {
                auth,
                msg,
                ttl: CHORD_MOD,
            },
        )
        .await
    }

    /// Delete the `idx`-th message of the logged-in account's mailbox.
    pub async fn remove(&self, idx: i32) -> Result<()> {
        let auth = self.credentials()?;
        rpc::delete(
            &self.target,
            DeleteRequest {
                auth,
                idx,
                ttl: CHORD_MOD,
            },
        )
        .await
    }

    /// The locally cached mailbox, if logged in.
    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref()
    }

    /// The connection string currently targeted by the stub.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn credentials(&self) -> Result<Credentials> {
        let mailbox = self.mailbox.as_ref().ok_or(Error::NotLoggedIn)?;
        Ok(Credentials {
            user: mailbox.owner().to_string(),
            password: mailbox.password(),
        })
    }
}

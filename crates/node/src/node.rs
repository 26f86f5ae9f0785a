//! The node: local ring state and every handler of the node service.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::Duration;

use mailring_core::consts::CHORD_MOD;
use mailring_core::consts::M;
use mailring_core::dht::between;
use mailring_core::dht::FingerTable;
use mailring_core::dht::Key;
use mailring_core::dht::PeerInfo;
use mailring_core::mail;
use mailring_core::mail::Mailbox;
use mailring_core::proto::Credentials;
use mailring_core::proto::DeleteRequest;
use mailring_core::proto::Fault;
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
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::error::Result;
use crate::rpc;
use crate::server;
use crate::stabilizer;

type Boxes = BTreeMap<Key, Mailbox>;
type HandlerResult = std::result::Result<Reply, Fault>;

fn lockf(error: Error) -> Fault {
    Fault::internal(error.to_string())
}

/// Tunables of a node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Pause between stabilization rounds.
    pub stabilize_interval: Duration,
    /// Directory holding the `<id>.dat` dump file.
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            stabilize_interval: Duration::from_secs(1),
            data_dir: PathBuf::from("."),
        }
    }
}

struct Workers {
    server: JoinHandle<()>,
    stabilizer: JoinHandle<()>,
}

/// One live node of the ring.
///
/// State is split into independently protected units; handlers snapshot
/// whatever they need under a short critical section and never hold a guard
/// across an outbound call.
pub struct Node {
    info: PeerInfo,
    predecessor: RwLock<Option<PeerInfo>>,
    finger: RwLock<FingerTable>,
    boxes: Mutex<Boxes>,
    disable_transfer: AtomicBool,
    config: NodeConfig,
    shutdown: CancellationToken,
    workers: Mutex<Option<Workers>>,
}

impl Node {
    /// Bind `address:port` and start the RPC server and the stabilizer.
    ///
    /// A dump file left behind by a previous graceful shutdown is read back
    /// before the node enters the ring.
    pub async fn start(address: &str, port: u16) -> Result<Arc<Self>> {
        Self::start_with_config(address, port, NodeConfig::default()).await
    }

    /// [Node::start] with explicit tunables.
    pub async fn start_with_config(
        address: &str,
        port: u16,
        config: NodeConfig,
    ) -> Result<Arc<Self>> {
        let info = PeerInfo::new(address, port);
        let listener = TcpListener::bind(info.conn_string())
            .await
            .map_err(|e| Error::Bind(info.conn_string(), e))?;
        let boxes = recover_boxes(&config.data_dir, info.id);

        tracing::info!(node = %info, id = %info.id, "node listening");
        let node = Arc::new(Node {
            predecessor: RwLock::new(None),
            finger: RwLock::new(FingerTable::new(info.clone())),
            info,
            boxes: Mutex::new(boxes),
            disable_transfer: AtomicBool::new(false),
            config,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(None),
        });

        let server = tokio::spawn(server::serve(node.clone(), listener));
        let stab = tokio::spawn(stabilizer::run(node.clone()));
        if let Ok(mut workers) = node.workers.lock() {
            *workers = Some(Workers {
                server,
                stabilizer: stab,
            });
        }
        Ok(node)
    }

    /// Enter the ring through `entry_point`: learn our successor and adopt
    /// it. The finger table beyond the successor fills in as the stabilizer
    /// runs.
    pub async fn join(&self, entry_point: &PeerInfo) -> Result<()> {
        let successor = rpc::node_join(&entry_point.conn_string(), self.info.id).await?;
        tracing::info!(node = %self.info.id, successor = %successor.id, "joining the ring");
        self.set_successor(successor).await
    }

    /// Adopt `successor` and notify it so it can update its predecessor
    /// promptly instead of waiting for the next stabilization round.
    pub async fn set_successor(&self, successor: PeerInfo) -> Result<()> {
        {
            self.lock_finger_write()?.set_successor(successor.clone());
        }
        if successor != self.info {
            if let Err(e) = rpc::stabilize(&successor.conn_string(), &self.info).await {
                tracing::debug!(successor = %successor, error = %e, "successor notification failed");
            }
        }
        Ok(())
    }

    /// Leave the ring gracefully: refuse further transfers, evacuate owned
    /// mailboxes to the successor, fall back to the dump file, then release
    /// the background workers. Idempotent.
    pub async fn stop(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(workers) = workers else { return };

        self.disable_transfer.store(true, Ordering::SeqCst);
        let evacuated = match self.successor() {
            Ok(successor) => self.transfer_boxes(&successor).await,
            Err(_) => false,
        };
        if !evacuated {
            tracing::warn!(node = %self.info.id, "couldn't transfer mail, dumping boxes to file");
            if !self.dump_boxes() {
                tracing::error!(node = %self.info.id, "dump failed, mailbox data will be lost");
            }
        } else if self.mailbox_count().unwrap_or(0) > 0 {
            // The transfer filter only ships keys up to the successor's id;
            // whatever it left behind still has to survive the shutdown.
            tracing::warn!(node = %self.info.id, "dumping boxes the transfer filter left behind");
            self.dump_boxes();
        }

        self.shutdown.cancel();
        let _ = workers.stabilizer.await;
        let _ = workers.server.await;
        tracing::info!(node = %self.info, "node stopped");
    }

    /// This node's coordinates.
    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    /// Snapshot of the successor (finger 0).
    pub fn successor(&self) -> Result<PeerInfo> {
        Ok(self.lock_finger_read()?.successor().clone())
    }

    /// Snapshot of the predecessor; `None` until the first stabilization
    /// reaches this node.
    pub fn predecessor(&self) -> Result<Option<PeerInfo>> {
        Ok(self
            .predecessor
            .read()
            .map_err(|_| Error::Lock("predecessor"))?
            .clone())
    }

    /// Snapshot of finger table entry `index`.
    pub fn finger(&self, index: usize) -> Result<Option<PeerInfo>> {
        Ok(self.lock_finger_read()?.get(index).cloned())
    }

    /// Number of mailboxes this node currently owns.
    pub fn mailbox_count(&self) -> Result<usize> {
        Ok(self.lock_boxes()?.len())
    }

    /// Where this node dumps its boxes on a failed evacuation.
    pub fn dump_path(&self) -> PathBuf {
        self.config.data_dir.join(format!("{}.dat", self.info.id))
    }

    pub(crate) fn stabilize_interval(&self) -> Duration {
        self.config.stabilize_interval
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether this node is authoritative for `key`.
    ///
    /// With a predecessor in place this is the `(predecessor, self]` arc. A
    /// lone node owns the whole ring, and a node that has joined but not
    /// been stabilized against yet owns everything up to its own id.
    pub fn is_successor(&self, key: Key) -> Result<bool> {
        let predecessor = self.predecessor()?;
        Ok(match predecessor {
            Some(pred) if pred.id == self.info.id => true,
            Some(pred) => between(key, pred.id, self.info.id),
            None => *self.lock_finger_read()?.successor() == self.info || key <= self.info.id,
        })
    }

    fn finger_for_key(&self, key: Key) -> Result<PeerInfo> {
        Ok(self.lock_finger_read()?.finger_for_key(key).clone())
    }

    /// Rebuild fingers `1..M` by probing the successor for each finger
    /// value.
    pub async fn build_finger_table(&self) -> Result<()> {
        let successor = self.successor()?;
        for exp in 1..M as u32 {
            let finger_value = self.info.id.finger_offset(exp);
            match rpc::search_finger(&successor.conn_string(), self.info.id, finger_value).await {
                Ok(peer) => self.lock_finger_write()?.set(exp as usize, peer),
                Err(e) => {
                    tracing::debug!(node = %self.info.id, exp, error = %e, "no finger found")
                }
            }
        }
        Ok(())
    }

    /// Replace the successor with a closer node learned during
    /// stabilization, then rebuild the whole table through it.
    pub(crate) async fn adopt_successor(&self, peer: PeerInfo) -> Result<()> {
        tracing::debug!(node = %self.info.id, successor = %peer.id, "adopting closer successor");
        {
            self.lock_finger_write()?.set_successor(peer);
        }
        self.build_finger_table().await
    }

    /// Dispatch one inbound request.
    pub(crate) async fn handle(&self, request: Request) -> Reply {
        let result = match request {
            Request::Ping(req) => self.handle_ping(req),
            Request::NodeJoin(req) => self.handle_node_join(req).await,
            Request::Stabilize(claimant) => self.handle_stabilize(claimant),
            Request::SearchFinger(req) => self.handle_search_finger(req).await,
            Request::InsertMailbox(req) => self.handle_insert_mailbox(req).await,
            Request::LookupMailbox(req) => self.handle_lookup_mailbox(req).await,
            Request::Authenticate(auth) => self.handle_authenticate(auth),
            Request::Send(req) => self.handle_send(req).await,
            Request::Delete(req) => self.handle_delete(req).await,
            Request::Receive(auth) => self.handle_receive(auth),
            Request::Transfer(req) => self.handle_transfer(req),
        };
        match result {
            Ok(reply) => reply,
            Err(fault) => {
                tracing::debug!(node = %self.info.id, %fault, "request failed");
                Reply::Failure(fault)
            }
        }
    }

    fn handle_ping(&self, request: PingRequest) -> HandlerResult {
        Ok(Reply::Pong(PingReply {
            address: self.info.address.clone(),
            port: self.info.port,
            id: self.info.id,
            n: request.n,
        }))
    }

    async fn handle_node_join(&self, request: JoinRequest) -> HandlerResult {
        let joiner = request.node_id;
        let predecessor = self.predecessor().map_err(lockf)?;
        let pred_is_behind = predecessor
            .as_ref()
            .map_or(true, |p| p.id < joiner || p.id > self.info.id);
        if self.info.id > joiner && pred_is_behind {
            // The joiner slots right behind us, or we hold the smallest id
            // of the ring.
            Ok(Reply::Peer(self.info.clone()))
        } else if self.info.id < joiner {
            let hop = self.finger_for_key(joiner).map_err(lockf)?;
            self.forward(&hop, Request::NodeJoin(request)).await
        } else {
            // The joiner is behind our predecessor; hand the question back.
            // Slower than a finger hop, but joins are rare.
            match predecessor {
                Some(pred) => self.forward(&pred, Request::NodeJoin(request)).await,
                None => Err(Fault::not_found("no predecessor to continue the join")),
            }
        }
    }

    fn handle_stabilize(&self, claimant: PeerInfo) -> HandlerResult {
        let mut predecessor = self.lock_predecessor_write().map_err(lockf)?;
        // Plain id comparison rather than the wrap-aware arc test: ids only
        // advance clockwise here, and an unset predecessor adopts
        // unconditionally.
        let adopt = predecessor.as_ref().map_or(true, |p| claimant.id > p.id);
        if adopt {
            *predecessor = Some(claimant);
        }
        Ok(Reply::Predecessor(predecessor.clone()))
    }

    async fn handle_search_finger(&self, request: FingerQuestion) -> HandlerResult {
        let covers = self.info.id >= request.finger_value
            || (self.info.id < request.sender_id && self.info.id < request.finger_value);
        if covers {
            Ok(Reply::Peer(self.info.clone()))
        } else if request.sender_id == self.info.id {
            Err(Fault::not_found("the finger request made the entire loop"))
        } else {
            let successor = self.successor().map_err(lockf)?;
            self.forward(&successor, Request::SearchFinger(request))
                .await
        }
    }

    async fn handle_insert_mailbox(&self, request: InsertMailboxRequest) -> HandlerResult {
        let key = Key::hash(&request.owner);
        if self.is_successor(key).map_err(lockf)? {
            let mut boxes = self.lock_boxes().map_err(lockf)?;
            if boxes.contains_key(&key) {
                return Err(Fault::already_exists("user already registered"));
            }
            boxes.insert(key, Mailbox::with_hash(request.owner, request.password));
            Ok(Reply::Peer(self.info.clone()))
        } else if request.ttl > 0 {
            let hop = self.finger_for_key(key).map_err(lockf)?;
            let forwarded = InsertMailboxRequest {
                ttl: request.ttl - 1,
                ..request
            };
            self.forward(&hop, Request::InsertMailbox(forwarded)).await
        } else {
            Err(Fault::not_found("couldn't find the owning node"))
        }
    }

    async fn handle_lookup_mailbox(&self, request: LookupRequest) -> HandlerResult {
        let key = Key::hash(&request.owner);
        let stored = self.lock_boxes().map_err(lockf)?.contains_key(&key);
        if stored {
            Ok(Reply::Peer(self.info.clone()))
        } else if request.ttl > 0 {
            let hop = self.finger_for_key(key).map_err(lockf)?;
            let forwarded = LookupRequest {
                ttl: request.ttl - 1,
                ..request
            };
            self.forward(&hop, Request::LookupMailbox(forwarded)).await
        } else {
            Err(Fault::not_found("couldn't find the mailbox"))
        }
    }

    fn handle_authenticate(&self, auth: Credentials) -> HandlerResult {
        let key = Key::hash(&auth.user);
        let boxes = self.lock_boxes().map_err(lockf)?;
        match boxes.get(&key) {
            Some(bx) if bx.password() == auth.password => Ok(Reply::Done),
            Some(_) => Err(Fault::unauthenticated("authentication failed")),
            None => Err(Fault::unauthenticated("couldn't find the mailbox")),
        }
    }

    async fn handle_send(&self, request: SendRequest) -> HandlerResult {
        if request.msg.from != request.auth.user {
            return Err(Fault::unauthenticated(
                "authentication doesn't match the sender",
            ));
        }
        let key = Key::hash(&request.msg.to);
        let stored = self.lock_boxes().map_err(lockf)?.contains_key(&key);
        if stored {
            if !self.check_authentication(&request.auth).await {
                return Err(Fault::unauthenticated("authentication failed"));
            }
            let mut boxes = self.lock_boxes().map_err(lockf)?;
            match boxes.get_mut(&key) {
                Some(bx) => {
                    bx.push(request.msg);
                    Ok(Reply::Done)
                }
                // The box migrated away while the sender was authenticated.
                None => Err(Fault::not_found("couldn't find the mailbox")),
            }
        } else if request.ttl > 0 {
            let hop = self.finger_for_key(key).map_err(lockf)?;
            let forwarded = SendRequest {
                ttl: request.ttl - 1,
                ..request
            };
            self.forward(&hop, Request::Send(forwarded)).await
        } else {
            Err(Fault::not_found("couldn't find the mailbox"))
        }
    }

    async fn handle_delete(&self, request: DeleteRequest) -> HandlerResult {
        let key = Key::hash(&request.auth.user);
        let stored = self.lock_boxes().map_err(lockf)?.contains_key(&key);
        if stored {
            if !self.check_authentication(&request.auth).await {
                return Err(Fault::unauthenticated("authentication failed"));
            }
            let mut boxes = self.lock_boxes().map_err(lockf)?;
            let bx = boxes
                .get_mut(&key)
                .ok_or_else(|| Fault::not_found("couldn't find the mailbox"))?;
            let removed = usize::try_from(request.idx)
                .ok()
                .and_then(|idx| bx.remove(idx));
            match removed {
                Some(_) => Ok(Reply::Done),
                None => Err(Fault::out_of_range("index out of range")),
            }
        } else if request.ttl > 0 {
            let hop = self.finger_for_key(key).map_err(lockf)?;
            let forwarded = DeleteRequest {
                ttl: request.ttl - 1,
                ..request
            };
            self.forward(&hop, Request::Delete(forwarded)).await
        } else {
            Err(Fault::not_found("couldn't find the mailbox"))
        }
    }

    fn handle_receive(&self, auth: Credentials) -> HandlerResult {
        let key = Key::hash(&auth.user);
        let boxes = self.lock_boxes().map_err(lockf)?;
        let bx = boxes
            .get(&key)
            .ok_or_else(|| Fault::not_found("couldn't find the mailbox"))?;
        if bx.password() != auth.password {
            return Err(Fault::unauthenticated("authentication failed"));
        }
        Ok(Reply::Mailbox(MailboxPayload {
            auth: Credentials {
                user: bx.owner().to_string(),
                password: bx.password(),
            },
            messages: bx.messages().to_vec(),
        }))
    }

    fn handle_transfer(&self, request: TransferRequest) -> HandlerResult {
        if self.disable_transfer.load(Ordering::SeqCst) {
            return Err(Fault::unavailable("transfer is disabled"));
        }
        let mut incoming: Boxes = BTreeMap::new();
        for payload in request.boxes {
            let key = Key::hash(&payload.auth.user);
            let mut bx = Mailbox::with_hash(payload.auth.user, payload.auth.password);
            bx.extend(payload.messages);
            if incoming.insert(key, bx).is_some() {
                return Err(Fault::internal("duplicate mailbox in the transfer batch"));
            }
        }
        let mut boxes = self.lock_boxes().map_err(lockf)?;
        // Merge semantics: a box we already own wins over the incoming copy.
        for (key, bx) in incoming {
            boxes.entry(key).or_insert(bx);
        }
        Ok(Reply::Done)
    }

    async fn forward(&self, hop: &PeerInfo, request: Request) -> HandlerResult {
        match rpc::call(&hop.conn_string(), &request).await {
            // Failures from the far end ride back verbatim inside the reply.
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::debug!(node = %self.info.id, hop = %hop, error = %e, "forward failed");
                Err(Fault::not_found("couldn't reach the next hop"))
            }
        }
    }

    /// Verify a sender's credentials against the node that owns their
    /// mailbox. Short-circuits to a local check when that node is us.
    async fn check_authentication(&self, auth: &Credentials) -> bool {
        let key = Key::hash(&auth.user);
        if self.is_successor(key).unwrap_or(false) {
            return match self.lock_boxes() {
                Ok(boxes) => boxes
                    .get(&key)
                    .map_or(false, |bx| bx.password() == auth.password),
                Err(_) => false,
            };
        }
        let Ok(hop) = self.finger_for_key(key) else {
            return false;
        };
        let owner_node = match rpc::lookup_mailbox(&hop.conn_string(), &auth.user, CHORD_MOD).await
        {
            Ok(peer) => peer,
            Err(e) => {
                tracing::debug!(user = %auth.user, error = %e, "sender lookup failed");
                return false;
            }
        };
        rpc::authenticate(&owner_node.conn_string(), auth)
            .await
            .is_ok()
    }

    /// Ship every owned mailbox whose key is at or below `dest`'s id.
    ///
    /// The destination is pinged first with a random nonce; an unreachable
    /// or mismatched peer fails the transfer without touching local state.
    /// Transferred keys are erased only after the destination acknowledged
    /// the batch.
    pub(crate) async fn transfer_boxes(&self, dest: &PeerInfo) -> bool {
        match self.mailbox_count() {
            Ok(0) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }

        let nonce: i64 = rand::random();
        match rpc::ping(&dest.conn_string(), nonce).await {
            Ok(reply) if reply.n == nonce => {}
            _ => return false,
        }

        let (keys, batch): (Vec<Key>, Vec<MailboxPayload>) = match self.lock_boxes() {
            Ok(boxes) => boxes
                .iter()
                .filter(|(key, _)| **key <= dest.id)
                .map(|(key, bx)| {
                    (
                        *key,
                        MailboxPayload {
                            auth: Credentials {
                                user: bx.owner().to_string(),
                                password: bx.password(),
                            },
                            messages: bx.messages().to_vec(),
                        },
                    )
                })
                .unzip(),
            Err(_) => return false,
        };
        if batch.is_empty() {
            return true;
        }

        let count = batch.len();
        match rpc::transfer(&dest.conn_string(), TransferRequest { boxes: batch }).await {
            Ok(()) => {
                if let Ok(mut boxes) = self.lock_boxes() {
                    for key in keys {
                        boxes.remove(&key);
                    }
                }
                tracing::info!(from = %self.info.id, to = %dest.id, count, "mailboxes transferred");
                true
            }
            Err(e) => {
                tracing::debug!(to = %dest, error = %e, "transfer failed");
                false
            }
        }
    }

    fn dump_boxes(&self) -> bool {
        let path = self.dump_path();
        let bytes = match self.lock_boxes().and_then(|boxes| {
            mail::encode_boxes(&boxes).map_err(Error::from)
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(node = %self.info.id, error = %e, "couldn't encode boxes");
                return false;
            }
        };
        match fs::write(&path, bytes) {
            Ok(()) => {
                tracing::info!(node = %self.info.id, path = %path.display(), "boxes dumped");
                true
            }
            Err(e) => {
                tracing::error!(node = %self.info.id, error = %e, "couldn't write dump file");
                false
            }
        }
    }

    fn lock_finger_read(&self) -> Result<RwLockReadGuard<FingerTable>> {
        self.finger.read().map_err(|_| Error::Lock("finger table"))
    }

    fn lock_finger_write(&self) -> Result<RwLockWriteGuard<FingerTable>> {
        self.finger.write().map_err(|_| Error::Lock("finger table"))
    }

    fn lock_predecessor_write(&self) -> Result<RwLockWriteGuard<Option<PeerInfo>>> {
        self.predecessor
            .write()
            .map_err(|_| Error::Lock("predecessor"))
    }

    fn lock_boxes(&self) -> Result<MutexGuard<Boxes>> {
        self.boxes.lock().map_err(|_| Error::Lock("mailbox store"))
    }
}

fn recover_boxes(data_dir: &Path, id: Key) -> Boxes {
    let path = data_dir.join(format!("{id}.dat"));
    let Ok(bytes) = fs::read(&path) else {
        return Boxes::new();
    };
    match mail::decode_boxes(&bytes) {
        Ok(boxes) => {
            tracing::info!(node = %id, count = boxes.len(), "recovered mailboxes from dump file");
            boxes
        }
        Err(e) => {
            tracing::warn!(node = %id, error = %e, "couldn't decode dump file, starting empty");
            Boxes::new()
        }
    }
}

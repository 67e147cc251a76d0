//! Shared state mirrored from the inbound native-chain node connection
//! (§4.8). Owned by the node-receive task; read by tick tasks and the
//! dispatcher through a cloned snapshot rather than a shared lock guard, per
//! the copy-under-lock rule in §5.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, mpsc};

/// A validator's self-reported weight for one representative account, as
/// carried by `weight_snapshot_ack`.
#[derive(Debug, Clone, Copy)]
pub struct WeightSnapshotEntry {
    pub weight: u128,
}

#[derive(Debug, Default, Clone)]
pub struct WeightSnapshot {
    pub epoch: u32,
    pub weights: HashMap<[u8; 32], WeightSnapshotEntry>,
}

#[derive(Debug, Default, Clone)]
struct LinkState {
    account: Option<[u8; 32]>,
    snapshot: WeightSnapshot,
}

/// The single inbound connection from the attached native-chain node.
/// `attached` flips to `false` when the socket drops, which the attestation
/// rewardable predicate (§4.5) checks before allowing a submission cycle.
pub struct NodeLink {
    state: RwLock<LinkState>,
    attached: AtomicBool,
    outbound: RwLock<Option<mpsc::UnboundedSender<serde_json::Value>>>,
}

impl Default for NodeLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeLink {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LinkState::default()),
            attached: AtomicBool::new(false),
            outbound: RwLock::new(None),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Installs the outbound sender for a freshly accepted connection,
    /// replacing any stale prior link — only one node may be attached.
    pub async fn attach(&self, sender: mpsc::UnboundedSender<serde_json::Value>) {
        *self.outbound.write().await = Some(sender);
        self.attached.store(true, Ordering::SeqCst);
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    /// Sends a JSON frame to the node; silently drops it if unattached,
    /// matching the "no back-pressure queue" resource policy (§5).
    pub async fn send(&self, frame: serde_json::Value) {
        if let Some(tx) = self.outbound.read().await.as_ref() {
            let _ = tx.send(frame);
        }
    }

    pub async fn account(&self) -> Option<[u8; 32]> {
        self.state.read().await.account
    }

    pub async fn set_account(&self, account: [u8; 32]) {
        self.state.write().await.account = Some(account);
    }

    pub async fn snapshot(&self) -> WeightSnapshot {
        self.state.read().await.snapshot.clone()
    }

    pub async fn set_snapshot(&self, snapshot: WeightSnapshot) {
        self.state.write().await.snapshot = snapshot;
    }
}

pub type SharedNodeLink = Arc<NodeLink>;

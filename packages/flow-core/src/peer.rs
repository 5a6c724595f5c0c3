//! Process-wide writer identity.

use parking_lot::{const_rwlock, RwLock};

use crate::ids::PeerId;

static PEER_ID: RwLock<Option<PeerId>> = const_rwlock(None);

/// The peer id of this process, generated on first use.
pub fn peer_id() -> PeerId {
    if let Some(peer) = *PEER_ID.read() {
        return peer;
    }
    let mut slot = PEER_ID.write();
    *slot.get_or_insert_with(|| {
        let peer = PeerId::random();
        tracing::debug!(%peer, "generated process peer id");
        peer
    })
}

/// Override the process peer id. Mostly useful in tests.
pub fn set_peer_id(peer: PeerId) {
    *PEER_ID.write() = Some(peer);
}

/// Forget the current peer id; the next [`peer_id`] call generates a fresh one.
pub fn reset_peer_id() {
    *PEER_ID.write() = None;
}

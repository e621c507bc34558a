// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use crate::hsid::Hsid;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// The peer-info oracle. Supplies the newest safe transaction id this site knows of
/// for a given peer, and emits heartbeats to keep the surrounding system's
/// dead-host timers fed while the arbiter is occupied with arbitration.
pub trait MeshAide {
    /// The newest safe transaction id this site can vouch for on behalf of `peer`,
    /// or `None` if it has no record.
    fn newest_safe_transaction_for_initiator(&self, peer: Hsid) -> Option<i64>;

    /// Emits a heartbeat covering every site in `hs_ids`.
    fn send_heartbeats(&self, hs_ids: &BTreeSet<Hsid>);
}

/// An in-memory `MeshAide` used by this crate's own tests.
#[derive(Default)]
pub struct StaticMeshAide {
    safe_txn_ids: Mutex<BTreeMap<Hsid, i64>>,
    heartbeats_sent: Mutex<u32>,
}

impl StaticMeshAide {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_safe_txn(self, peer: Hsid, txn: i64) -> Self {
        self.safe_txn_ids.lock().unwrap().insert(peer, txn);
        self
    }

    pub fn heartbeats_sent(&self) -> u32 {
        *self.heartbeats_sent.lock().unwrap()
    }
}

impl MeshAide for StaticMeshAide {
    fn newest_safe_transaction_for_initiator(&self, peer: Hsid) -> Option<i64> {
        self.safe_txn_ids.lock().unwrap().get(&peer).copied()
    }

    fn send_heartbeats(&self, _hs_ids: &BTreeSet<Hsid>) {
        *self.heartbeats_sent.lock().unwrap() += 1;
    }
}

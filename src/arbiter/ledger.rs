// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use crate::aide::MeshAide;
use crate::arbiter::message::SiteFailureMessage;
use crate::hsid::Hsid;
use std::collections::{BTreeMap, BTreeSet};

/// Sentinel for "no safe transaction id is known yet" -- the same constant both the
/// seeding step and the decision-extraction step initialize to, so a leftover
/// sentinel at extraction time is unambiguously a missing report rather than a real
/// (impossibly low) transaction id.
pub const UNSET_SAFE_TXN: i64 = i64::MIN;

/// `(reporter, subject) -> safe_txn_id`. Populated from incoming
/// `SiteFailureMessage`s and from local queries to the peer-info oracle.
#[derive(Default)]
pub struct Ledger {
    entries: BTreeMap<(Hsid, Hsid), i64>,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    /// Overwrites the entry for `(reporter, subject)`.
    pub fn insert(&mut self, reporter: Hsid, subject: Hsid, txn: i64) {
        self.entries.insert((reporter, subject), txn);
    }

    pub fn get(&self, reporter: Hsid, subject: Hsid) -> Option<i64> {
        self.entries.get(&(reporter, subject)).copied()
    }

    /// Seeds local entries for every site currently in trouble, querying the oracle
    /// on our own behalf (`reporter = self_hsid`). Uses `UNSET_SAFE_TXN` when the
    /// oracle has no record.
    pub fn seed_from_aide(&mut self, self_hsid: Hsid, in_trouble: &BTreeSet<Hsid>, aide: &dyn MeshAide) {
        for &subject in in_trouble {
            if subject == self_hsid {
                continue;
            }
            let txn = aide
                .newest_safe_transaction_for_initiator(subject)
                .unwrap_or(UNSET_SAFE_TXN);
            self.insert(self_hsid, subject, txn);
        }
    }

    /// Inserts every `(source, failed_peer) -> txn` pair from an incoming
    /// `SiteFailureMessage`, skipping peers outside the pre-failure mesh and any
    /// entry that would name `self_hsid` as the subject.
    pub fn insert_from_message(&mut self, sfm: &SiteFailureMessage, hs_ids: &BTreeSet<Hsid>, self_hsid: Hsid) {
        for (&subject, &txn) in &sfm.safe_txn_ids {
            if subject == self_hsid || !hs_ids.contains(&subject) {
                continue;
            }
            self.insert(sfm.source, subject, txn);
        }
    }

    /// `true` once the ledger holds an entry for every `(survivor, subject)` pair in
    /// `survivors x subjects`, excluding any pair naming `self_hsid` and any pair
    /// where the survivor and subject coincide -- a site never reports a watermark
    /// on its own behalf, so that pair could never be filled.
    pub fn covers(&self, survivors: &BTreeSet<Hsid>, subjects: &BTreeSet<Hsid>, self_hsid: Hsid) -> bool {
        survivors.iter().all(|&survivor| {
            subjects.iter().all(|&subject| {
                survivor == self_hsid
                    || subject == self_hsid
                    || survivor == subject
                    || self.get(survivor, subject).is_some()
            })
        })
    }

    /// Missing `(survivor, subject)` pairs, for stall reporting.
    pub fn missing_pairs(&self, survivors: &BTreeSet<Hsid>, subjects: &BTreeSet<Hsid>, self_hsid: Hsid) -> Vec<(Hsid, Hsid)> {
        let mut missing = Vec::new();
        for &survivor in survivors {
            for &subject in subjects {
                if survivor == self_hsid || subject == self_hsid || survivor == subject {
                    continue;
                }
                if self.get(survivor, subject).is_none() {
                    missing.push((survivor, subject));
                }
            }
        }
        missing
    }

    /// The maximum reported `txn` across all `reporter ∈ hs_ids` for `subject`, or
    /// `None` if the ledger holds no such entry.
    pub fn max_for_subject(&self, subject: Hsid, hs_ids: &BTreeSet<Hsid>) -> Option<i64> {
        self.entries
            .iter()
            .filter(|((reporter, entry_subject), _)| entry_subject == &subject && hs_ids.contains(reporter))
            .map(|(_, &txn)| txn)
            .max()
    }

    /// Removes every entry whose subject is in `resolved`.
    pub fn clear_resolved(&mut self, resolved: &BTreeSet<Hsid>) {
        self.entries.retain(|(_, subject), _| !resolved.contains(subject));
    }
}

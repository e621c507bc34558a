// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

pub mod classifier;
pub mod ledger;
pub mod message;
pub mod seeker;

#[cfg(test)]
mod tests;

use crate::aide::MeshAide;
use crate::config::ArbiterConfig;
use crate::error::fatal;
use crate::hsid::Hsid;
use crate::mailbox::{Mailbox, Subject, WireMessage};
use classifier::{DiscardClassifier, DiscardVerdict};
use ledger::{Ledger, UNSET_SAFE_TXN};
use message::{FaultMessage, SiteFailureForwardMessage, SiteFailureMessage};
use seeker::{AgreementSeeker, KillStrategy};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// The distributed agreement arbiter for one site. Owned and driven by a single
/// thread; everything it touches (the ledger, the seeker, the in-trouble table) is
/// a private field, reachable only through this struct.
///
/// Normal usage flow:
///   a. construct with `new`, once per site, wired to that site's mailbox and
///      peer-info oracle.
///   b. call `reconfigure_on_fault` whenever the fault detector delivers a
///      `FaultMessage`.
///   c. a non-empty return means "disconnect these peers, using these watermarks";
///      an empty return means no decision yet -- keep pumping the fault detector.
pub struct MeshArbiter<B: Mailbox, A: MeshAide> {
    self_hsid: Hsid,
    mailbox: B,
    aide: A,
    config: ArbiterConfig,

    failed_sites: BTreeSet<Hsid>,
    in_trouble: BTreeMap<Hsid, bool>,
    /// Sites that were in-trouble-unwitnessed but not killed last round. Never
    /// evicted: long-lived cluster churn can grow this set without bound, a known
    /// tradeoff this crate inherits rather than resolves.
    stale_unwitnessed: BTreeSet<Hsid>,
    forward_candidates: BTreeMap<Hsid, SiteFailureForwardMessage>,
    ledger: Ledger,
    seeker: AgreementSeeker,

    in_trouble_count: AtomicU32,
    failed_sites_count: AtomicU32,
}

impl<B: Mailbox, A: MeshAide> MeshArbiter<B, A> {
    pub fn new(self_hsid: Hsid, mailbox: B, aide: A) -> MeshArbiter<B, A> {
        MeshArbiter::with_config(self_hsid, mailbox, aide, ArbiterConfig::default())
    }

    pub fn with_config(self_hsid: Hsid, mailbox: B, aide: A, config: ArbiterConfig) -> MeshArbiter<B, A> {
        MeshArbiter {
            self_hsid,
            mailbox,
            aide,
            config,
            failed_sites: BTreeSet::new(),
            in_trouble: BTreeMap::new(),
            stale_unwitnessed: BTreeSet::new(),
            forward_candidates: BTreeMap::new(),
            ledger: Ledger::new(),
            seeker: AgreementSeeker::new(KillStrategy::MatchingCardinality),
            in_trouble_count: AtomicU32::new(0),
            failed_sites_count: AtomicU32::new(0),
        }
    }

    /// `true` iff this site currently has at least one peer in trouble.
    pub fn is_in_arbitration(&self) -> bool {
        self.in_trouble_count.load(Ordering::Relaxed) > 0
    }

    /// Monotonically non-decreasing count of sites this arbiter has ever killed.
    pub fn failed_sites_count(&self) -> u32 {
        self.failed_sites_count.load(Ordering::Relaxed)
    }

    /// Runs one arbitration pass triggered by `fm`. `hs_ids` is the pre-failure
    /// mesh. Returns `{failed_site -> safe_txn_id}`; an empty map means no decision
    /// was reached this call.
    pub fn reconfigure_on_fault(&mut self, hs_ids: &BTreeSet<Hsid>, fm: FaultMessage) -> BTreeMap<Hsid, i64> {
        if !self.drain_fault_queue(hs_ids, fm) {
            return BTreeMap::new();
        }
        self.sync_counters();

        let alive: BTreeSet<Hsid> = hs_ids.difference(&self.failed_sites).copied().collect();
        self.seeker.start_seeking_for(alive, &self.in_trouble);

        let in_trouble_keys: BTreeSet<Hsid> = self.in_trouble.keys().copied().collect();
        self.ledger
            .seed_from_aide(self.self_hsid, &in_trouble_keys, &self.aide);

        self.send_phase();

        if !self.receive_phase(hs_ids, &in_trouble_keys) {
            // A concurrent new fault pre-empted this round; it was pushed back onto
            // the mailbox and will be picked up on the next call.
            return BTreeMap::new();
        }

        let result = self.extract_decision(hs_ids, &in_trouble_keys);
        self.notify_danglers(&result);
        self.commit(&result);
        result
    }

    fn upgrade_in_trouble(&mut self, site: Hsid, witnessed: bool) {
        let entry = self.in_trouble.entry(site).or_insert(false);
        if witnessed {
            *entry = true;
        }
    }

    fn classify(&self, hs_ids: &BTreeSet<Hsid>, fm: &FaultMessage) -> DiscardVerdict {
        DiscardClassifier::classify(
            self.self_hsid,
            hs_ids,
            &self.failed_sites,
            &self.in_trouble,
            &self.stale_unwitnessed,
            self.seeker.survivors(),
            fm,
        )
    }

    /// Step 1: classifies `fm`, then non-blockingly drains any further queued
    /// `FAILURE` messages, upgrading `in_trouble` for everything that passes.
    /// Returns `false` if nothing passed the classifier.
    fn drain_fault_queue(&mut self, hs_ids: &BTreeSet<Hsid>, fm: FaultMessage) -> bool {
        let mut pending = Some(fm);
        let mut any_entered = false;
        loop {
            let fm = match pending.take() {
                Some(fm) => fm,
                None => match self.mailbox.recv(&[Subject::Failure]) {
                    Some(WireMessage::Failure(fm)) => fm,
                    Some(_) => continue,
                    None => break,
                },
            };
            let verdict = self.classify(hs_ids, &fm);
            if verdict == DiscardVerdict::DoNot {
                self.upgrade_in_trouble(fm.failed_site, fm.witnessed);
                any_entered = true;
            } else {
                log::info!("discarding fault message {:?}: {:?}", fm, verdict);
            }
        }
        any_entered
    }

    /// Step 3: broadcasts our view of the mesh to every current survivor, including
    /// ourselves -- self-delivery guarantees at least one response and seeds the
    /// receive loop's own ledger entries.
    fn send_phase(&self) {
        let mut safe_txn_ids = BTreeMap::new();
        for &peer in self.in_trouble.keys() {
            if peer == self.self_hsid {
                continue;
            }
            let txn = self
                .aide
                .newest_safe_transaction_for_initiator(peer)
                .unwrap_or(UNSET_SAFE_TXN);
            safe_txn_ids.insert(peer, txn);
        }
        let sfm = SiteFailureMessage {
            source: self.self_hsid,
            survivors: self.seeker.survivors().clone(),
            safe_txn_ids,
        };
        let dests: Vec<Hsid> = self.seeker.survivors().iter().copied().collect();
        log::debug!("broadcasting site failure update to {:?}", dests);
        self.mailbox.send(&dests, WireMessage::SiteFailureUpdate(sfm));
    }

    /// Step 4: blocks on the mailbox until the ledger and seeker have everything
    /// this round needs. Returns `false` if a concurrent new fault aborted the
    /// round.
    fn receive_phase(&mut self, hs_ids: &BTreeSet<Hsid>, in_trouble_keys: &BTreeSet<Hsid>) -> bool {
        let started = Instant::now();
        let mut last_stall_log: Option<Instant> = None;
        let subjects = [Subject::Failure, Subject::SiteFailureUpdate, Subject::SiteFailureForward];

        loop {
            match self.mailbox.recv_blocking(&subjects, self.config.receive_tick) {
                Some(WireMessage::SiteFailureUpdate(sfm)) => {
                    if !hs_ids.contains(&sfm.source) || self.failed_sites.contains(&sfm.source) {
                        continue;
                    }
                    self.ledger.insert_from_message(&sfm, hs_ids, self.self_hsid);
                    self.seeker.add(&sfm);
                    self.forward_candidates.insert(
                        sfm.source,
                        SiteFailureForwardMessage {
                            reporter: sfm.source,
                            inner: sfm,
                        },
                    );
                }
                Some(WireMessage::SiteFailureForward(fwd)) => {
                    self.forward_candidates.insert(fwd.reporter, fwd.clone());
                    let source_known = hs_ids.contains(&fwd.inner.source);
                    let reporter_uncovered = !self.seeker.survivors().contains(&fwd.reporter)
                        && !self.failed_sites.contains(&fwd.reporter);
                    if source_known && reporter_uncovered {
                        self.seeker.add_forward(&fwd);
                    }
                }
                Some(WireMessage::Failure(fm)) => {
                    let verdict = self.classify(hs_ids, &fm);
                    if verdict == DiscardVerdict::DoNot {
                        log::debug!("concurrent fault {:?} pre-empts the current round", fm);
                        self.mailbox.deliver_front(WireMessage::Failure(fm));
                        return false;
                    }
                    log::info!("discarding fault message {:?}: {:?}", fm, verdict);
                }
                None => {
                    self.aide.send_heartbeats(hs_ids);
                    let elapsed = started.elapsed();
                    if elapsed >= self.config.stall_threshold {
                        let due = last_stall_log
                            .map_or(true, |at| at.elapsed() >= self.config.stall_log_interval);
                        if due {
                            let missing =
                                self.ledger
                                    .missing_pairs(self.seeker.survivors(), in_trouble_keys, self.self_hsid);
                            log::warn!(
                                "receive phase stalled for {:?}; missing pairs: {:?}",
                                elapsed,
                                missing
                            );
                            last_stall_log = Some(Instant::now());
                        }
                    }
                }
            }

            if self.ledger.covers(self.seeker.survivors(), in_trouble_keys, self.self_hsid) {
                self.resolve_forward_candidates();
                if !self.seeker.need_forward() {
                    return true;
                }
            }
        }
    }

    fn resolve_forward_candidates(&mut self) {
        let reporters: Vec<Hsid> = self.forward_candidates.keys().copied().collect();
        for reporter in reporters {
            let unseen = self.seeker.for_whom_site_is_dead(reporter);
            if unseen.is_empty() {
                continue;
            }
            if let Some(msg) = self.forward_candidates.get(&reporter).cloned() {
                let dests: Vec<Hsid> = unseen.iter().copied().collect();
                log::debug!("forwarding {}'s report to {:?}", reporter, dests);
                self.mailbox.send(&dests, WireMessage::SiteFailureForward(msg));
                self.seeker.mark_forwarded(reporter, &unseen);
            }
            self.forward_candidates.remove(&reporter);
        }
    }

    /// Step 5: resolves the kill set and the watermark for each killed site.
    fn extract_decision(&self, hs_ids: &BTreeSet<Hsid>, in_trouble_keys: &BTreeSet<Hsid>) -> BTreeMap<Hsid, i64> {
        let to_be_killed = self.seeker.next_kill(in_trouble_keys);
        let mut result = BTreeMap::new();
        for &subject in &to_be_killed {
            let txn = self.ledger.max_for_subject(subject, hs_ids).unwrap_or(UNSET_SAFE_TXN);
            if txn == UNSET_SAFE_TXN {
                fatal(format!(
                    "no safe transaction id recorded for killed subject {}",
                    subject
                ));
            }
            result.insert(subject, txn);
        }
        result
    }

    /// Step 6: tells the other survivors we are severing links to unwitnessed
    /// in-trouble peers, even the ones we can still talk to -- otherwise a survivor
    /// that never directly witnessed the failure could keep treating that peer as
    /// reachable after we've cut it off.
    fn notify_danglers(&self, result: &BTreeMap<Hsid, i64>) {
        let has_danglers = self.in_trouble.values().any(|&witnessed| !witnessed);
        if !has_danglers {
            return;
        }
        let killed: BTreeSet<Hsid> = result.keys().copied().collect();
        let survivors_after: BTreeSet<Hsid> = self.seeker.survivors().difference(&killed).copied().collect();
        let msg = SiteFailureMessage {
            source: self.self_hsid,
            survivors: survivors_after,
            safe_txn_ids: result.clone(),
        };
        let dests: Vec<Hsid> = self
            .seeker
            .survivors()
            .iter()
            .copied()
            .filter(|&site| site != self.self_hsid)
            .collect();
        log::debug!("notifying danglers {:?}", dests);
        self.mailbox.send(&dests, WireMessage::SiteFailureUpdate(msg));
    }

    /// Step 7: commits the decision and clears per-round state.
    fn commit(&mut self, result: &BTreeMap<Hsid, i64>) {
        self.failed_sites.extend(result.keys().copied());
        for (&site, &witnessed) in &self.in_trouble {
            if !witnessed && !self.failed_sites.contains(&site) {
                self.stale_unwitnessed.insert(site);
            }
        }
        self.in_trouble.clear();
        self.forward_candidates.clear();
        self.ledger.clear_resolved(&result.keys().copied().collect());
        self.seeker.clear();
        self.sync_counters();
    }

    fn sync_counters(&self) {
        self.in_trouble_count
            .store(self.in_trouble.len() as u32, Ordering::Relaxed);
        self.failed_sites_count
            .store(self.failed_sites.len() as u32, Ordering::Relaxed);
    }
}

#[cfg(test)]
impl<B: Mailbox, A: MeshAide> MeshArbiter<B, A> {
    pub fn in_trouble_for_test(&self) -> &BTreeMap<Hsid, bool> {
        &self.in_trouble
    }

    pub fn failed_sites_for_test(&self) -> &BTreeSet<Hsid> {
        &self.failed_sites
    }

    pub fn stale_unwitnessed_for_test(&self) -> &BTreeSet<Hsid> {
        &self.stale_unwitnessed
    }
}

// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use crate::arbiter::message::{SiteFailureForwardMessage, SiteFailureMessage};
use crate::hsid::Hsid;
use std::collections::{BTreeMap, BTreeSet};

/// Which arbitration strategy `nextKill` applies. A closed variant, not an open
/// trait object: the tie-breaking rules a strategy needs live with it, and the set
/// of strategies a cluster may choose between is a deployment decision, not an
/// extension point third-party code should plug into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KillStrategy {
    /// Groups surviving reporters by the exact set of in-trouble peers they declare
    /// dead, then picks the largest such group; ties go to the smaller kill set,
    /// further ties to ascending-hsid lexicographic order.
    MatchingCardinality,
}

impl Default for KillStrategy {
    fn default() -> KillStrategy {
        KillStrategy::MatchingCardinality
    }
}

/// Aggregates witness reports into the directed "who declares whom dead" graph and
/// resolves it into a kill set. Pure data structure: it holds no I/O handles and
/// does nothing but record assertions and fold them into a decision.
#[derive(Default)]
pub struct AgreementSeeker {
    strategy: KillStrategy,
    survivors: BTreeSet<Hsid>,
    /// Per-reporter: the set of peers that reporter most recently asserted are alive.
    reports: BTreeMap<Hsid, BTreeSet<Hsid>>,
    /// Per-reporter: extra recipients known to have received that reporter's report
    /// via a forward we already sent, tracked separately from `reports` so a forward
    /// never changes what a reporter is understood to have *asserted*.
    delivered: BTreeMap<Hsid, BTreeSet<Hsid>>,
}

impl AgreementSeeker {
    pub fn new(strategy: KillStrategy) -> AgreementSeeker {
        AgreementSeeker {
            strategy,
            ..AgreementSeeker::default()
        }
    }

    /// Initializes for a new round. `alive` is the pre-failure mesh minus
    /// `failed_sites`; a site is a survivor unless it is in `in_trouble` with
    /// `witnessed = true`.
    pub fn start_seeking_for(&mut self, alive: BTreeSet<Hsid>, in_trouble: &BTreeMap<Hsid, bool>) {
        self.survivors = alive
            .into_iter()
            .filter(|site| !in_trouble.get(site).copied().unwrap_or(false))
            .collect();
        self.reports.clear();
        self.delivered.clear();
    }

    /// Records a direct `SiteFailureMessage`: `source` asserts `survivors`, declaring
    /// everyone else in the universe dead.
    pub fn add(&mut self, sfm: &SiteFailureMessage) {
        self.record(sfm.source, sfm.survivors.clone());
    }

    /// Records a relayed report: the assertion belongs to the wrapped message's
    /// original source, not the immediate forwarder.
    pub fn add_forward(&mut self, fwd: &SiteFailureForwardMessage) {
        self.record(fwd.inner.source, fwd.inner.survivors.clone());
    }

    fn record(&mut self, reporter: Hsid, asserted_survivors: BTreeSet<Hsid>) {
        self.reports.insert(reporter, asserted_survivors);
    }

    /// Notes that `recipients` have now received `reporter`'s report, by a forward we
    /// just sent. Narrows future `for_whom_site_is_dead(reporter)` results.
    pub fn mark_forwarded(&mut self, reporter: Hsid, recipients: &BTreeSet<Hsid>) {
        self.delivered
            .entry(reporter)
            .or_default()
            .extend(recipients.iter().copied());
    }

    /// The current best-known survivor set for this round.
    pub fn survivors(&self) -> &BTreeSet<Hsid> {
        &self.survivors
    }

    /// Survivors that have not yet received `reporter`'s report: current survivors
    /// minus whoever `reporter` already reached directly, minus whoever we already
    /// forwarded it to.
    pub fn for_whom_site_is_dead(&self, reporter: Hsid) -> BTreeSet<Hsid> {
        let reached_directly = self.reports.get(&reporter);
        let reached_via_forward = self.delivered.get(&reporter);
        self.survivors
            .iter()
            .filter(|&&site| {
                site != reporter
                    && !reached_directly.map_or(false, |set| set.contains(&site))
                    && !reached_via_forward.map_or(false, |set| set.contains(&site))
            })
            .copied()
            .collect()
    }

    /// `true` while any reporter we have a report for still has survivors that
    /// haven't heard its report.
    pub fn need_forward(&self) -> bool {
        self.reports
            .keys()
            .any(|&reporter| !self.for_whom_site_is_dead(reporter).is_empty())
    }

    /// Resolves the accumulated reports into a kill set, restricted to
    /// `candidates` (the round's in-trouble sites).
    pub fn next_kill(&self, candidates: &BTreeSet<Hsid>) -> BTreeSet<Hsid> {
        match self.strategy {
            KillStrategy::MatchingCardinality => self.matching_cardinality(candidates),
        }
    }

    fn matching_cardinality(&self, candidates: &BTreeSet<Hsid>) -> BTreeSet<Hsid> {
        let mut groups: BTreeMap<BTreeSet<Hsid>, usize> = BTreeMap::new();
        for (reporter, asserted_alive) in &self.reports {
            if !self.survivors.contains(reporter) {
                // A report from a reporter we no longer consider alive is stale.
                continue;
            }
            let declared_dead: BTreeSet<Hsid> =
                candidates.difference(asserted_alive).copied().collect();
            if declared_dead.contains(reporter) {
                // A reporter cannot consistently declare itself dead; ignore.
                continue;
            }
            *groups.entry(declared_dead).or_insert(0) += 1;
        }

        let mut best: Option<(BTreeSet<Hsid>, usize)> = None;
        for (declared_dead, count) in groups {
            let take = match &best {
                None => true,
                Some((best_dead, best_count)) => {
                    if count != *best_count {
                        count > *best_count
                    } else if declared_dead.len() != best_dead.len() {
                        declared_dead.len() < best_dead.len()
                    } else {
                        declared_dead < *best_dead
                    }
                }
            };
            if take {
                best = Some((declared_dead, count));
            }
        }
        best.map(|(dead, _)| dead).unwrap_or_default()
    }

    /// Drops all per-round state.
    pub fn clear(&mut self) {
        self.survivors.clear();
        self.reports.clear();
        self.delivered.clear();
    }
}

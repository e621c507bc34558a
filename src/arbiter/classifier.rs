// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use crate::arbiter::message::FaultMessage;
use crate::hsid::Hsid;
use std::collections::{BTreeMap, BTreeSet};

/// The outcome of classifying an incoming `FaultMessage`. Every variant but `DoNot`
/// means the message carries nothing new and is discarded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscardVerdict {
    /// The message claims we ourselves have failed.
    Suicide,
    /// The named site is already in `failed_sites`.
    AlreadyFailed,
    /// The reporter itself is already in `failed_sites`.
    ReporterFailed,
    /// The named site is not part of the pre-failure mesh.
    Unknown,
    /// The reporter is not part of the pre-failure mesh.
    ReporterUnknown,
    /// An unwitnessed report of our own hearsay; refusing to amplify it.
    SelfUnwitnessed,
    /// We already hold this information: the site is already witnessed-failed, or
    /// the witnessed flag carries nothing new.
    AlreadyKnow,
    /// Late gossip about a site that did not end up killed last round.
    StaleUnwitnessed,
    /// The message carries new information and should enter the round.
    DoNot,
}

impl DiscardVerdict {
    /// `true` for every verdict except `DoNot` -- i.e. every verdict that means the
    /// message should be discarded rather than entering the round.
    pub fn is_discard(self) -> bool {
        !matches!(self, DiscardVerdict::DoNot)
    }
}

/// Stateless classification logic. All the state it reasons about (the pre-failure
/// mesh, `failed_sites`, `in_trouble`, `stale_unwitnessed`, and the seeker's current
/// survivor set) is owned by the driver and passed in by reference.
pub struct DiscardClassifier;

impl DiscardClassifier {
    /// Classifies `fm` against the arbiter's current state. Self-identity is given by
    /// `self_hsid`; ordering of the checks is significant, the first match wins.
    #[allow(clippy::too_many_arguments)]
    pub fn classify(
        self_hsid: Hsid,
        hs_ids: &BTreeSet<Hsid>,
        failed_sites: &BTreeSet<Hsid>,
        in_trouble: &BTreeMap<Hsid, bool>,
        stale_unwitnessed: &BTreeSet<Hsid>,
        current_survivors: &BTreeSet<Hsid>,
        fm: &FaultMessage,
    ) -> DiscardVerdict {
        if fm.failed_site == self_hsid {
            return DiscardVerdict::Suicide;
        }
        if failed_sites.contains(&fm.failed_site) {
            return DiscardVerdict::AlreadyFailed;
        }
        if failed_sites.contains(&fm.reporting_site) {
            return DiscardVerdict::ReporterFailed;
        }
        if !hs_ids.contains(&fm.failed_site) {
            return DiscardVerdict::Unknown;
        }
        if !hs_ids.contains(&fm.reporting_site) {
            return DiscardVerdict::ReporterUnknown;
        }
        if !fm.witnessed && fm.reporting_site == self_hsid {
            return DiscardVerdict::SelfUnwitnessed;
        }
        if let Some(&known_witnessed) = in_trouble.get(&fm.failed_site) {
            if known_witnessed || known_witnessed == fm.witnessed {
                return DiscardVerdict::AlreadyKnow;
            }
        }
        if !fm.witnessed
            && in_trouble.is_empty()
            && stale_unwitnessed.contains(&fm.failed_site)
            && (!fm.survivors.is_disjoint(failed_sites) || &fm.survivors == current_survivors)
        {
            return DiscardVerdict::StaleUnwitnessed;
        }
        DiscardVerdict::DoNot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hsid(n: u64) -> Hsid {
        Hsid::new(n)
    }

    fn mesh(ids: &[u64]) -> BTreeSet<Hsid> {
        ids.iter().cloned().map(Hsid::new).collect()
    }

    fn fm(reporter: u64, failed: u64, witnessed: bool, survivors: &[u64]) -> FaultMessage {
        FaultMessage {
            reporting_site: hsid(reporter),
            failed_site: hsid(failed),
            witnessed,
            survivors: survivors.iter().cloned().map(Hsid::new).collect(),
        }
    }

    #[test]
    fn suicide_wins_over_everything_else() {
        let hs = mesh(&[1, 2, 3]);
        let verdict = DiscardClassifier::classify(
            hsid(1),
            &hs,
            &BTreeSet::new(),
            &BTreeMap::new(),
            &BTreeSet::new(),
            &hs,
            &fm(2, 1, true, &[2, 3]),
        );
        assert_eq!(verdict, DiscardVerdict::Suicide);
    }

    #[test]
    fn self_unwitnessed_is_rejected() {
        let hs = mesh(&[1, 2, 3]);
        let verdict = DiscardClassifier::classify(
            hsid(1),
            &hs,
            &BTreeSet::new(),
            &BTreeMap::new(),
            &BTreeSet::new(),
            &hs,
            &fm(1, 3, false, &[1, 2]),
        );
        assert_eq!(verdict, DiscardVerdict::SelfUnwitnessed);
    }

    #[test]
    fn witnessed_upgrade_is_new_information() {
        let hs = mesh(&[1, 2, 3, 4]);
        let mut in_trouble = BTreeMap::new();
        in_trouble.insert(hsid(3), false);
        let verdict = DiscardClassifier::classify(
            hsid(1),
            &hs,
            &BTreeSet::new(),
            &in_trouble,
            &BTreeSet::new(),
            &hs,
            &fm(2, 3, true, &[1, 2, 4]),
        );
        assert_eq!(verdict, DiscardVerdict::DoNot);
    }

    #[test]
    fn already_witnessed_cannot_be_relearned() {
        let hs = mesh(&[1, 2, 3, 4]);
        let mut in_trouble = BTreeMap::new();
        in_trouble.insert(hsid(3), true);
        let verdict = DiscardClassifier::classify(
            hsid(1),
            &hs,
            &BTreeSet::new(),
            &in_trouble,
            &BTreeSet::new(),
            &hs,
            &fm(2, 3, false, &[1, 2, 4]),
        );
        assert_eq!(verdict, DiscardVerdict::AlreadyKnow);
    }

    #[test]
    fn stale_unwitnessed_gossip_is_dropped() {
        let hs = mesh(&[1, 2, 3, 4]);
        let mut stale = BTreeSet::new();
        stale.insert(hsid(3));
        let failed_sites: BTreeSet<Hsid> = [hsid(5)].iter().cloned().collect();
        let survivors = mesh(&[1, 2, 4]);
        let verdict = DiscardClassifier::classify(
            hsid(1),
            &hs,
            &failed_sites,
            &BTreeMap::new(),
            &stale,
            &survivors,
            &fm(2, 3, false, &[1, 2, 4]),
        );
        assert_eq!(verdict, DiscardVerdict::StaleUnwitnessed);
    }

    #[test]
    fn classifier_is_idempotent_on_unchanged_state() {
        let hs = mesh(&[1, 2, 3, 4]);
        let msg = fm(2, 3, true, &[1, 2, 4]);
        let first = DiscardClassifier::classify(
            hsid(1),
            &hs,
            &BTreeSet::new(),
            &BTreeMap::new(),
            &BTreeSet::new(),
            &hs,
            &msg,
        );
        let second = DiscardClassifier::classify(
            hsid(1),
            &hs,
            &BTreeSet::new(),
            &BTreeMap::new(),
            &BTreeSet::new(),
            &hs,
            &msg,
        );
        assert_eq!(first, second);
    }
}

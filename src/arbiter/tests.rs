// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use super::*;
use crate::aide::StaticMeshAide;
use crate::config::ArbiterConfig;
use crate::mailbox::InProcessMailbox;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn hsid(n: u64) -> Hsid {
    Hsid::new(n)
}

fn mesh(ids: &[u64]) -> BTreeSet<Hsid> {
    ids.iter().copied().map(Hsid::new).collect()
}

fn set(ids: &[u64]) -> BTreeSet<Hsid> {
    ids.iter().copied().map(Hsid::new).collect()
}

fn fast_config() -> ArbiterConfig {
    ArbiterConfig {
        receive_tick: Duration::from_millis(1),
        stall_threshold: Duration::from_millis(20),
        stall_log_interval: Duration::from_millis(20),
    }
}

fn fault(reporter: u64, failed: u64, witnessed: bool, survivors: &[u64]) -> FaultMessage {
    FaultMessage {
        reporting_site: hsid(reporter),
        failed_site: hsid(failed),
        witnessed,
        survivors: set(survivors),
    }
}

fn sfm(source: u64, survivors: &[u64], safe_txn_ids: &[(u64, i64)]) -> SiteFailureMessage {
    SiteFailureMessage {
        source: hsid(source),
        survivors: set(survivors),
        safe_txn_ids: safe_txn_ids.iter().map(|&(h, t)| (hsid(h), t)).collect(),
    }
}

/// Site 1's arbiter, wired to its own mailbox. Peers 2, 4, and 5 are simulated by
/// injecting their reports directly into the mailbox via `deliver`.
fn new_arbiter() -> MeshArbiter<InProcessMailbox, StaticMeshAide> {
    MeshArbiter::with_config(hsid(1), InProcessMailbox::new(), StaticMeshAide::new(), fast_config())
}

#[test]
fn single_witnessed_failure_is_killed_with_agreed_watermark() {
    let mut arbiter = new_arbiter();
    let hs_ids = mesh(&[1, 2, 3, 4]);

    // Peers 2 and 4 will echo their own survivor view once our broadcast arrives,
    // all agreeing S3 is dead.
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2, 4], &[(3, 10)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(4, &[1, 2, 4], &[(3, 10)])));

    let result = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 3, true, &[1, 2, 4]));

    assert_eq!(result, [(hsid(3), 10)].iter().copied().collect());
    assert!(arbiter.failed_sites_for_test().contains(&hsid(3)));
    assert_eq!(arbiter.failed_sites_count(), 1);
    assert!(!arbiter.is_in_arbitration());
}

#[test]
fn unwitnessed_relay_does_not_kill_without_direct_witness() {
    let mut arbiter = new_arbiter();
    let hs_ids = mesh(&[1, 2, 3, 4]);

    // Peers echo back with a watermark guess for S3, but nobody has actually
    // dropped it from their own survivor list -- it's pure hearsay.
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2, 3, 4], &[(3, 7)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(4, &[1, 2, 3, 4], &[(3, 7)])));

    let result = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 3, false, &[1, 2, 4]));

    // The round still resolves -- to an empty kill set -- since every reporter
    // agrees S3 is alive. S3 falls through to stale_unwitnessed rather than
    // lingering in_trouble.
    assert!(result.is_empty());
    assert!(!arbiter.in_trouble_for_test().contains_key(&hsid(3)));
    assert!(arbiter.stale_unwitnessed_for_test().contains(&hsid(3)));
    assert!(!arbiter.is_in_arbitration());
}

#[test]
fn suicide_report_is_discarded() {
    let mut arbiter = new_arbiter();
    let hs_ids = mesh(&[1, 2, 3]);

    let result = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 1, true, &[2, 3]));

    assert!(result.is_empty());
    assert!(arbiter.in_trouble_for_test().is_empty());
    assert!(!arbiter.is_in_arbitration());
}

#[test]
fn dangler_notification_is_sent_once_decision_is_reached() {
    let mut arbiter = new_arbiter();
    let hs_ids = mesh(&[1, 2, 3, 4]);

    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2, 4], &[(3, 5)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(4, &[1, 2, 4], &[(3, 5)])));

    // Unwitnessed: S3 is flagged a dangler, so a SiteFailureMessage about it must
    // go out to the other survivors even though we have no direct witness either.
    let result = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 3, false, &[1, 2, 4]));

    assert_eq!(result, [(hsid(3), 5)].iter().copied().collect());

    // Among the round's outbound traffic (our own broadcast, any forwards, and the
    // dangler notification) is exactly one SiteFailureUpdate carrying the resolved
    // watermark for S3.
    let mut found = false;
    while let Some(WireMessage::SiteFailureUpdate(msg)) = arbiter.mailbox.recv(&[Subject::SiteFailureUpdate]) {
        if msg.safe_txn_ids.get(&hsid(3)) == Some(&5) {
            assert_eq!(msg.source, hsid(1));
            found = true;
        }
    }
    assert!(found, "dangler notification should have been sent");
}

#[test]
fn stale_unwitnessed_gossip_is_dropped_after_round_resolves() {
    let mut arbiter = new_arbiter();
    let hs_ids = mesh(&[1, 2, 3, 4, 5]);

    // S5 fails and gets killed; S3 is independently flagged unwitnessed and, since
    // every reporter still counts it alive, survives the round unkilled.
    arbiter
        .mailbox
        .deliver(WireMessage::Failure(fault(2, 3, false, &[1, 2, 4])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2, 3, 4], &[(3, 7), (5, 1)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(3, &[1, 2, 3, 4], &[(5, 1)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(4, &[1, 2, 3, 4], &[(3, 7), (5, 1)])));
    let result = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 5, true, &[1, 2, 3, 4]));
    assert_eq!(result, [(hsid(5), 1)].iter().copied().collect());
    assert!(arbiter.stale_unwitnessed_for_test().contains(&hsid(3)));

    // Late unwitnessed gossip that still names the since-killed S5 as a survivor is
    // stale and should be classified away rather than re-entering arbitration.
    let remaining = mesh(&[1, 2, 3, 4]);
    let second = arbiter.reconfigure_on_fault(&remaining, fault(2, 3, false, &[1, 2, 4, 5]));
    assert!(second.is_empty());
    assert!(arbiter.in_trouble_for_test().is_empty());
}

#[test]
fn concurrent_fault_mid_round_aborts_without_losing_state() {
    let mailbox = Arc::new(InProcessMailbox::new());
    let mut arbiter = MeshArbiter::with_config(hsid(1), Arc::clone(&mailbox), StaticMeshAide::new(), fast_config());
    let hs_ids = mesh(&[1, 2, 3, 4]);

    // Nobody ever reports on S3, so the round sits in the receive phase's timeout
    // ticks. While it waits, an unrelated fault about S4 arrives.
    let injector = Arc::clone(&mailbox);
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(8));
        injector.deliver(WireMessage::Failure(fault(2, 4, true, &[1, 2, 3])));
    });

    let result = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 3, true, &[1, 2, 4]));

    assert!(result.is_empty());
    // S3 is still tracked: the round was aborted, not abandoned.
    assert!(arbiter.in_trouble_for_test().contains_key(&hsid(3)));

    // The pre-empting fault is picked up on the next call, alongside S3; site 2
    // echoes agreement on both so the round can actually resolve.
    mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2], &[(3, 1), (4, 2)])));
    let result = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 3, true, &[1, 2, 4]));

    assert_eq!(result, [(hsid(3), 1), (hsid(4), 2)].iter().copied().collect());
}

#[test]
fn decisions_never_name_self_and_failed_sites_only_grow() {
    let mut arbiter = new_arbiter();
    let hs_ids = mesh(&[1, 2, 3, 4, 5]);

    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2, 4, 5], &[(3, 1)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(4, &[1, 2, 4, 5], &[(3, 1)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(5, &[1, 2, 4, 5], &[(3, 1)])));
    let first = arbiter.reconfigure_on_fault(&hs_ids, fault(2, 3, true, &[1, 2, 4, 5]));
    assert!(!first.contains_key(&hsid(1)));
    let after_first = arbiter.failed_sites_for_test().clone();

    let remaining = mesh(&[1, 2, 4, 5]);
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2, 5], &[(4, 2)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(5, &[1, 2, 5], &[(4, 2)])));
    let second = arbiter.reconfigure_on_fault(&remaining, fault(2, 4, true, &[1, 2, 5]));
    assert!(!second.contains_key(&hsid(1)));
    assert!(arbiter.failed_sites_for_test().is_superset(&after_first));
}

#[test]
#[should_panic(expected = "invariant violation")]
fn killing_a_subject_with_no_known_safe_txn_is_fatal() {
    let mut arbiter = new_arbiter();
    let hs_ids = mesh(&[1, 2, 3, 4]);

    // Every reporter, including ourselves (via the aide, which has no record for S3),
    // agrees S3 is dead but nobody actually knows its safe transaction watermark --
    // each one reports the unset sentinel explicitly rather than omitting it.
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(2, &[1, 2, 4], &[(3, UNSET_SAFE_TXN)])));
    arbiter.mailbox.deliver(WireMessage::SiteFailureUpdate(sfm(4, &[1, 2, 4], &[(3, UNSET_SAFE_TXN)])));

    arbiter.reconfigure_on_fault(&hs_ids, fault(2, 3, true, &[1, 2, 4]));
}

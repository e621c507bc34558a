// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

//! Distributed agreement over which sites in a full-mesh cluster have failed.
//!
//! Each site in the mesh runs its own [`MeshArbiter`]. When that site's local fault
//! detector suspects a peer, it hands the suspicion to [`MeshArbiter::reconfigure_on_fault`],
//! which gossips with the other survivors until enough of them agree on a kill set,
//! then returns the set of sites to disconnect together with the transaction
//! watermark each of them is safe to resume from. Every site that runs this
//! protocol against the same sequence of inputs reaches the same decision --
//! nothing here depends on wall-clock order, only on what has been received.
//!
//! The crate has no transport or persistence of its own: callers supply a
//! [`Mailbox`] for message exchange and a [`MeshAide`] for querying transaction
//! watermarks and emitting heartbeats. See [`mailbox::InProcessMailbox`] and
//! [`aide::StaticMeshAide`] for the in-memory test doubles this crate's own test
//! suite is built against.

pub mod aide;
pub mod arbiter;
pub mod config;
pub mod error;
pub mod hsid;
pub mod mailbox;

pub use aide::MeshAide;
pub use arbiter::classifier::{DiscardClassifier, DiscardVerdict};
pub use arbiter::ledger::UNSET_SAFE_TXN;
pub use arbiter::message::{FaultMessage, SiteFailureForwardMessage, SiteFailureMessage};
pub use arbiter::seeker::KillStrategy;
pub use arbiter::MeshArbiter;
pub use config::ArbiterConfig;
pub use error::ArbiterError;
pub use hsid::Hsid;
pub use mailbox::{Mailbox, Subject, WireMessage};

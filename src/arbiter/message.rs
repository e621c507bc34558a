// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use crate::error::ArbiterError;
use crate::hsid::Hsid;
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A fault notification, either locally observed or relayed from a peer.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FaultMessage {
    pub reporting_site: Hsid,
    pub failed_site: Hsid,
    pub witnessed: bool,
    pub survivors: BTreeSet<Hsid>,
}

impl fmt::Debug for FaultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FaultMessage {{ reporter: {}, failed: {}, witnessed: {} }}",
            self.reporting_site, self.failed_site, self.witnessed
        )
    }
}

/// A reporter's view of the mesh, broadcast during the send phase or echoed during
/// the receive phase. `safe_txn_ids` carries the watermark the reporter vouches for on
/// behalf of each peer it currently considers in trouble.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SiteFailureMessage {
    pub source: Hsid,
    pub survivors: BTreeSet<Hsid>,
    pub safe_txn_ids: BTreeMap<Hsid, i64>,
}

impl fmt::Debug for SiteFailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SiteFailureMessage {{ source: {}, survivors: {:?}, safe_txn_ids: {:?} }}",
            self.source, self.survivors, self.safe_txn_ids
        )
    }
}

/// A `SiteFailureMessage` relayed to a site that was not an original recipient,
/// tagged with the immediate sender so the receiver can distinguish "I am hearing
/// this straight from the source" from "someone forwarded this to me".
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SiteFailureForwardMessage {
    pub reporter: Hsid,
    pub inner: SiteFailureMessage,
}

impl fmt::Debug for SiteFailureForwardMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SiteFailureForwardMessage {{ reporter: {}, inner: {:?} }}",
            self.reporter, self.inner
        )
    }
}

/// Serializes `value` to its wire form. Round-tripping through `decode` yields a
/// byte-identical re-encoding for the same logical value, since all set/map fields
/// are `BTreeSet`/`BTreeMap` and therefore already iterate in sorted order.
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ArbiterError> {
    bincode::serialize(value).map_err(ArbiterError::Codec)
}

/// Deserializes a value previously produced by `encode`.
pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ArbiterError> {
    bincode::deserialize(bytes).map_err(ArbiterError::Codec)
}

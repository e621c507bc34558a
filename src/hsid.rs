// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A host-site identifier: an opaque, totally ordered 64-bit value naming one peer
/// in the mesh.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Hsid(pub u64);

impl Hsid {
    pub fn new(raw: u64) -> Hsid {
        Hsid(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Hsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Hsid {
    fn from(raw: u64) -> Hsid {
        Hsid(raw)
    }
}

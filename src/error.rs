// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use thiserror::Error;

/// Errors a caller of the arbiter may observe. Everything that is not a caller-visible
/// error is handled internally (discards are log lines, stalls are log lines, a
/// concurrent fault is a graceful empty-map return).
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// A message failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),

    /// An invariant the protocol depends on no longer holds. The caller should treat
    /// this as fatal and crash the site; continuing would let the site act on
    /// assumptions the rest of the cluster no longer shares.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Logs `message` at error level and aborts the process. This is the one place the
/// crate intentionally panics: an invariant violation means this site's view of the
/// cluster can no longer be trusted.
pub fn fatal(message: impl Into<String>) -> ! {
    let message = message.into();
    log::error!("fatal arbiter invariant violation: {}", message);
    panic!("mesh arbiter invariant violation: {}", message);
}

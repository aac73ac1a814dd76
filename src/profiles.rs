//! Latest-profile resolution.
//!
//! An author may publish metadata many times. The newest copy by
//! `created_at` is canonical; on ties the copy stored first wins. The store
//! deletes every superseded copy when it resolves a profile, so resolution
//! is a write as well as a read.

use crate::types::Event;

/// Canonical profile plus the copies it supersedes.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub canonical: Event,
    pub superseded: Vec<Event>,
}

/// Pick the canonical profile among `candidates`, which must be in
/// insertion order. Returns `None` for no candidates.
pub fn resolve_latest(candidates: Vec<Event>) -> Option<Resolution> {
    let best = candidates
        .iter()
        .enumerate()
        .fold(None::<(usize, u64)>, |best, (i, event)| match best {
            Some((_, at)) if event.created_at <= at => best,
            _ => Some((i, event.created_at)),
        })
        .map(|(i, _)| i)?;

    let mut superseded = candidates;
    let canonical = superseded.remove(best);
    Some(Resolution {
        canonical,
        superseded,
    })
}

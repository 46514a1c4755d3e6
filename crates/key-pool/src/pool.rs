//! Credential pool and round-robin selection
//!
//! The pool is an immutable, ordered list of API keys plus a cursor. Order is
//! configuration order; duplicates are kept so an operator can weight a key
//! by listing it twice. Absent and empty slots are dropped at construction.
//!
//! The cursor is an `AtomicUsize` that always satisfies `cursor < len`. It is
//! advanced with a single atomic read-modify-write, so each `take_next` call
//! observes a distinct position even when many requests rotate at once.

use std::sync::atomic::{AtomicUsize, Ordering};

use common::Secret;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// A single upstream API key with the configuration slot it came from.
///
/// `slot` is 1-based and refers to the candidate list given to
/// [`KeyPool::new`], so log lines can point at `OPENROUTER_API_KEY_3` without
/// ever printing the key itself.
#[derive(Debug)]
pub struct Credential {
    slot: usize,
    key: Secret<String>,
}

impl Credential {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn key(&self) -> &Secret<String> {
        &self.key
    }
}

/// Ordered API key pool with a shared rotation cursor.
pub struct KeyPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl KeyPool {
    /// Build a pool from candidate slots in configuration order.
    ///
    /// `None` and empty values are skipped. An empty pool is valid; callers
    /// check `is_empty()` and fail the request instead of the process.
    pub fn new<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = Option<Secret<String>>>,
    {
        let credentials: Vec<Credential> = candidates
            .into_iter()
            .enumerate()
            .filter_map(|(i, candidate)| {
                candidate
                    .filter(|key| !key.is_empty())
                    .map(|key| Credential { slot: i + 1, key })
            })
            .collect();

        if credentials.is_empty() {
            warn!("key pool initialized with no usable API keys");
        } else {
            info!(keys = credentials.len(), "key pool initialized");
        }

        Self {
            credentials,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Return the credential at the cursor and advance the cursor by one,
    /// wrapping at the end of the pool.
    ///
    /// This is the only place the cursor moves.
    pub fn take_next(&self) -> Result<&Credential> {
        let n = self.credentials.len();
        if n == 0 {
            return Err(Error::PoolEmpty);
        }

        // The closure always yields Some, so both arms carry the previous value.
        let position = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % n))
        {
            Ok(prev) | Err(prev) => prev,
        };

        let credential = &self.credentials[position];
        debug!(slot = credential.slot, position, "credential selected");
        Ok(credential)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Position the next `take_next` call will hand out.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Configuration slots of the pooled keys, in rotation order.
    pub fn slots(&self) -> Vec<usize> {
        self.credentials.iter().map(|c| c.slot).collect()
    }
}

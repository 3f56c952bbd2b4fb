use std::sync::atomic::{AtomicBool, Ordering};

use generational_arena::Index;
use parking_lot::Mutex;

const BUFFER_STRIPES: usize = 16; // Power of two for efficient bitmasking.

/// The most reads a stripe holds before further reads are dropped.
const STRIPE_CAPACITY: usize = 64;

/// A striped buffer of reads that could not update the policy immediately.
///
/// Readers that find the policy lock busy record the entry's node here
/// instead of waiting. The next maintenance pass replays the buffered reads in
/// the order each stripe received them. A full stripe drops reads: recency is
/// a hint, and losing one never changes which entries are present.
///
/// A dropped read leaves its entry further back in access order than its
/// access time says, so the next idle sweep must not stop at it. The
/// `dropped` flag tells the sweep to walk past live entries once.
pub(crate) struct ReadBuffer {
  stripes: Box<[Mutex<Vec<Index>>]>,
  dropped: AtomicBool,
}

impl ReadBuffer {
  pub(crate) fn new() -> Self {
    Self {
      stripes: (0..BUFFER_STRIPES)
        .map(|_| Mutex::new(Vec::with_capacity(STRIPE_CAPACITY)))
        .collect(),
      dropped: AtomicBool::new(false),
    }
  }

  /// Records a read. Returns `false` if the stripe was full and it was dropped.
  #[inline]
  pub(crate) fn record(&self, hash: u64, node: Index) -> bool {
    let stripe_idx = hash as usize & (BUFFER_STRIPES - 1);
    let mut stripe = self.stripes[stripe_idx].lock();
    if stripe.len() >= STRIPE_CAPACITY {
      self.dropped.store(true, Ordering::Relaxed);
      return false;
    }
    stripe.push(node);
    true
  }

  /// Returns whether any read was dropped since the last call.
  #[inline]
  pub(crate) fn take_dropped(&self) -> bool {
    self.dropped.swap(false, Ordering::Relaxed)
  }

  /// Hands every buffered read to `apply` and empties the buffer.
  /// Called with the policy lock held.
  pub(crate) fn drain(&self, mut apply: impl FnMut(Index)) {
    for stripe in self.stripes.iter() {
      let batch = {
        let mut guard = stripe.lock();
        if guard.is_empty() {
          continue;
        }
        std::mem::replace(&mut *guard, Vec::with_capacity(STRIPE_CAPACITY))
      };
      batch.into_iter().for_each(&mut apply);
    }
  }
}

//! Eviction ordering and capacity accounting.

pub(crate) mod order_list;

use order_list::{Node, OrderList, Queue};

use generational_arena::Index;

/// Which entry goes first when the cache is over capacity.
///
/// Ties never occur: both orders are strict, so eviction is reproducible for a
/// given sequence of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionOrder {
  /// Evict the least recently read or written entry.
  #[default]
  Lru,
  /// Evict the entry written longest ago, ignoring reads.
  Fifo,
}

/// Tracks every live entry's weight and position.
///
/// The policy only references entries: the store owns them and links to their
/// node by index. The cache core mutates both together under the policy lock.
#[derive(Debug)]
pub(crate) struct EvictionPolicy<K> {
  list: OrderList<K>,
  order: EvictionOrder,
  max_weight: u64,
}

impl<K> EvictionPolicy<K> {
  pub(crate) fn new(order: EvictionOrder, max_weight: u64) -> Self {
    Self {
      list: OrderList::new(),
      order,
      max_weight,
    }
  }

  /// Starts tracking a newly written entry as the most recent one.
  #[inline]
  pub(crate) fn admit(&mut self, key: K, weight: u64) -> Index {
    self.list.push_front(key, weight)
  }

  /// Records a read of the entry behind `node`.
  ///
  /// The access deque is kept in order under both eviction orders because
  /// time-to-idle expiration walks it.
  #[inline]
  pub(crate) fn on_access(&mut self, node: Index) {
    self.list.move_to_front(node);
  }

  #[inline]
  pub(crate) fn on_remove(&mut self, node: Index) -> Option<Node<K>> {
    self.list.remove(node)
  }

  #[inline]
  pub(crate) fn node(&self, node: Index) -> Option<&Node<K>> {
    self.list.get(node)
  }

  #[inline]
  pub(crate) fn max_weight(&self) -> u64 {
    self.max_weight
  }

  #[inline]
  pub(crate) fn is_over_capacity(&self) -> bool {
    self.list.total_weight() > self.max_weight
  }

  /// The next entry to evict for size.
  #[inline]
  pub(crate) fn victim(&self) -> Option<Index> {
    match self.order {
      EvictionOrder::Lru => self.list.tail(Queue::Access),
      EvictionOrder::Fifo => self.list.tail(Queue::Write),
    }
  }

  /// Entries in the order they would lapse under a time-to-live.
  pub(crate) fn oldest_written(&self) -> impl Iterator<Item = Index> + '_ {
    self.list.iter_from_tail(Queue::Write)
  }

  /// Entries in the order they would lapse under a time-to-idle.
  pub(crate) fn least_recently_accessed(&self) -> impl Iterator<Item = Index> + '_ {
    self.list.iter_from_tail(Queue::Access)
  }

  #[inline]
  pub(crate) fn weighted_size(&self) -> u64 {
    self.list.total_weight()
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.list.len()
  }
}

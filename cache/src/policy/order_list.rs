use generational_arena::{Arena, Index};

/// Selects one of the two deques every node is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Queue {
  /// Most recently read or written at the head.
  Access,
  /// Most recently written at the head.
  Write,
}

#[derive(Debug, Default, Clone, Copy)]
struct Links {
  prev: Option<Index>,
  next: Option<Index>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Ends {
  head: Option<Index>,
  tail: Option<Index>,
}

#[derive(Debug)]
pub(crate) struct Node<K> {
  pub(crate) key: K,
  pub(crate) weight: u64,
  access: Links,
  write: Links,
}

impl<K> Node<K> {
  fn links(&self, queue: Queue) -> &Links {
    match queue {
      Queue::Access => &self.access,
      Queue::Write => &self.write,
    }
  }

  fn links_mut(&mut self, queue: Queue) -> &mut Links {
    match queue {
      Queue::Access => &mut self.access,
      Queue::Write => &mut self.write,
    }
  }
}

/// Weighted nodes stored in an arena and threaded onto an access-order and a
/// write-order deque.
///
/// Cache entries hold the generational `Index` of their node. A handle whose
/// node has been removed simply stops resolving, so a late access can never
/// touch a node that now belongs to a different entry.
#[derive(Debug)]
pub(crate) struct OrderList<K> {
  nodes: Arena<Node<K>>,
  access: Ends,
  write: Ends,
  total_weight: u64,
}

impl<K> OrderList<K> {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      access: Ends::default(),
      write: Ends::default(),
      total_weight: 0,
    }
  }

  fn ends(&self, queue: Queue) -> &Ends {
    match queue {
      Queue::Access => &self.access,
      Queue::Write => &self.write,
    }
  }

  fn ends_mut(&mut self, queue: Queue) -> &mut Ends {
    match queue {
      Queue::Access => &mut self.access,
      Queue::Write => &mut self.write,
    }
  }

  // Unlinks a node from one deque. Does not touch the arena.
  fn unlink(&mut self, index: Index, queue: Queue) {
    let Links { prev, next } = *self.nodes[index].links(queue);

    match prev {
      Some(prev_idx) => self.nodes[prev_idx].links_mut(queue).next = next,
      None => self.ends_mut(queue).head = next,
    }
    match next {
      Some(next_idx) => self.nodes[next_idx].links_mut(queue).prev = prev,
      None => self.ends_mut(queue).tail = prev,
    }

    *self.nodes[index].links_mut(queue) = Links::default();
  }

  // Pushes an already-allocated, unlinked node to the head of one deque.
  fn link_front(&mut self, index: Index, queue: Queue) {
    let old_head = self.ends(queue).head;
    *self.nodes[index].links_mut(queue) = Links {
      prev: None,
      next: old_head,
    };

    match old_head {
      Some(old_head) => self.nodes[old_head].links_mut(queue).prev = Some(index),
      None => self.ends_mut(queue).tail = Some(index),
    }
    self.ends_mut(queue).head = Some(index);
  }

  /// Adds a node at the head of both deques.
  pub(crate) fn push_front(&mut self, key: K, weight: u64) -> Index {
    let index = self.nodes.insert(Node {
      key,
      weight,
      access: Links::default(),
      write: Links::default(),
    });
    self.link_front(index, Queue::Access);
    self.link_front(index, Queue::Write);
    self.total_weight += weight;
    index
  }

  /// Moves a node to the head of the access deque. Stale handles are ignored.
  pub(crate) fn move_to_front(&mut self, index: Index) {
    if !self.nodes.contains(index) || self.access.head == Some(index) {
      return;
    }
    self.unlink(index, Queue::Access);
    self.link_front(index, Queue::Access);
  }

  pub(crate) fn remove(&mut self, index: Index) -> Option<Node<K>> {
    if !self.nodes.contains(index) {
      return None;
    }
    self.unlink(index, Queue::Access);
    self.unlink(index, Queue::Write);
    let node = self.nodes.remove(index)?;
    self.total_weight = self.total_weight.saturating_sub(node.weight);
    Some(node)
  }

  #[inline]
  pub(crate) fn get(&self, index: Index) -> Option<&Node<K>> {
    self.nodes.get(index)
  }

  #[inline]
  pub(crate) fn tail(&self, queue: Queue) -> Option<Index> {
    self.ends(queue).tail
  }

  /// Iterates node handles from the tail (coldest) towards the head.
  pub(crate) fn iter_from_tail(&self, queue: Queue) -> impl Iterator<Item = Index> + '_ {
    std::iter::successors(self.tail(queue), move |&index| {
      self.nodes.get(index).and_then(|node| node.links(queue).prev)
    })
  }

  #[inline]
  pub(crate) fn total_weight(&self) -> u64 {
    self.total_weight
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.nodes.len()
  }

  // A helper for tests, to get the order of keys from head to tail.
  #[cfg(test)]
  pub(crate) fn keys(&self, queue: Queue) -> Vec<K>
  where
    K: Clone,
  {
    let mut keys = Vec::new();
    let mut current = self.ends(queue).head;
    while let Some(index) = current {
      keys.push(self.nodes[index].key.clone());
      current = self.nodes[index].links(queue).next;
    }
    keys
  }
}

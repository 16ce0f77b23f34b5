//! Byte-level double-array trie over the vocabulary.
//!
//! The runtime half is [`Trie`], a borrowed view over a flat `u32` unit
//! buffer with cursor-style traversal: reset to root, advance one byte,
//! advance a whole byte slice atomically, read terminal data, or jump to an
//! arbitrary node id. The tokenizer follows failure links by jumping, so
//! node ids are stable, public-within-the-crate values.
//!
//! The offline half is [`TrieBuilder`]: a plain linked trie that the config
//! builder fills with vocabulary keys, then freezes into the double array.
//! Freezing reports the mapping from builder node ids to double-array node
//! ids so failure structures can be written in the runtime id space.
//!
//! # Layout
//!
//! Two `u32` words per slot: `units[2 * id]` is the base, `units[2 * id + 1]`
//! the check. A slot `t` is a valid transition from `s` iff
//! `check[t] == s`. Labels are `byte + 1`; label `0` off a node's base is
//! reserved for its terminal data slot, whose base word holds the encoded
//! token value. A base of `u32::MAX` marks a dead node: every step and
//! every data read from it fails, which is exactly what the punctuation
//! failure sink needs.

use thiserror::Error;

/// Node id of the trie root.
pub(crate) const ROOT_NODE_ID: u32 = 0;

/// Check value of slots that have no parent (the root and free slots).
const NO_PARENT: u32 = u32::MAX;

/// Base value of nodes from which no transition and no data read succeeds.
const DEAD_BASE: u32 = u32::MAX;

/// Errors raised when wrapping a unit buffer.
#[derive(Error, Debug)]
pub enum TrieError {
    #[error("double-array unit buffer is empty or oddly sized")]
    MalformedUnits,
}

/// A traversal position. Plain value type; copy it to checkpoint a walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TrieCursor {
    node: u32,
}

impl TrieCursor {
    /// Node id the cursor currently rests on.
    #[inline]
    pub(crate) fn node(&self) -> u32 {
        self.node
    }
}

/// Read-only double-array trie view over a unit buffer.
pub(crate) struct Trie<'a> {
    units: &'a [u32],
}

impl<'a> Trie<'a> {
    /// Wrap a unit buffer, rejecting buffers that cannot hold a root.
    pub(crate) fn new(units: &'a [u32]) -> Result<Self, TrieError> {
        if units.len() < 2 || units.len() % 2 != 0 {
            return Err(TrieError::MalformedUnits);
        }
        Ok(Self { units })
    }

    /// Number of addressable slots (equals the node id space).
    #[inline]
    pub(crate) fn num_slots(&self) -> usize {
        self.units.len() / 2
    }

    #[inline]
    fn base(&self, node: u32) -> u32 {
        self.units[node as usize * 2]
    }

    #[inline]
    fn check(&self, node: u32) -> u32 {
        self.units[node as usize * 2 + 1]
    }

    /// Cursor positioned at the root.
    #[inline]
    pub(crate) fn root_cursor(&self) -> TrieCursor {
        TrieCursor { node: ROOT_NODE_ID }
    }

    /// Reposition the cursor on an arbitrary node id.
    #[inline]
    pub(crate) fn set(&self, cursor: &mut TrieCursor, node: u32) {
        cursor.node = node;
    }

    /// Advance one byte. On failure the cursor is unchanged.
    #[inline]
    pub(crate) fn try_step(&self, cursor: &mut TrieCursor, byte: u8) -> bool {
        let Some(slot) = self.base(cursor.node).checked_add(byte as u32 + 1) else {
            return false;
        };
        if (slot as usize) < self.num_slots() && self.check(slot) == cursor.node {
            cursor.node = slot;
            return true;
        }
        false
    }

    /// Advance across a whole byte slice, all-or-nothing. On failure the
    /// cursor is unchanged.
    #[inline]
    pub(crate) fn try_step_bytes(&self, cursor: &mut TrieCursor, bytes: &[u8]) -> bool {
        let mut probe = *cursor;
        for &b in bytes {
            if !self.try_step(&mut probe, b) {
                return false;
            }
        }
        *cursor = probe;
        true
    }

    /// Encoded token value of the current node, if it is a terminal.
    #[inline]
    pub(crate) fn try_read_data(&self, cursor: &TrieCursor) -> Option<u32> {
        let slot = self.base(cursor.node);
        if (slot as usize) < self.num_slots() && self.check(slot) == cursor.node {
            return Some(self.base(slot));
        }
        None
    }
}

/// Result of freezing a [`TrieBuilder`] into a double array.
pub(crate) struct FrozenTrie {
    /// Flat unit buffer, two words per slot.
    pub units: Vec<u32>,
    /// Double-array node id for each builder node id.
    pub node_ids: Vec<u32>,
    /// Id of the reserved dead node, when one was requested.
    pub dead_node: Option<u32>,
}

struct BuilderNode {
    /// Outgoing edges, sorted by label byte.
    children: Vec<(u8, usize)>,
    value: Option<u32>,
    parent: usize,
    label: u8,
}

/// Mutable linked trie used while assembling the config.
pub(crate) struct TrieBuilder {
    nodes: Vec<BuilderNode>,
}

impl TrieBuilder {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![BuilderNode {
                children: Vec::new(),
                value: None,
                parent: usize::MAX,
                label: 0,
            }],
        }
    }

    /// Insert a key, creating nodes as needed, and return the node id of
    /// its last byte. A `Some` value marks the node terminal; keys are
    /// deduplicated by the caller, so a terminal is set at most once.
    pub(crate) fn insert(&mut self, key: &[u8], value: Option<u32>) -> usize {
        let mut cur = 0usize;
        for &b in key {
            cur = match self.nodes[cur].children.binary_search_by_key(&b, |&(l, _)| l) {
                Ok(i) => self.nodes[cur].children[i].1,
                Err(i) => {
                    let child = self.nodes.len();
                    self.nodes.push(BuilderNode {
                        children: Vec::new(),
                        value: None,
                        parent: cur,
                        label: b,
                    });
                    self.nodes[cur].children.insert(i, (b, child));
                    child
                }
            };
        }
        if value.is_some() {
            debug_assert!(self.nodes[cur].value.is_none());
            self.nodes[cur].value = value;
        }
        cur
    }

    /// Node id at the end of `key`, if the full path exists.
    pub(crate) fn walk(&self, key: &[u8]) -> Option<usize> {
        let mut cur = 0usize;
        for &b in key {
            cur = self.child(cur, b)?;
        }
        Some(cur)
    }

    /// Child of `node` along `label`, if present.
    pub(crate) fn child(&self, node: usize, label: u8) -> Option<usize> {
        self.nodes[node]
            .children
            .binary_search_by_key(&label, |&(l, _)| l)
            .ok()
            .map(|i| self.nodes[node].children[i].1)
    }

    pub(crate) fn value(&self, node: usize) -> Option<u32> {
        self.nodes[node].value
    }

    pub(crate) fn parent(&self, node: usize) -> usize {
        self.nodes[node].parent
    }

    pub(crate) fn label(&self, node: usize) -> u8 {
        self.nodes[node].label
    }

    pub(crate) fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Builder node ids in breadth-first order, root first.
    pub(crate) fn bfs_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        order.push(0);
        let mut head = 0;
        while head < order.len() {
            let u = order[head];
            head += 1;
            order.extend(self.nodes[u].children.iter().map(|&(_, c)| c));
        }
        order
    }

    /// Freeze into the double-array form. `reserve_dead_node` additionally
    /// claims one isolated slot with a poisoned base.
    pub(crate) fn freeze(&self, reserve_dead_node: bool) -> FrozenTrie {
        let mut slots = DoubleArraySlots::new();
        let mut node_ids = vec![0u32; self.nodes.len()];

        // Root occupies slot 0; children are placed in BFS order so parent
        // slots are always known before their edges are laid out.
        for u in self.bfs_order() {
            let node = &self.nodes[u];
            let u_slot = node_ids[u];

            let mut labels: Vec<u32> = Vec::with_capacity(node.children.len() + 1);
            if node.value.is_some() {
                labels.push(0);
            }
            labels.extend(node.children.iter().map(|&(b, _)| b as u32 + 1));

            if labels.is_empty() {
                slots.set_base(u_slot, DEAD_BASE);
                continue;
            }

            let base = slots.find_base(&labels);
            slots.set_base(u_slot, base);
            if let Some(v) = node.value {
                let data_slot = slots.claim(base, u_slot);
                slots.set_base(data_slot, v);
            }
            for &(b, child) in &node.children {
                node_ids[child] = slots.claim(base + b as u32 + 1, u_slot);
            }
        }

        let dead_node = reserve_dead_node.then(|| {
            let slot = slots.claim_first_free();
            slots.set_base(slot, DEAD_BASE);
            slot
        });

        FrozenTrie {
            units: slots.into_units(),
            node_ids,
            dead_node,
        }
    }
}

/// Slot allocator for the freeze pass.
struct DoubleArraySlots {
    units: Vec<u32>,
    occupied: Vec<bool>,
    first_free: usize,
    /// Rolling floor for multi-label placements; single-label nodes still
    /// fill gaps below it.
    multi_base_hint: usize,
}

impl DoubleArraySlots {
    fn new() -> Self {
        let mut slots = Self {
            units: vec![0, NO_PARENT],
            occupied: vec![true],
            first_free: 1,
            multi_base_hint: 1,
        };
        slots.grow_to(2);
        slots
    }

    fn grow_to(&mut self, len: usize) {
        while self.occupied.len() < len {
            self.occupied.push(false);
            self.units.push(DEAD_BASE);
            self.units.push(NO_PARENT);
        }
    }

    fn is_free(&self, slot: usize) -> bool {
        slot >= self.occupied.len() || !self.occupied[slot]
    }

    /// Smallest base placing every label on a free slot. First-fit from a
    /// rolling floor; bases start at 1 so no transition can land on the
    /// root slot.
    fn find_base(&mut self, labels: &[u32]) -> u32 {
        let first = labels[0] as usize;
        let mut base = self.first_free.saturating_sub(first).max(1);
        if labels.len() > 1 {
            base = base.max(self.multi_base_hint);
        }
        loop {
            if labels.iter().all(|&l| self.is_free(base + l as usize)) {
                if labels.len() > 1 {
                    self.multi_base_hint = base;
                }
                return base as u32;
            }
            base += 1;
        }
    }

    /// Mark `slot` used with the given parent and return it as a node id.
    fn claim(&mut self, slot: u32, parent: u32) -> u32 {
        let s = slot as usize;
        self.grow_to(s + 1);
        debug_assert!(!self.occupied[s]);
        self.occupied[s] = true;
        self.units[s * 2 + 1] = parent;
        while self.first_free < self.occupied.len() && self.occupied[self.first_free] {
            self.first_free += 1;
        }
        slot
    }

    /// Claim the lowest free slot as a self-parented, isolated node.
    fn claim_first_free(&mut self) -> u32 {
        let slot = self.first_free as u32;
        self.claim(slot, slot)
    }

    fn set_base(&mut self, slot: u32, base: u32) {
        let s = slot as usize;
        self.grow_to(s + 1);
        self.units[s * 2] = base;
    }

    fn into_units(self) -> Vec<u32> {
        self.units
    }
}

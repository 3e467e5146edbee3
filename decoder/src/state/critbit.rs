//! One side of a perp order book: a critbit tree stored as a flat array of
//! fixed size nodes, addressed by index from `root_node`.
use bytemuck::{Pod, Zeroable};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use solana_program::pubkey::Pubkey;
use tracing::warn;

use crate::{
    adapters::{OrderKey, UnixTimestamp, LeI64, LeU128, LeU32, LeU64},
    error::{MangoError, MangoResult},
    utils::{cast_layout, check_size},
};

use super::{AccountLayout, DataType, MetaData, OrderType, Side};

/// Size in bytes of one node slot.
pub const NODE_SIZE: usize = 88;
/// Node slots in a book side account.
pub const MAX_BOOK_NODES: usize = 1024;

/// Index of a node slot.
pub type NodeHandle = u32;
/// Raw bytes of one node slot, before the tag is looked at.
pub type AnyNode = [u8; NODE_SIZE];

/// Leading tag of a node slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum NodeTag {
    Uninitialized = 0,
    Inner = 1,
    Leaf = 2,
    Free = 3,
    LastFree = 4,
}

/// Byte layout of an [`InnerNode`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct InnerNodeLayout {
    pub tag: LeU32,
    pub prefix_len: LeU32,
    pub key: LeU128,
    pub children: [LeU32; 2],
    pub child_earliest_expiry: [LeU64; 2],
    pub padding: [u8; 40],
}

/// Byte layout of a [`LeafNode`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct LeafNodeLayout {
    pub tag: LeU32,
    pub owner_slot: u8,
    pub order_type: u8,
    pub version: u8,
    pub time_in_force: u8,
    pub key: OrderKey,
    pub owner: Pubkey,
    pub quantity: LeI64,
    pub client_order_id: LeU64,
    pub best_initial: LeI64,
    pub timestamp: UnixTimestamp,
}

/// Shared by `Free` and `LastFree` nodes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct FreeNodeLayout {
    pub tag: LeU32,
    pub next: LeU32,
    pub reserved: [u8; NODE_SIZE - 8],
}

/// Header of a book side account, before the node slots.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BookSideHeader {
    pub meta_data: MetaData,
    pub bump_index: LeU64,
    pub free_list_len: LeU64,
    pub free_list_head: LeU32,
    pub root_node: LeU32,
    pub leaf_count: LeU64,
}

/// Byte layout of a [`BookSide`] account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BookSideLayout {
    pub header: BookSideHeader,
    pub nodes: [AnyNode; MAX_BOOK_NODES],
}

/// A branch of the tree. Every key below it shares its first `prefix_len` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerNode {
    /// Length of the shared prefix; the next bit picks the child.
    pub prefix_len: u32,
    /// A key carrying the shared prefix.
    pub key: u128,
    /// Children for a critical bit of 0 and of 1.
    pub children: [NodeHandle; 2],
    /// Earliest expiry below each child, `u64::MAX` for none.
    pub child_earliest_expiry: [u64; 2],
}

impl InnerNode {
    /// Child to follow for `search_key` and which side it is on.
    pub fn walk_down(&self, search_key: u128) -> (NodeHandle, bool) {
        let crit_bit_mask = (1u128 << 127) >> self.prefix_len.min(127);
        let crit_bit = (search_key & crit_bit_mask) != 0;
        (self.children[crit_bit as usize], crit_bit)
    }
}

/// A resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafNode {
    /// Order slot in the owner's margin account.
    pub owner_slot: u8,
    #[allow(missing_docs)]
    pub order_type: OrderType,
    /// Layout version of the node.
    pub version: u8,
    /// Seconds after `timestamp` at which the order expires, zero for never.
    pub time_in_force: u8,
    /// Price and sequence number.
    pub key: OrderKey,
    /// The owner's margin account.
    pub owner: Pubkey,
    /// Remaining quantity in base lots.
    pub quantity: i64,
    #[allow(missing_docs)]
    pub client_order_id: u64,
    /// Best opposite price when the order was placed, for liquidity mining.
    pub best_initial: i64,
    /// When the order was placed.
    pub timestamp: UnixTimestamp,
}

impl LeafNode {
    /// Price in lots, the high half of the key.
    pub fn price(&self) -> i64 {
        self.key.price() as i64
    }

    /// The full key, as used to cancel the order.
    pub fn order_id(&self) -> u128 {
        self.key.as_u128()
    }

    /// Expiry in seconds since the epoch, `None` for orders that never expire.
    pub fn expires_at(&self) -> Option<u64> {
        match self.time_in_force {
            0 => None,
            tif => Some(self.timestamp.seconds().saturating_add(tif as u64)),
        }
    }

    /// Whether the order has not expired at `now_seconds`.
    pub fn is_valid(&self, now_seconds: u64) -> bool {
        self.expires_at().map_or(true, |expiry| now_seconds < expiry)
    }
}

/// A decoded node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Never used since the account was created.
    Uninitialized,
    #[allow(missing_docs)]
    Inner(InnerNode),
    #[allow(missing_docs)]
    Leaf(LeafNode),
    /// A released slot; `next` links the free list.
    #[allow(missing_docs)]
    Free { next: NodeHandle },
    /// The end of the free list.
    #[allow(missing_docs)]
    LastFree { next: NodeHandle },
}

impl Node {
    #[allow(missing_docs)]
    pub fn tag(&self) -> NodeTag {
        match self {
            Node::Uninitialized => NodeTag::Uninitialized,
            Node::Inner(_) => NodeTag::Inner,
            Node::Leaf(_) => NodeTag::Leaf,
            Node::Free { .. } => NodeTag::Free,
            Node::LastFree { .. } => NodeTag::LastFree,
        }
    }

    /// Decodes one node by its leading tag. The variant layout covers the
    /// whole node, tag included.
    pub fn decode(data: &[u8]) -> MangoResult<Self> {
        check_size("Node", NODE_SIZE, data)?;
        let mut raw_tag = [0u8; 4];
        raw_tag.copy_from_slice(&data[..4]);
        let raw_tag = u32::from_le_bytes(raw_tag);
        let tag = NodeTag::try_from(raw_tag).map_err(|_| MangoError::UnknownTag {
            kind: "node",
            tag: raw_tag,
        })?;

        match tag {
            NodeTag::Uninitialized => {
                if data[4..].iter().any(|b| *b != 0) {
                    return Err(MangoError::InvalidNodeLayout {
                        variant: "Uninitialized",
                    });
                }
                Ok(Node::Uninitialized)
            }
            NodeTag::Inner => {
                let inner: &InnerNodeLayout = cast_layout("InnerNode", data)?;
                Ok(Node::Inner(InnerNode {
                    prefix_len: inner.prefix_len.get(),
                    key: inner.key.get(),
                    children: [inner.children[0].get(), inner.children[1].get()],
                    child_earliest_expiry: [
                        inner.child_earliest_expiry[0].get(),
                        inner.child_earliest_expiry[1].get(),
                    ],
                }))
            }
            NodeTag::Leaf => {
                let leaf: &LeafNodeLayout = cast_layout("LeafNode", data)?;
                Ok(Node::Leaf(LeafNode {
                    owner_slot: leaf.owner_slot,
                    order_type: OrderType::from_raw(leaf.order_type)?,
                    version: leaf.version,
                    time_in_force: leaf.time_in_force,
                    key: leaf.key,
                    owner: leaf.owner,
                    quantity: leaf.quantity.get(),
                    client_order_id: leaf.client_order_id.get(),
                    best_initial: leaf.best_initial.get(),
                    timestamp: leaf.timestamp,
                }))
            }
            NodeTag::Free | NodeTag::LastFree => {
                let free: &FreeNodeLayout = cast_layout("FreeNode", data)?;
                let next = free.next.get();
                if free.reserved.iter().any(|b| *b != 0) {
                    return Err(MangoError::InvalidNodeLayout {
                        variant: if tag == NodeTag::Free {
                            "Free"
                        } else {
                            "LastFree"
                        },
                    });
                }
                Ok(if tag == NodeTag::Free {
                    Node::Free { next }
                } else {
                    Node::LastFree { next }
                })
            }
        }
    }

    /// Inverse of [`Node::decode`].
    pub fn encode(&self) -> AnyNode {
        let tag = LeU32::new(self.tag().into());
        match self {
            Node::Uninitialized => [0; NODE_SIZE],
            Node::Inner(inner) => bytemuck::cast(InnerNodeLayout {
                tag,
                prefix_len: LeU32::new(inner.prefix_len),
                key: LeU128::new(inner.key),
                children: [
                    LeU32::new(inner.children[0]),
                    LeU32::new(inner.children[1]),
                ],
                child_earliest_expiry: [
                    LeU64::new(inner.child_earliest_expiry[0]),
                    LeU64::new(inner.child_earliest_expiry[1]),
                ],
                padding: [0; 40],
            }),
            Node::Leaf(leaf) => bytemuck::cast(LeafNodeLayout {
                tag,
                owner_slot: leaf.owner_slot,
                order_type: leaf.order_type.into(),
                version: leaf.version,
                time_in_force: leaf.time_in_force,
                key: leaf.key,
                owner: leaf.owner,
                quantity: LeI64::new(leaf.quantity),
                client_order_id: LeU64::new(leaf.client_order_id),
                best_initial: LeI64::new(leaf.best_initial),
                timestamp: leaf.timestamp,
            }),
            Node::Free { next } | Node::LastFree { next } => bytemuck::cast(FreeNodeLayout {
                tag,
                next: LeU32::new(*next),
                reserved: [0; NODE_SIZE - 8],
            }),
        }
    }
}

/// Decoded bids or asks account. The node arena is rebuilt on every decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSide {
    #[allow(missing_docs)]
    pub meta_data: MetaData,
    /// Taken from the account's data type.
    pub side: Side,
    /// Slots below this index have been used at least once.
    pub bump_index: u64,
    #[allow(missing_docs)]
    pub free_list_len: u64,
    #[allow(missing_docs)]
    pub free_list_head: NodeHandle,
    /// Only meaningful while `leaf_count` is non-zero.
    pub root_node: NodeHandle,
    /// Number of resting orders.
    pub leaf_count: u64,
    /// Every node slot, in account order.
    pub nodes: Vec<Node>,
}

impl BookSide {
    /// Account data length.
    pub const LEN: usize = std::mem::size_of::<BookSideLayout>();

    /// Builds a book side holding `leaves`, laid out as a fresh tree with no
    /// free list. Duplicate keys keep their first occurrence.
    pub fn from_leaves(side: Side, mut leaves: Vec<LeafNode>) -> MangoResult<Self> {
        leaves.sort_by_key(LeafNode::order_id);
        leaves.dedup_by_key(|leaf| leaf.order_id());
        // n leaves need n - 1 inner nodes
        if leaves.len() > (MAX_BOOK_NODES + 1) / 2 {
            return Err(MangoError::MalformedTree(format!(
                "{} orders do not fit in {} nodes",
                leaves.len(),
                MAX_BOOK_NODES
            )));
        }

        let mut nodes = Vec::with_capacity(MAX_BOOK_NODES);
        let root_node = if leaves.is_empty() {
            0
        } else {
            build_subtree(&leaves, &mut nodes)
        };
        let bump_index = nodes.len() as u64;
        nodes.resize(MAX_BOOK_NODES, Node::Uninitialized);

        let data_type = match side {
            Side::Bid => DataType::Bids,
            Side::Ask => DataType::Asks,
        };
        Ok(BookSide {
            meta_data: MetaData::new(data_type, 0, true),
            side,
            bump_index,
            free_list_len: 0,
            free_list_head: 0,
            root_node,
            leaf_count: leaves.len() as u64,
            nodes,
        })
    }

    /// Inverse of [`AccountLayout::decode`].
    pub fn encode(&self) -> Vec<u8> {
        let header = BookSideHeader {
            meta_data: self.meta_data,
            bump_index: LeU64::new(self.bump_index),
            free_list_len: LeU64::new(self.free_list_len),
            free_list_head: LeU32::new(self.free_list_head),
            root_node: LeU32::new(self.root_node),
            leaf_count: LeU64::new(self.leaf_count),
        };
        let mut data = Vec::with_capacity(Self::LEN);
        data.extend_from_slice(bytemuck::bytes_of(&header));
        for node in self.nodes.iter().take(MAX_BOOK_NODES) {
            data.extend_from_slice(&node.encode());
        }
        data.resize(Self::LEN, 0);
        data
    }

    /// No resting orders.
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Walks the tree from the root, yielding leaves by ascending or
    /// descending key. Free nodes are skipped.
    pub fn iter_ordered(&self, ascending: bool) -> BookSideIter<'_> {
        BookSideIter {
            book_side: self,
            search_stack: if self.is_empty() {
                vec![]
            } else {
                vec![self.root_node]
            },
            ascending,
            visited: 0,
            failed: false,
        }
    }

    /// Every resting order, best price first.
    pub fn orders(&self) -> MangoResult<Vec<LeafNode>> {
        let ascending = self.side == Side::Ask;
        self.iter_ordered(ascending)
            .map(|leaf| leaf.copied())
            .collect()
    }

    /// Order with the smallest key.
    pub fn find_min(&self) -> MangoResult<Option<&LeafNode>> {
        self.find_min_max(false)
    }

    /// Order with the largest key.
    pub fn find_max(&self) -> MangoResult<Option<&LeafNode>> {
        self.find_min_max(true)
    }

    /// Best order of this side: the highest bid or the lowest ask.
    pub fn best(&self) -> MangoResult<Option<&LeafNode>> {
        self.find_min_max(self.side == Side::Bid)
    }

    fn find_min_max(&self, find_max: bool) -> MangoResult<Option<&LeafNode>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut current = self.root_node;
        for _ in 0..self.nodes.len() {
            match self.node(current)? {
                Node::Inner(inner) => current = inner.children[find_max as usize],
                Node::Leaf(leaf) => return Ok(Some(leaf)),
                other => {
                    return Err(MangoError::MalformedTree(format!(
                        "{:?} node {} on the path from the root",
                        other.tag(),
                        current
                    )))
                }
            }
        }
        Err(self.walk_too_long())
    }

    /// The order whose full key is `search_key`.
    pub fn find_by_key(&self, search_key: u128) -> MangoResult<Option<&LeafNode>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut current = self.root_node;
        for _ in 0..self.nodes.len() {
            match self.node(current)? {
                Node::Leaf(leaf) => {
                    return Ok((leaf.order_id() == search_key).then_some(leaf));
                }
                Node::Inner(inner) => {
                    let common_prefix_len = (search_key ^ inner.key).leading_zeros();
                    if common_prefix_len < inner.prefix_len {
                        return Ok(None);
                    }
                    current = inner.walk_down(search_key).0;
                }
                _ => return Ok(None),
            }
        }
        Err(self.walk_too_long())
    }

    fn node(&self, handle: NodeHandle) -> MangoResult<&Node> {
        self.nodes.get(handle as usize).ok_or_else(|| {
            MangoError::MalformedTree(format!(
                "node index {} out of range for {} nodes",
                handle,
                self.nodes.len()
            ))
        })
    }

    fn walk_too_long(&self) -> MangoError {
        MangoError::MalformedTree(format!(
            "walk visited more than {} nodes",
            self.nodes.len()
        ))
    }
}

fn build_subtree(leaves: &[LeafNode], nodes: &mut Vec<Node>) -> NodeHandle {
    if let [leaf] = leaves {
        nodes.push(Node::Leaf(*leaf));
        return (nodes.len() - 1) as NodeHandle;
    }
    let first = leaves[0].order_id();
    let last = leaves[leaves.len() - 1].order_id();
    let prefix_len = (first ^ last).leading_zeros();
    let crit_bit_mask = (1u128 << 127) >> prefix_len;
    let split = leaves.partition_point(|leaf| leaf.order_id() & crit_bit_mask == 0);

    let handle = nodes.len();
    nodes.push(Node::Uninitialized);
    let left = build_subtree(&leaves[..split], nodes);
    let right = build_subtree(&leaves[split..], nodes);
    let expiry = |side: &[LeafNode]| {
        side.iter()
            .filter_map(LeafNode::expires_at)
            .min()
            .unwrap_or(u64::MAX)
    };
    nodes[handle] = Node::Inner(InnerNode {
        prefix_len,
        key: first,
        children: [left, right],
        child_earliest_expiry: [expiry(&leaves[..split]), expiry(&leaves[split..])],
    });
    handle as NodeHandle
}

impl AccountLayout for BookSide {
    const NAME: &'static str = "BookSide";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let layout: &BookSideLayout = cast_layout(Self::NAME, data)?;
        let header = &layout.header;
        let side = match header.meta_data.data_type() {
            Some(DataType::Bids) => Side::Bid,
            Some(DataType::Asks) => Side::Ask,
            _ => {
                return Err(MangoError::WrongAccountType {
                    expected: DataType::Bids,
                    actual: header.meta_data.data_type,
                })
            }
        };
        let nodes = layout
            .nodes
            .iter()
            .map(|node| Node::decode(node))
            .collect::<MangoResult<Vec<_>>>()?;
        Ok(BookSide {
            meta_data: header.meta_data,
            side,
            bump_index: header.bump_index.get(),
            free_list_len: header.free_list_len.get(),
            free_list_head: header.free_list_head.get(),
            root_node: header.root_node.get(),
            leaf_count: header.leaf_count.get(),
            nodes,
        })
    }
}

/// Bounded in-order walk over a [`BookSide`]. Stops after the first error.
pub struct BookSideIter<'a> {
    book_side: &'a BookSide,
    search_stack: Vec<NodeHandle>,
    ascending: bool,
    visited: usize,
    failed: bool,
}

impl<'a> Iterator for BookSideIter<'a> {
    type Item = MangoResult<&'a LeafNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some(current) = self.search_stack.pop() {
            self.visited += 1;
            if self.visited > self.book_side.nodes.len() {
                self.failed = true;
                return Some(Err(self.book_side.walk_too_long()));
            }
            let node = match self.book_side.node(current) {
                Ok(node) => node,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            match node {
                Node::Inner(inner) => {
                    self.search_stack.push(inner.children[self.ascending as usize]);
                    self.search_stack.push(inner.children[!self.ascending as usize]);
                }
                Node::Leaf(leaf) => return Some(Ok(leaf)),
                Node::Free { .. } | Node::LastFree { .. } => {}
                Node::Uninitialized => {
                    warn!(node = current, side = ?self.book_side.side, "uninitialized node reached from the root");
                }
            }
        }
        None
    }
}

//! Two-sided view of a perp order book.
use solana_program::pubkey::Pubkey;

use crate::{
    error::{MangoError, MangoResult},
    state::{critbit::LeafNode, BookSide, DataType, Side},
};

/// Aggregated quantity resting at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price in lots.
    pub price: i64,
    /// Total quantity in base lots.
    pub quantity: i64,
    /// Number of orders at this price.
    pub orders: usize,
}

/// Both sides of a perp market. Bids are ordered by descending price and asks
/// by ascending price; orders at the same price keep their tree order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    bids: Vec<LeafNode>,
    asks: Vec<LeafNode>,
}

impl OrderBook {
    /// Build the book from a decoded bids side and asks side.
    pub fn from_book_sides(bids: &BookSide, asks: &BookSide) -> MangoResult<Self> {
        expect_side(bids, Side::Bid)?;
        expect_side(asks, Side::Ask)?;

        let mut bid_orders = bids
            .iter_ordered(false)
            .map(|leaf| leaf.copied())
            .collect::<MangoResult<Vec<_>>>()?;
        let mut ask_orders = asks
            .iter_ordered(true)
            .map(|leaf| leaf.copied())
            .collect::<MangoResult<Vec<_>>>()?;
        bid_orders.sort_by_key(|leaf| std::cmp::Reverse(leaf.price()));
        ask_orders.sort_by_key(LeafNode::price);

        Ok(OrderBook {
            bids: bid_orders,
            asks: ask_orders,
        })
    }

    #[allow(missing_docs)]
    pub fn bids(&self) -> &[LeafNode] {
        &self.bids
    }

    #[allow(missing_docs)]
    pub fn asks(&self) -> &[LeafNode] {
        &self.asks
    }

    /// The orders of one side, best first.
    pub fn orders(&self, side: Side) -> &[LeafNode] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Highest bid.
    pub fn top_bid(&self) -> Option<&LeafNode> {
        self.bids.first()
    }

    /// Lowest ask.
    pub fn top_ask(&self) -> Option<&LeafNode> {
        self.asks.first()
    }

    /// Best ask minus best bid, in price lots.
    pub fn spread(&self) -> Option<i64> {
        Some(self.top_ask()?.price() - self.top_bid()?.price())
    }

    /// The first `levels` price levels of `side`, best first.
    pub fn l2_depth(&self, side: Side, levels: usize) -> Vec<PriceLevel> {
        let mut result: Vec<PriceLevel> = Vec::with_capacity(levels);
        for leaf in self.orders(side) {
            match result.last_mut() {
                Some(level) if level.price == leaf.price() => {
                    level.quantity += leaf.quantity;
                    level.orders += 1;
                }
                _ => {
                    if result.len() == levels {
                        break;
                    }
                    result.push(PriceLevel {
                        price: leaf.price(),
                        quantity: leaf.quantity,
                        orders: 1,
                    });
                }
            }
        }
        result
    }

    /// Orders of both sides placed by `owner`, bids first.
    pub fn orders_by_owner<'a>(
        &'a self,
        owner: &'a Pubkey,
    ) -> impl Iterator<Item = (Side, &'a LeafNode)> + 'a {
        let bids = self.bids.iter().map(|leaf| (Side::Bid, leaf));
        let asks = self.asks.iter().map(|leaf| (Side::Ask, leaf));
        bids.chain(asks).filter(move |(_, leaf)| &leaf.owner == owner)
    }

    /// Drops orders whose time in force has run out at `now_seconds`.
    pub fn without_expired(&self, now_seconds: u64) -> Self {
        let valid = |orders: &[LeafNode]| {
            orders
                .iter()
                .filter(|leaf| leaf.is_valid(now_seconds))
                .copied()
                .collect()
        };
        OrderBook {
            bids: valid(&self.bids),
            asks: valid(&self.asks),
        }
    }
}

fn expect_side(book_side: &BookSide, side: Side) -> MangoResult {
    if book_side.side != side {
        return Err(MangoError::WrongAccountType {
            expected: match side {
                Side::Bid => DataType::Bids,
                Side::Ask => DataType::Asks,
            },
            actual: book_side.meta_data.data_type,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{OrderKey, UnixTimestamp},
        state::OrderType,
    };

    fn order(side: Side, price: u64, sequence: u64, quantity: i64, owner: Pubkey) -> LeafNode {
        // bids store the inverted sequence so earlier orders sort first when
        // walking by descending key
        let sequence = match side {
            Side::Bid => !sequence,
            Side::Ask => sequence,
        };
        LeafNode {
            owner_slot: 0,
            order_type: OrderType::Limit,
            version: 1,
            time_in_force: 0,
            key: OrderKey::new(price, sequence),
            owner,
            quantity,
            client_order_id: 0,
            best_initial: 0,
            timestamp: UnixTimestamp::from_seconds(100),
        }
    }

    fn sample_book() -> (OrderBook, Pubkey) {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let bids = BookSide::from_leaves(
            Side::Bid,
            vec![
                order(Side::Bid, 99, 1, 5, alice),
                order(Side::Bid, 100, 2, 1, bob),
                order(Side::Bid, 99, 3, 2, bob),
                order(Side::Bid, 97, 4, 7, alice),
            ],
        )
        .unwrap();
        let asks = BookSide::from_leaves(
            Side::Ask,
            vec![
                order(Side::Ask, 103, 5, 3, bob),
                order(Side::Ask, 101, 6, 4, alice),
                order(Side::Ask, 103, 7, 6, alice),
            ],
        )
        .unwrap();
        (OrderBook::from_book_sides(&bids, &asks).unwrap(), alice)
    }

    #[test]
    fn sides_are_ordered_best_first() {
        let (book, _) = sample_book();
        let bids: Vec<(i64, i64)> = book.bids().iter().map(|l| (l.price(), l.quantity)).collect();
        assert_eq!(bids, vec![(100, 1), (99, 5), (99, 2), (97, 7)]);
        let asks: Vec<(i64, i64)> = book.asks().iter().map(|l| (l.price(), l.quantity)).collect();
        assert_eq!(asks, vec![(101, 4), (103, 3), (103, 6)]);

        assert_eq!(book.top_bid().unwrap().price(), 100);
        assert_eq!(book.top_ask().unwrap().price(), 101);
        assert_eq!(book.spread(), Some(1));
    }

    #[test]
    fn l2_depth_aggregates_levels() {
        let (book, _) = sample_book();
        assert_eq!(
            book.l2_depth(Side::Bid, 2),
            vec![
                PriceLevel {
                    price: 100,
                    quantity: 1,
                    orders: 1
                },
                PriceLevel {
                    price: 99,
                    quantity: 7,
                    orders: 2
                },
            ]
        );
        assert_eq!(book.l2_depth(Side::Ask, 10).len(), 2);
        assert_eq!(book.l2_depth(Side::Ask, 0), vec![]);
    }

    #[test]
    fn orders_by_owner() {
        let (book, alice) = sample_book();
        let mine: Vec<(Side, i64)> = book
            .orders_by_owner(&alice)
            .map(|(side, leaf)| (side, leaf.price()))
            .collect();
        assert_eq!(
            mine,
            vec![(Side::Bid, 99), (Side::Bid, 97), (Side::Ask, 101), (Side::Ask, 103)]
        );
    }

    #[test]
    fn expired_orders_are_dropped() {
        let owner = Pubkey::new_unique();
        let mut short_lived = order(Side::Ask, 50, 1, 1, owner);
        short_lived.time_in_force = 10;
        let asks = BookSide::from_leaves(
            Side::Ask,
            vec![short_lived, order(Side::Ask, 60, 2, 1, owner)],
        )
        .unwrap();
        let bids = BookSide::from_leaves(Side::Bid, vec![]).unwrap();
        let book = OrderBook::from_book_sides(&bids, &asks).unwrap();
        assert_eq!(book.top_ask().unwrap().price(), 50);
        assert_eq!(book.without_expired(110).top_ask().unwrap().price(), 60);
        assert_eq!(book.spread(), None);
    }

    #[test]
    fn sides_must_match() {
        let bids = BookSide::from_leaves(Side::Bid, vec![]).unwrap();
        assert!(matches!(
            OrderBook::from_book_sides(&bids, &bids),
            Err(MangoError::WrongAccountType {
                expected: DataType::Asks,
                actual: 5
            })
        ));
    }
}

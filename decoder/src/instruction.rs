//! Payloads of the protocol instructions a client most often builds or inspects.
//!
//! An instruction is a little-endian `u32` discriminant followed by its
//! parameters in borsh encoding. Account lists and signing are left to the
//! caller.
use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    error::{MangoError, MangoResult},
    state::{OrderType, Side},
};

/// A decoded instruction payload.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MangoInstruction {
    /// Deposit `quantity` native tokens into a margin account.
    Deposit { quantity: u64 },
    /// Withdraw `quantity` native tokens, borrowing the shortfall if allowed.
    Withdraw { quantity: u64, allow_borrow: bool },
    /// Place an order on a perp market. Price and quantity are in lots.
    PlacePerpOrder {
        price: i64,
        quantity: i64,
        client_order_id: u64,
        side: Side,
        order_type: OrderType,
        reduce_only: bool,
    },
    /// Cancel a perp order by the id its owner chose.
    CancelPerpOrderByClientId {
        client_order_id: u64,
        invalid_id_ok: bool,
    },
    /// Cancel a perp order by its book key.
    CancelPerpOrder { order_id: i128, invalid_id_ok: bool },
    /// Process up to `limit` events of a perp event queue.
    ConsumeEvents { limit: u64 },
    /// Settle the free balances of a spot open orders account.
    SettleFunds,
    /// Cancel up to `limit` of the caller's orders on a perp market.
    CancelAllPerpOrders { limit: u8 },
}

impl MangoInstruction {
    /// The on-chain instruction index.
    pub fn discriminant(&self) -> u32 {
        match self {
            MangoInstruction::Deposit { .. } => 2,
            MangoInstruction::Withdraw { .. } => 3,
            MangoInstruction::PlacePerpOrder { .. } => 12,
            MangoInstruction::CancelPerpOrderByClientId { .. } => 13,
            MangoInstruction::CancelPerpOrder { .. } => 14,
            MangoInstruction::ConsumeEvents { .. } => 15,
            MangoInstruction::SettleFunds => 19,
            MangoInstruction::CancelAllPerpOrders { .. } => 39,
        }
    }

    /// Encode the discriminant and the parameters.
    pub fn pack(&self) -> MangoResult<Vec<u8>> {
        let mut data = self.discriminant().to_le_bytes().to_vec();
        let writer = &mut data;
        match *self {
            MangoInstruction::Deposit { quantity } => quantity.serialize(writer)?,
            MangoInstruction::Withdraw {
                quantity,
                allow_borrow,
            } => (quantity, allow_borrow).serialize(writer)?,
            MangoInstruction::PlacePerpOrder {
                price,
                quantity,
                client_order_id,
                side,
                order_type,
                reduce_only,
            } => (price, quantity, client_order_id, side, order_type, reduce_only)
                .serialize(writer)?,
            MangoInstruction::CancelPerpOrderByClientId {
                client_order_id,
                invalid_id_ok,
            } => (client_order_id, invalid_id_ok).serialize(writer)?,
            MangoInstruction::CancelPerpOrder {
                order_id,
                invalid_id_ok,
            } => (order_id, invalid_id_ok).serialize(writer)?,
            MangoInstruction::ConsumeEvents { limit } => limit.serialize(writer)?,
            MangoInstruction::SettleFunds => {}
            MangoInstruction::CancelAllPerpOrders { limit } => limit.serialize(writer)?,
        }
        Ok(data)
    }

    /// Decode a payload produced by [`MangoInstruction::pack`] or by another client.
    pub fn unpack(data: &[u8]) -> MangoResult<Self> {
        if data.len() < 4 {
            return Err(MangoError::SizeMismatch {
                layout: "MangoInstruction",
                expected: 4,
                actual: data.len(),
            });
        }
        let (tag, params) = data.split_at(4);
        let mut raw_tag = [0u8; 4];
        raw_tag.copy_from_slice(tag);
        let tag = u32::from_le_bytes(raw_tag);

        let instruction = match tag {
            2 => MangoInstruction::Deposit {
                quantity: u64::try_from_slice(params)?,
            },
            3 => {
                let (quantity, allow_borrow) = <(u64, bool)>::try_from_slice(params)?;
                MangoInstruction::Withdraw {
                    quantity,
                    allow_borrow,
                }
            }
            12 => {
                let (price, quantity, client_order_id, side, order_type, reduce_only) =
                    <(i64, i64, u64, Side, OrderType, bool)>::try_from_slice(params)?;
                MangoInstruction::PlacePerpOrder {
                    price,
                    quantity,
                    client_order_id,
                    side,
                    order_type,
                    reduce_only,
                }
            }
            13 => {
                let (client_order_id, invalid_id_ok) = <(u64, bool)>::try_from_slice(params)?;
                MangoInstruction::CancelPerpOrderByClientId {
                    client_order_id,
                    invalid_id_ok,
                }
            }
            14 => {
                let (order_id, invalid_id_ok) = <(i128, bool)>::try_from_slice(params)?;
                MangoInstruction::CancelPerpOrder {
                    order_id,
                    invalid_id_ok,
                }
            }
            15 => MangoInstruction::ConsumeEvents {
                limit: u64::try_from_slice(params)?,
            },
            19 => {
                if !params.is_empty() {
                    return Err(MangoError::SizeMismatch {
                        layout: "SettleFunds",
                        expected: 4,
                        actual: data.len(),
                    });
                }
                MangoInstruction::SettleFunds
            }
            39 => MangoInstruction::CancelAllPerpOrders {
                limit: u8::try_from_slice(params)?,
            },
            _ => {
                return Err(MangoError::UnknownTag {
                    kind: "instruction",
                    tag,
                })
            }
        };
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_perp_order_layout() {
        let instruction = MangoInstruction::PlacePerpOrder {
            price: 1500,
            quantity: -3,
            client_order_id: 99,
            side: Side::Ask,
            order_type: OrderType::PostOnly,
            reduce_only: true,
        };
        let data = instruction.pack().unwrap();
        assert_eq!(data.len(), 4 + 8 + 8 + 8 + 3);
        assert_eq!(&data[..4], &12u32.to_le_bytes());
        assert_eq!(&data[4..12], &1500i64.to_le_bytes());
        assert_eq!(&data[12..20], &(-3i64).to_le_bytes());
        assert_eq!(&data[28..], &[1, 2, 1]);
        assert_eq!(MangoInstruction::unpack(&data).unwrap(), instruction);
    }

    #[test]
    fn pack_unpack() {
        let instructions = [
            MangoInstruction::Deposit { quantity: 10 },
            MangoInstruction::Withdraw {
                quantity: 7,
                allow_borrow: false,
            },
            MangoInstruction::CancelPerpOrderByClientId {
                client_order_id: 5,
                invalid_id_ok: true,
            },
            MangoInstruction::CancelPerpOrder {
                order_id: -(1i128 << 100),
                invalid_id_ok: false,
            },
            MangoInstruction::ConsumeEvents { limit: 8 },
            MangoInstruction::SettleFunds,
            MangoInstruction::CancelAllPerpOrders { limit: 20 },
        ];
        for instruction in instructions {
            let data = instruction.pack().unwrap();
            assert_eq!(MangoInstruction::unpack(&data).unwrap(), instruction);
        }
    }

    #[test]
    fn unpack_errors() {
        assert!(matches!(
            MangoInstruction::unpack(&[0, 1]),
            Err(MangoError::SizeMismatch { expected: 4, actual: 2, .. })
        ));
        assert!(matches!(
            MangoInstruction::unpack(&100u32.to_le_bytes()),
            Err(MangoError::UnknownTag {
                kind: "instruction",
                tag: 100
            })
        ));
        // truncated parameters
        let mut data = MangoInstruction::Deposit { quantity: 1 }.pack().unwrap();
        data.pop();
        assert!(matches!(
            MangoInstruction::unpack(&data),
            Err(MangoError::Io(_))
        ));
        // trailing bytes
        let mut data = MangoInstruction::SettleFunds.pack().unwrap();
        data.push(0);
        assert!(MangoInstruction::unpack(&data).is_err());
    }
}

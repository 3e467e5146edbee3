#![warn(missing_docs)]
/*!
Client-side decoding of Mango v3 and Serum account data, and live tracking of
the markets built on it.

## Overview

Every protocol record lives in a ledger account as a fixed little-endian
`repr(C)` layout. The layouts in [`state`] mirror them byte for byte; a buffer
whose length differs from a layout is rejected with
[`SizeMismatch`][`error::MangoError::SizeMismatch`], which is how version skew
shows up. Raw byte windows are interpreted through the align-1 adapters in
[`adapters`]: 80.48 fixed point becomes a [`rust_decimal::Decimal`], all-zero
keys become `None`, packed order keys split into price and sequence number.

## Order books

A book side is a critbit tree stored as an arena of 88-byte tagged nodes.
[`BookSide`][`state::BookSide`] decodes the arena and walks it without
recursion, yielding resting orders best price first. [`OrderBook`][`orderbook::OrderBook`]
pairs both sides and aggregates price levels.

## Event queues

Fills, outs and liquidations are appended to a ring buffer. An
[`EventQueue`][`state::event_queue::EventQueue`] snapshot exposes the live
window, and an [`UnseenEventTracker`][`tracker::UnseenEventTracker`] turns a
sequence of snapshots into the events published in between, reporting
explicitly when events were overwritten before they could be seen.

## Fetching accounts

[`AccountLoader`][`loader::AccountLoader`] fetches snapshots through any
[`AccountSource`][`loader::AccountSource`], batching large requests.
[`SubscriptionManager`][`subscription::SubscriptionManager`] keeps accounts
live over one pubsub websocket, decoding every notification and broadcasting
the typed value to local receivers.
*/

/// Loaded account snapshots
pub mod account;
/// Byte adapters used by the account layouts
pub mod adapters;
/// Client configuration read from the environment
pub mod config;
/// Error types
pub mod error;
/// Instruction payload encoding
pub mod instruction;
/// Batched account snapshot loading
pub mod loader;
/// Aggregated two-sided order book view
pub mod orderbook;
/// Describes the account layouts of the protocol and the serum dex
pub mod state;
/// Live account subscriptions
pub mod subscription;
/// Unseen event detection across event queue snapshots
pub mod tracker;
/// Utility functions
pub mod utils;

pub use account::{AccountInfo, Decoded};
pub use config::ClientConfig;
pub use error::{MangoError, MangoResult};
pub use state::AccountLayout;

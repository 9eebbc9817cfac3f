// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Chain Syncer Module
//!
//! Turns the Lens contracts' log stream into reconciled projections, one
//! block window at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      BlockWindowScheduler                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────┐    │
//! │  │    ChainRpc     │   │ LensEventDecoder│   │    Reconciler    │    │
//! │  │                 │──▶│                 │──▶│                  │    │
//! │  │  - Height cache │   │  - ABI decode   │   │  - Classify      │    │
//! │  │  - Retry logic  │   │  - Dedup by key │   │  - Dispatch      │    │
//! │  └─────────────────┘   └─────────────────┘   └──────────────────┘    │
//! │                                                        │             │
//! │                                         commit syncedBlock (cursor)  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The synced block cursor only moves after the whole batch has been
//! applied, so a crash replays at most the last uncommitted windows.

pub mod abi;
pub mod eth;
pub mod events;
pub mod types;
pub mod window;

pub use abi::LensEventDecoder;
pub use eth::EthRpc;
pub use events::{ChainEvent, EventCategory, EventKey, EventKind, LensEvent, PublicationCreated};
pub use types::{BlockRange, ChainRpc, SyncError, SyncResult};
pub use window::{BlockWindowConfig, BlockWindowScheduler, TickOutcome};

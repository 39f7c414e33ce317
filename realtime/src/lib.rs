// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Broadcast side of the tally.
//!
//! - [`UpdateEvent`]: payload of the `update` event on the shared channel.
//! - [`Publisher`]: seam to whatever pub/sub service carries the channel.
//! - [`ChannelHub`]: in-process channel built on `tokio::sync::broadcast`.
//! - [`StatePublisher`]: best-effort wrapper the ledger publishes through; it
//!   never fails the mutation that triggered it.

pub mod event;
pub mod hub;
pub mod publisher;

pub use event::{PublishFlags, UPDATE_EVENT_NAME, UpdateEvent};
pub use hub::{ChannelHub, ChannelMessage};
pub use publisher::{PublishError, Publisher, StatePublisher};

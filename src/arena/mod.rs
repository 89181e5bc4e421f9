//! Are.na directory client: channel search and channel contents.

mod client;
mod types;

pub use client::{ArenaClient, ChannelDirectory};
pub use types::{Block, BlockKind, Channel};

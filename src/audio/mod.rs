//! # Audio Module
//!
//! Per-guild playback engine for the bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Song Queue
//! - Blocking FIFO `dequeue` plus index, rotate, shuffle and remove
//! - Queue-position ETA estimation
//!
//! ### [`session`] - Playback Session
//! - One state machine and one background driver task per guild
//! - Pause/resume, loop, volume, vote-to-skip and skip-to
//! - Idle timeout and idempotent teardown
//!
//! ### [`registry`] - Session Registry
//! - Process-wide `GuildId -> Session` map with atomic get-or-create
//!
//! ### [`voice`] - Voice Boundary
//! - Traits for the voice connection and playback handle
//! - Songbird-backed implementation
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! # use std::sync::Arc;
//! # use serenity::model::id::{ChannelId, GuildId};
//! # use vibe_bot::audio::{queue::Song, registry::SessionRegistry};
//! # async fn example(registry: Arc<SessionRegistry>, song: Song) -> anyhow::Result<()> {
//! let session = registry.get_or_create(GuildId::new(123456789));
//! session.join(ChannelId::new(987654321)).await?;
//! let queued = session.enqueue(song)?;
//! println!("position {} eta {:?}", queued.position + 1, queued.eta);
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod registry;
pub mod session;
pub mod voice;

#[cfg(test)]
pub mod testing;

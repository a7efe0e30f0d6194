//! # Audio Module
//!
//! Playback and processing of the soundboard clips.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Queue
//! - One [`queue::GuildPlaybackState`] per guild behind an async mutex
//! - Completion events arrive through a `flume` channel and advance the queue
//! - Voice connection with retries and channel moves
//!
//! ### [`voice`] - Voice Backend
//! - [`voice::VoiceBackend`] trait in front of songbird
//! - Exactly-once completion notification per play request
//!
//! ### [`editor`] - Audio Edits
//! - Cut, reverse and speed change through `ffmpeg`
//! - Output written to a temporary file and persisted only on success
//!
//! ### [`probe`] - Metadata
//! - Clip duration read from container metadata with `symphonia`

pub mod editor;
pub mod player;
pub mod probe;
pub mod queue;
pub mod voice;

//! Dialogue Engine — plays branching, tagged dialogue for games.
//!
//! A `DialogueSession` walks a story graph one line at a time, reveals each
//! line on a virtual clock with typing blips, gates player input, offers
//! choices, and turns inline tags into speaker changes, audio profile swaps
//! and quest updates.

pub mod core;
pub mod schema;

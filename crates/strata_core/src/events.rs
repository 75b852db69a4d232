//! # Lifecycle Events
//!
//! The closed set of game events that can move allocator cursors outside
//! the allocate/release path.
//!
//! Every strategy handles events with an exhaustive `match`, so adding an
//! event forces a decision in each strategy instead of silently doing
//! nothing.

use std::fmt;

use crate::error::AllocResult;

/// Game lifecycle events delivered by the harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleEvent {
    /// A system has finished with scratch memory.
    FlushScratch,
    /// The game is initialising.
    GameInit,
    /// A level begins to load.
    LevelBeginLoad,
    /// Level loading is complete.
    LevelLoadComplete,
    /// The current level is being unloaded.
    LevelUnload,
    /// The game is shutting down.
    GameShutdown,
    /// A frame has finished.
    NextFrame,
}

impl LifecycleEvent {
    /// Every event, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::FlushScratch,
        Self::GameInit,
        Self::LevelBeginLoad,
        Self::LevelLoadComplete,
        Self::LevelUnload,
        Self::GameShutdown,
        Self::NextFrame,
    ];

    /// Stable snake_case name, used in configuration files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FlushScratch => "flush_scratch",
            Self::GameInit => "game_init",
            Self::LevelBeginLoad => "level_begin_load",
            Self::LevelLoadComplete => "level_load_complete",
            Self::LevelUnload => "level_unload",
            Self::GameShutdown => "game_shutdown",
            Self::NextFrame => "next_frame",
        }
    }

    /// Looks an event up by its [`name`](Self::name).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }

    /// Position in [`ALL`](Self::ALL).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a strategy did with an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventResponse {
    /// The event changed allocator state.
    Applied,
    /// The strategy has no use for the event.
    Ignored,
}

/// Reacts to lifecycle events.
pub trait LifecycleHandler {
    /// Applies `event` to the allocator.
    ///
    /// # Errors
    ///
    /// Returns the strategy's error when the event cannot be applied,
    /// e.g. a rollback without a marker.
    fn on_event(&mut self, event: LifecycleEvent) -> AllocResult<EventResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for event in LifecycleEvent::ALL {
            assert_eq!(LifecycleEvent::from_name(event.name()), Some(event));
        }
        assert_eq!(LifecycleEvent::from_name("next_frames"), None);
    }

    #[test]
    fn test_index_matches_declaration_order() {
        for (i, event) in LifecycleEvent::ALL.into_iter().enumerate() {
            assert_eq!(event.index(), i);
        }
    }
}

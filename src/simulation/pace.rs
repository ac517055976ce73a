use serde::{Deserialize, Serialize};

/// Playback speed of the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Speed {
    #[default]
    X1,
    X2,
    X5,
    /// No delay between ticks.
    Unbounded,
}

impl Speed {
    /// Parse the control-channel spelling: "1", "2", "5" or "max".
    pub fn parse(s: &str) -> Option<Speed> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "1x" | "x1" => Some(Speed::X1),
            "2" | "2x" | "x2" => Some(Speed::X2),
            "5" | "5x" | "x5" => Some(Speed::X5),
            "max" | "unbounded" | "inf" => Some(Speed::Unbounded),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Speed::X1 => "1x",
            Speed::X2 => "2x",
            Speed::X5 => "5x",
            Speed::Unbounded => "max",
        }
    }
}

/// Delay before the next tick at `speed`, given the 1x delay.
pub fn tick_delay_ms(speed: Speed, base_ms: u64) -> u64 {
    match speed {
        Speed::X1 => base_ms,
        Speed::X2 => base_ms / 2,
        Speed::X5 => base_ms / 5,
        Speed::Unbounded => 0,
    }
}

/// An active fast-forward to the next bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkSkip {
    pub prior_speed: Speed,
    pub bookmark_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaceState {
    pub skip: Option<BookmarkSkip>,
}

impl PaceState {
    pub fn is_skipping(&self) -> bool {
        self.skip.is_some()
    }

    /// Start skipping. Returns the speed to run at.
    ///
    /// A second request while already skipping keeps the original prior
    /// speed and bookmark count.
    pub fn begin_skip(&mut self, current: Speed, bookmark_count: usize) -> Speed {
        if self.skip.is_none() {
            self.skip = Some(BookmarkSkip {
                prior_speed: current,
                bookmark_count,
            });
        }
        Speed::Unbounded
    }

    /// Called after every tick. Returns the speed to restore once a new
    /// bookmark has appeared, ending the skip.
    pub fn settle(&mut self, bookmark_count: usize) -> Option<Speed> {
        let skip = self.skip?;
        if bookmark_count > skip.bookmark_count {
            self.skip = None;
            Some(skip.prior_speed)
        } else {
            None
        }
    }

    pub fn cancel(&mut self) {
        self.skip = None;
    }
}

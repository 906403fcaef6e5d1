// Difficulty levels and the proof-of-work acceptance predicate.
//
// Difficulty is a three-level leading-zero family over the lowercase-hex
// block hash, retargeted one step at a time from observed mine times.

use std::fmt;

use colored::*;

/// Escalate when a block mines faster than this (seconds).
const FAST_MINE_SECS: f64 = 10.0;
/// Relax when a block mines slower than this (seconds).
const SLOW_MINE_SECS: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Parse a wire-level difficulty string. Unknown levels are treated
    /// as easy, with a warning.
    pub fn parse(level: &str) -> Difficulty {
        match level {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            other => {
                eprintln!(
                    "{} invalid difficulty level {other:?}, using easy as default",
                    "[chain]".yellow().bold()
                );
                Difficulty::Easy
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Acceptance predicate over a lowercase-hex hash.
    ///
    ///   easy     hash starts with 5 zeros
    ///   medium   hash starts with "000000", "000001" or "000002"
    ///   hard     hash starts with 6 zeros
    pub fn is_met_by(&self, hash: &str) -> bool {
        match self {
            Difficulty::Easy => hash.starts_with("00000"),
            Difficulty::Medium => {
                hash.starts_with("000000")
                    || hash.starts_with("000001")
                    || hash.starts_with("000002")
            }
            Difficulty::Hard => hash.starts_with("000000"),
        }
    }

    /// One retarget step from an observed mine time: escalate below 10 s,
    /// relax above 20 s, hold otherwise.
    pub fn adjust(self, mine_time: f64) -> Difficulty {
        if mine_time < FAST_MINE_SECS {
            match self {
                Difficulty::Easy => Difficulty::Medium,
                Difficulty::Medium => Difficulty::Hard,
                Difficulty::Hard => Difficulty::Hard,
            }
        } else if mine_time > SLOW_MINE_SECS {
            match self {
                Difficulty::Hard => Difficulty::Medium,
                Difficulty::Medium => Difficulty::Easy,
                Difficulty::Easy => Difficulty::Easy,
            }
        } else {
            self
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

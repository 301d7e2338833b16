use std::sync::atomic::{AtomicU64, Ordering};

use crate::{errors::Error, Result};

/// Seconds to sleep between broadcast sweeps. Shared by the menu and the broadcaster.
#[derive(Debug)]
pub struct Interval(AtomicU64);

impl Interval {
    pub fn new(secs: u64) -> Self {
        Self(AtomicU64::new(secs))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Apply a delta, floored at zero. Returns the new value.
    pub fn apply(&self, delta: IntervalDelta) -> u64 {
        let prev = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(delta.apply_to(cur))
            })
            .unwrap_or_else(|cur| cur);
        delta.apply_to(prev)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalDelta {
    Add(u64),
    Sub(u64),
}

impl IntervalDelta {
    /// Parse keyboard input such as `➕10` or `➖1`. ASCII `+`/`-` are accepted too.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut chars = input.chars();
        let sign = chars
            .next()
            .ok_or_else(|| Error::InvalidInput("empty interval input".to_string()))?;
        let digits = chars.as_str().trim();
        if !digits.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!("invalid interval amount: {input}")));
        }
        let amount: u64 = digits
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid interval amount: {input}")))?;

        match sign {
            '➕' | '+' => Ok(Self::Add(amount)),
            '➖' | '-' => Ok(Self::Sub(amount)),
            other => Err(Error::InvalidInput(format!("unknown interval sign: {other}"))),
        }
    }

    fn apply_to(self, cur: u64) -> u64 {
        match self {
            Self::Add(n) => cur.saturating_add(n),
            Self::Sub(n) => cur.saturating_sub(n),
        }
    }
}

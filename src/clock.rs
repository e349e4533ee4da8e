use core::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of file timestamps, in milliseconds since the Unix epoch.
///
/// A fixed value freezes time, which is what makes test runs reproducible;
/// the sentinel `-1` (the default) means "wall clock now". A callback lets a
/// harness advance time however it likes.
#[derive(Clone)]
pub enum Clock {
    Millis(i64),
    Callback(Arc<dyn Fn() -> i64 + Send + Sync>),
}

impl Clock {
    pub fn fixed(millis: i64) -> Self {
        Clock::Millis(millis)
    }

    pub fn from_fn(f: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Clock::Callback(Arc::new(f))
    }

    /// The current time according to this clock.
    pub fn now(&self) -> i64 {
        match self {
            Clock::Millis(millis) if *millis >= 0 => *millis,
            Clock::Millis(_) => wall_clock_millis(),
            Clock::Callback(f) => f(),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::Millis(-1)
    }
}

impl From<i64> for Clock {
    fn from(millis: i64) -> Self {
        Clock::Millis(millis)
    }
}

impl From<SystemTime> for Clock {
    fn from(time: SystemTime) -> Self {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Clock::Millis(millis)
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Clock::Millis(millis) => f.debug_tuple("Millis").field(millis).finish(),
            Clock::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

fn wall_clock_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

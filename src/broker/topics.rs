//! Topic layout under the configured base topic.

use std::fmt;

/// Liveness value published retained on the status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusValue {
    Online,
    Offline,
}

impl StatusValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusValue::Online => "online",
            StatusValue::Offline => "offline",
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved topic names: `<base>/status` and `<base>/event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    status: String,
    event: String,
}

impl Topics {
    /// Builds the topic set; trailing `/` on the base are trimmed.
    pub fn new(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            status: format!("{base}/status"),
            event: format!("{base}/event"),
        }
    }

    #[inline]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[inline]
    pub fn event(&self) -> &str {
        &self.event
    }
}

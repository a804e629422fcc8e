//! Operator notifications.
//!
//! Every session operation reports its outcome as a short-lived [`Notice`].
//! The sink is injected so the controller decides how notices are shown.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::DEFAULT_NOTICE_TTL_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl NoticeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub raised_at: Instant,
    pub ttl: Duration,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            raised_at: Instant::now(),
            ttl: Duration::from_secs(DEFAULT_NOTICE_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) >= self.ttl
    }
}

/// Destination for notices.
pub trait Notices {
    fn push(&mut self, notice: Notice);
}

/// Writes notices to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotices;

impl Notices for TracingNotices {
    fn push(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Warning | NoticeLevel::Danger => {
                warn!(level = notice.level.as_str(), "{}", notice.message)
            }
            _ => info!(level = notice.level.as_str(), "{}", notice.message),
        }
    }
}

/// Queue of visible notices. Expired notices are dropped on access, which is
/// how notices auto-dismiss.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    ttl: Option<Duration>,
    queue: VecDeque<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board that stamps every incoming notice with the given lifetime.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            queue: VecDeque::new(),
        }
    }

    /// Notices still visible at `now`.
    pub fn visible(&mut self, now: Instant) -> impl Iterator<Item = &Notice> {
        self.queue.retain(|n| !n.is_expired(now));
        self.queue.iter()
    }

    /// Remove and return everything queued, expired or not.
    pub fn drain(&mut self) -> Vec<Notice> {
        self.queue.drain(..).collect()
    }

    pub fn last(&self) -> Option<&Notice> {
        self.queue.back()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Notices for NoticeBoard {
    fn push(&mut self, notice: Notice) {
        TracingNotices.push(notice.clone());
        let notice = match self.ttl {
            Some(ttl) => notice.with_ttl(ttl),
            None => notice,
        };
        self.queue.push_back(notice);
    }
}

// src/formatting.rs

use crate::classify::Classification;
use crate::core::{NotificationMessage, RawEvent};
use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Number of characters of the container id shown in notifications.
pub const SHORT_ID_LEN: usize = 8;

/// Renders classified events into markdown notifications.
#[derive(Debug, Clone)]
pub struct Renderer {
    offset: FixedOffset,
    footer: Option<String>,
    mention_all: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(utc(), None, true)
    }
}

impl Renderer {
    /// `offset` fixes the timezone used for timestamps; `footer` is appended
    /// to the publication line when set.
    pub fn new(offset: FixedOffset, footer: Option<String>, mention_all: bool) -> Self {
        Self {
            offset,
            footer: footer.filter(|f| !f.trim().is_empty()),
            mention_all,
        }
    }

    pub fn render(&self, event: &RawEvent, classification: &Classification) -> NotificationMessage {
        let (title, heading) = match classification {
            Classification::Unhealthy => ("Service unhealthy", "Service is down"),
            Classification::Healthy => ("Service recovered", "Service is healthy again"),
            Classification::Other(_) => ("Container event", "Container event"),
        };

        let published = format_timestamp(event.time, &self.offset);
        let footer = match &self.footer {
            Some(footer) => format!("{} via {}", published, footer),
            None => published,
        };

        let body = format!(
            "#### {}\n> ID: {}\n\n> Name: {}\n\n> Status: {}\n\n> ###### Published {}\n",
            heading,
            short_id(&event.id),
            event.name(),
            classification,
            footer
        );

        NotificationMessage {
            title: title.to_string(),
            body,
            mention_all: self.mention_all,
        }
    }
}

/// The first [`SHORT_ID_LEN`] characters of `id`, or all of it if shorter.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Formats epoch seconds as `month/day hour:minute:second` in `offset`.
pub fn format_timestamp(secs: Option<i64>, offset: &FixedOffset) -> String {
    match secs.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
        Some(time) => time
            .with_timezone(offset)
            .format("%-m/%-d %H:%M:%S")
            .to_string(),
        None => "unknown time".to_string(),
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

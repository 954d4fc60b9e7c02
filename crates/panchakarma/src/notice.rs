//! User-facing notices.
//!
//! A notice is the transient message shown after an action: a title, a
//! description and whether it reports a failure. Errors become notices with
//! their message shown verbatim.

use serde::Serialize;

use crate::error::Error;

/// How a notice should be presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    /// Informational or success.
    #[default]
    Default,
    /// Something failed.
    Destructive,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    /// A success or informational notice.
    #[must_use]
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    /// A failure notice with a fixed description.
    #[must_use]
    pub fn failure(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }

    /// A failure notice describing `err` with its own message.
    #[must_use]
    pub fn from_error(title: impl Into<String>, err: &Error) -> Self {
        Self::failure(title, err.to_string())
    }

    /// True for failure notices.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.variant == NoticeVariant::Destructive
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}: {}", self.title, self.description)
        }
    }
}

//! # Bookmark (§3)
//!
//! An opaque causal-consistency token returned by the server after a
//! transaction completes and fed back into the next BEGIN so a session's
//! transactions observe each other's writes. The driver never interprets
//! its contents, only stores and forwards it.

/// An opaque bookmark string. Cloneable and cheap to pass around; the
/// empty bookmark means "no causal ordering constraint yet".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookmark(Option<String>);

impl Bookmark {
    pub fn empty() -> Self {
        Bookmark(None)
    }

    pub fn new(value: impl Into<String>) -> Self {
        Bookmark(Some(value.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl From<Option<String>> for Bookmark {
    fn from(value: Option<String>) -> Self {
        Bookmark(value)
    }
}

use std::fmt;
use std::sync::Arc;

/// Opaque payload relayed verbatim from the producer to every subscriber.
///
/// Cloning is cheap; the text is shared, never copied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message(Arc<str>);

impl Message {
    pub fn new(payload: impl Into<Arc<str>>) -> Self {
        Self(payload.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Message {
    fn from(payload: String) -> Self {
        Self::new(payload)
    }
}

impl From<&str> for Message {
    fn from(payload: &str) -> Self {
        Self::new(payload)
    }
}

impl AsRef<str> for Message {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

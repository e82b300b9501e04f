use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Opaque reference to an SDK-managed object (session, publisher, stream,
/// subscriber or connection).
///
/// Handles compare by identity: two handles are equal when they carry the
/// same id, regardless of where they were created.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Handle(Arc<str>);

impl Handle {
    /// Fresh handle with a random UUID v4 id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Handle {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for Handle {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed recipient identifier backed by ULID.
///
/// Generated once when a recipient is registered into a
/// [`RecipientsCollection`](crate::collection::RecipientsCollection) and carried
/// through every result entry so callers can correlate outcomes back to the
/// registration that produced them.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RecipientId(pub ulid::Ulid);

impl RecipientId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id)
    }
}

impl Default for RecipientId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RecipientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecipientId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(RecipientId(id))
    }
}

use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Wraps guest contact data so it never shows up in `Debug`/`Display` output.
///
/// Serialization passes the real value through: API responses and the
/// notifier need it, log lines must not.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_masked_but_json_is_not() {
        let email = Masked::new("guest@example.com".to_string());

        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"guest@example.com\"");

        let back: Masked<String> = serde_json::from_str("\"a@b.c\"").unwrap();
        assert_eq!(back.expose(), "a@b.c");
    }
}

use derive_more::{Display, From};
use thiserror::Error;

/// A store key.
///
/// A key is a `/` separated sequence of non-empty components, for example `c/0/1`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StoreKey(String);

/// An invalid store key.
#[derive(Debug, From, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Create a new store key from `key` without validation.
    ///
    /// # Safety
    ///
    /// `key` is not validated, so this can result in an invalid store key.
    #[must_use]
    pub unsafe fn new_unchecked(key: impl Into<String>) -> Self {
        let key = key.into();
        debug_assert!(Self::validate(&key));
        Self(key)
    }

    /// Extracts a string slice of the underlying Key [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    ///
    /// A key must be non-empty, must not start or end with `/`, and must not contain empty, `.` or `..` components.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty()
            && key
                .split('/')
                .all(|component| !component.is_empty() && component != "." && component != "..")
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

/// A store prefix.
///
/// A prefix is either empty or a sequence of key components terminated by `/`, for example `c/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Debug, From, Error)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate()`].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    /// Create a new root store prefix.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Extracts a string slice of the underlying prefix [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a prefix.
    ///
    /// A prefix must be empty or a valid [`StoreKey`] followed by a trailing `/`.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty()
            || prefix
                .strip_suffix('/')
                .is_some_and(StoreKey::validate)
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, Self::Error> {
        Self::new(prefix)
    }
}

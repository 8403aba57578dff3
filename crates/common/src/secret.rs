//! Redacting wrapper for passwords and other credentials held in memory

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value. Redacted in Debug/Display and zeroed on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Keep the borrow short and never log it.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Read a secret string from a file, dropping trailing line endings.
    /// An empty file yields `None`.
    pub fn from_file(path: &std::path::Path) -> std::io::Result<Option<Self>> {
        let mut contents = std::fs::read_to_string(path)?;
        let trimmed = contents.trim_end_matches(['\r', '\n']).len();
        contents.truncate(trimmed);
        if contents.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(contents)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

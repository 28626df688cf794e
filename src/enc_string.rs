//! Transport-encoded strings.
//!
//! Every name, description, mimetype and path that crosses the client/server
//! boundary travels percent-encoded (the same alphabet as JavaScript's
//! `encodeURIComponent`). [`EncodedString`] keeps the encoded form and decodes
//! on demand.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A percent-encoded string as exchanged with the server.
///
/// Serialized as a bare JSON string. Deserialization also accepts the
/// `{"_encoded_string_data": "..."}` object form used by older web clients.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EncodedString(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum WireString {
    Bare(String),
    Wrapped {
        #[serde(rename = "_encoded_string_data", default)]
        encoded: String,
    },
}

impl<'de> Deserialize<'de> for EncodedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match WireString::deserialize(deserializer)? {
            WireString::Bare(encoded) | WireString::Wrapped { encoded } => Self(encoded),
        })
    }
}

impl EncodedString {
    /// Wrap a string that is already percent-encoded.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encode a plain string.
    ///
    /// # Example
    /// ```
    /// use reposfs::EncodedString;
    /// let name = EncodedString::from_plain("my file.txt");
    /// assert_eq!(name.encoded(), "my%20file.txt");
    /// assert_eq!(name.plain(), "my file.txt");
    /// ```
    pub fn from_plain(plain: &str) -> Self {
        Self(urlencoding::encode(plain).into_owned())
    }

    /// Decoded text.
    ///
    /// Sequences that do not decode to valid UTF-8 are replaced with U+FFFD
    /// instead of failing, so a malformed server value still displays.
    pub fn plain(&self) -> String {
        match urlencoding::decode(&self.0) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(self.0.as_bytes()))
                .into_owned(),
        }
    }

    /// Raw encoded text, suitable for headers and URLs.
    pub fn encoded(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for EncodedString {
    fn from(plain: &str) -> Self {
        Self::from_plain(plain)
    }
}

impl From<String> for EncodedString {
    fn from(plain: String) -> Self {
        Self::from_plain(&plain)
    }
}

impl fmt::Debug for EncodedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for EncodedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain())
    }
}

use std::fmt::{Display, Formatter};

use data_encoding::BASE64;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// Number of random bytes in a validation number.
pub const VALIDATION_BYTES: usize = 128;

/// An anonymous, single-use voting credential, base64-encoded.
///
/// The encoded string is also the exact byte payload that gets signed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationNumber(String);

impl ValidationNumber {
    /// Draw a fresh validation number from the operating system's CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0; VALIDATION_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(BASE64.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<String> for ValidationNumber {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl From<&str> for ValidationNumber {
    fn from(encoded: &str) -> Self {
        Self(encoded.to_string())
    }
}

impl Display for ValidationNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

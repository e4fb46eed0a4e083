//! Request bodies accepted by the two servers.

use serde::{Deserialize, Serialize};

use crate::model::{signature::Signature, token::ValidationNumber};

/// A voter's registration attempt with the credential authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub secret: String,
}

/// A signed validation number presented to the tally service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub vn: ValidationNumber,
    pub sig: Signature,
}

/// A vote cast with a previously admitted validation number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub vn: ValidationNumber,
    /// Voter-chosen tracking ID, published alongside their choice.
    pub id: String,
    pub vote: String,
}

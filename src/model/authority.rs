//! The credential authority: authenticates voters and issues signed
//! validation numbers, and later certifies which numbers belong to real voters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use data_encoding::BASE64_NOPAD;
use rand::{rngs::OsRng, RngCore};
use rocket::{
    serde::json::serde_json,
    tokio::{self, sync::RwLock, task},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    certifier::CertificationRequest,
    notifier::TokenNotifier,
    signature::{Signature, Signer, Verifier},
    token::ValidationNumber,
};

/// A validation number together with the authority's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub validation: ValidationNumber,
    pub signature: Signature,
}

/// Hash a voter secret for the registry.
pub fn hash_secret(secret: &str) -> std::result::Result<String, argon2::Error> {
    hash_with(secret.as_bytes(), &argon2::Config::default())
}

fn hash_with(secret: &[u8], config: &argon2::Config) -> std::result::Result<String, argon2::Error> {
    let mut salt = [0; 16];
    OsRng.fill_bytes(&mut salt);
    argon2::hash_encoded(secret, &salt, config)
}

/// The `$variant$version$params` prefix of an encoded hash.
fn parameters(encoded: &str) -> &str {
    match encoded.match_indices('$').nth(3) {
        Some((end, _)) => &encoded[..end],
        None => encoded,
    }
}

/// Recover the Argon2 config an encoded hash was made with.
fn config_of(encoded: &str) -> Option<argon2::Config<'static>> {
    let mut fields = encoded.split('$').skip(1);
    let variant = argon2::Variant::from_str(fields.next()?).ok()?;
    let version = fields.next()?.strip_prefix("v=")?.parse().ok()?;
    let mut config = argon2::Config {
        variant,
        version: argon2::Version::from_u32(version).ok()?,
        ..Default::default()
    };
    for param in fields.next()?.split(',') {
        let (key, value) = param.split_once('=')?;
        let value = value.parse().ok()?;
        match key {
            "m" => config.mem_cost = value,
            "t" => config.time_cost = value,
            "p" => config.lanes = value,
            _ => return None,
        }
    }
    let _salt = fields.next()?;
    let hash = BASE64_NOPAD.decode(fields.next()?.as_bytes()).ok()?;
    config.hash_length = u32::try_from(hash.len()).ok()?;
    Some(config)
}

/// A hash of a random secret, checked against when the identity is unknown.
///
/// It is made with the same parameters as the registry's hashes, so unknown
/// identities cost the same as wrong secrets.
fn dummy_hash_for(registry: &HashMap<String, String>) -> String {
    let reference = registry
        .iter()
        .min_by(|a, b| a.0.cmp(b.0))
        .map(|(_, hash)| hash.as_str());
    if let Some(reference) = reference {
        if registry
            .values()
            .any(|hash| parameters(hash) != parameters(reference))
        {
            warn!("Voter registry mixes Argon2 parameters, identities may be told apart by timing");
        }
    }

    let config = reference.and_then(config_of).unwrap_or_default();
    let secret = ValidationNumber::random();
    hash_with(secret.as_bytes(), &config)
        .or_else(|_| hash_with(secret.as_bytes(), &argon2::Config::default()))
        .expect("hashing with the default Argon2 config does not fail")
}

pub struct Authority {
    /// Identity to Argon2-encoded secret. Fixed for the lifetime of the process.
    registry: HashMap<String, String>,
    dummy_hash: String,
    signer: Signer,
    /// Pinned key of the tally service, for authenticating certification requests.
    ctf_verifier: Verifier,
    notifier: Arc<dyn TokenNotifier>,
    /// Identity to issued token. Only ever grows.
    issued: RwLock<HashMap<String, IssuedToken>>,
}

impl Authority {
    pub fn new(
        registry: HashMap<String, String>,
        signer: Signer,
        ctf_verifier: Verifier,
        notifier: Arc<dyn TokenNotifier>,
    ) -> Self {
        Self {
            dummy_hash: dummy_hash_for(&registry),
            registry,
            signer,
            ctf_verifier,
            notifier,
            issued: Default::default(),
        }
    }

    /// Authenticate a voter and hand out their validation number.
    ///
    /// The first successful call for an identity creates and signs the
    /// number; every later call returns the same one.
    pub async fn register(&self, name: &str, secret: &str) -> Result<IssuedToken> {
        if !self.check_secret(name, secret).await {
            return Err(Error::AuthenticationFailed);
        }

        let mut issued = self.issued.write().await;
        if let Some(token) = issued.get(name) {
            return Ok(token.clone());
        }
        let validation = ValidationNumber::random();
        let signature = self.signer.sign(validation.as_bytes())?;
        let token = IssuedToken {
            validation,
            signature,
        };
        issued.insert(name.to_string(), token.clone());
        drop(issued);

        info!("Issued a new validation number");
        self.forward(token.clone());
        Ok(token)
    }

    /// Hand the token to the notifier in the background. Must not be called
    /// with the registry lock held.
    fn forward(&self, token: IssuedToken) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&token).await {
                warn!("Failed to forward validation number to the tally service: {e}");
            }
        });
    }

    /// Runs Argon2 on the blocking pool.
    async fn check_secret(&self, name: &str, secret: &str) -> bool {
        let known = self.registry.contains_key(name);
        let encoded = self
            .registry
            .get(name)
            .unwrap_or(&self.dummy_hash)
            .clone();
        let secret = secret.to_string();
        let verified = task::spawn_blocking(move || {
            argon2::verify_encoded(&encoded, secret.as_bytes())
        });
        match verified.await {
            Ok(Ok(matches)) => matches && known,
            Ok(Err(e)) => {
                error!("Malformed secret hash in voter registry: {e}");
                false
            }
            Err(e) => {
                error!("Secret verification task failed: {e}");
                false
            }
        }
    }

    /// The identities whose validation numbers appear in `tokens`, sorted.
    ///
    /// Numbers this authority never issued are ignored.
    pub async fn certify_voters(&self, tokens: &[ValidationNumber]) -> Vec<String> {
        let wanted = tokens.iter().collect::<HashSet<_>>();
        let mut voters = self
            .issued
            .read()
            .await
            .iter()
            .filter(|(_, token)| wanted.contains(&token.validation))
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        voters.sort_unstable();
        voters
    }

    /// Certify a list submitted by the tally service, after checking that it
    /// really came from the tally service.
    pub async fn certify_request(&self, request: &CertificationRequest) -> Result<Vec<String>> {
        self.ctf_verifier
            .verify(request.payload.as_bytes(), &request.signature)?;
        let tokens = serde_json::from_str::<Vec<ValidationNumber>>(&request.payload)
            .map_err(|e| Error::BadRequest(format!("Malformed validation number list: {e}")))?;
        let voters = self.certify_voters(&tokens).await;
        info!(
            "Certified {} of {} submitted validation numbers",
            voters.len(),
            tokens.len()
        );
        Ok(voters)
    }

    /// How many validation numbers have been issued so far.
    pub async fn issued_count(&self) -> usize {
        self.issued.read().await.len()
    }
}

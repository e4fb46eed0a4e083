use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::model::{
    authority::Authority,
    certifier::HttpCertifier,
    notifier::{DisabledNotifier, HttpNotifier, TokenNotifier},
    signature::{KeyError, Signer, Verifier},
    tally::TallyService,
};
use crate::operator::OperatorKey;

fn default_request_timeout() -> u64 {
    10
}

/// Credential authority configuration, derived from `Cla.toml` and `CLA_*`
/// environment variables.
#[derive(Deserialize)]
pub struct ClaConfig {
    /// PEM file holding the authority's private signing key.
    private_key_path: PathBuf,
    /// PEM file holding the tally service's public key.
    ctf_public_key_path: PathBuf,
    /// Where issued validation numbers are forwarded. Forwarding is off when
    /// unset.
    ctf_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    request_timeout: u64,
    /// Identity to Argon2-encoded secret.
    #[serde(default)]
    voters: HashMap<String, String>,
}

/// Tally service configuration, derived from `Ctf.toml` and `CTF_*`
/// environment variables.
#[derive(Deserialize)]
pub struct CtfConfig {
    private_key_path: PathBuf,
    cla_public_key_path: PathBuf,
    cla_url: String,
    #[serde(default = "default_request_timeout")]
    request_timeout: u64,
    candidates: Vec<String>,
    // secrets
    operator_key: String,
}

/// Extract a config section, reporting failures the way Rocket does.
fn extract<T: DeserializeOwned>(rocket: &Rocket<Build>, what: &str) -> Option<T> {
    match rocket.figment().extract::<T>() {
        Ok(config) => Some(config),
        Err(e) => {
            error!("Failed to load {what} config");
            rocket::config::pretty_print_error(e);
            None
        }
    }
}

fn load_key<T>(loaded: Result<T, KeyError>) -> Option<T> {
    loaded.map_err(|e| error!("{e}")).ok()
}

fn http_client(timeout: u64) -> Option<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()
        .map_err(|e| error!("Failed to build HTTP client: {e}"))
        .ok()
}

/// A fairing that loads the credential authority config, reads its keys, and
/// places an `Arc<Authority>` into managed state.
pub struct ClaConfigFairing;

#[rocket::async_trait]
impl Fairing for ClaConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Credential authority",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = extract::<ClaConfig>(&rocket, "credential authority") else {
            return Err(rocket);
        };
        let Some(signer) = load_key(Signer::from_pem_file(&config.private_key_path)) else {
            return Err(rocket);
        };
        let Some(ctf_verifier) = load_key(Verifier::from_pem_file(&config.ctf_public_key_path))
        else {
            return Err(rocket);
        };

        let notifier: Arc<dyn TokenNotifier> = match &config.ctf_url {
            Some(url) => {
                let Some(client) = http_client(config.request_timeout) else {
                    return Err(rocket);
                };
                info!("Forwarding validation numbers to {url}");
                Arc::new(HttpNotifier::new(client, url))
            }
            None => {
                warn!("No `ctf_url` configured, validation numbers will not be forwarded");
                Arc::new(DisabledNotifier)
            }
        };

        if config.voters.is_empty() {
            warn!("No voters registered, every registration will be refused");
        } else {
            info!("Loaded {} registered voters", config.voters.len());
        }
        let authority = Authority::new(config.voters, signer, ctf_verifier, notifier);
        Ok(rocket.manage(Arc::new(authority)))
    }
}

/// A fairing that loads the tally service config, reads its keys, and places
/// an `Arc<TallyService>` and the `OperatorKey` into managed state.
pub struct CtfConfigFairing;

#[rocket::async_trait]
impl Fairing for CtfConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Tally service",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = extract::<CtfConfig>(&rocket, "tally service") else {
            return Err(rocket);
        };
        if config.candidates.is_empty() {
            error!("No candidates configured");
            return Err(rocket);
        }
        if config.operator_key.is_empty() {
            error!("Operator key must not be empty");
            return Err(rocket);
        }
        let Some(signer) = load_key(Signer::from_pem_file(&config.private_key_path)) else {
            return Err(rocket);
        };
        let Some(cla_verifier) = load_key(Verifier::from_pem_file(&config.cla_public_key_path))
        else {
            return Err(rocket);
        };
        let Some(client) = http_client(config.request_timeout) else {
            return Err(rocket);
        };

        info!(
            "Accepting votes for {}; certifying voters with {}",
            config.candidates.join(", "),
            config.cla_url
        );
        let certifier = HttpCertifier::new(client, &config.cla_url);
        let tally = TallyService::new(config.candidates, signer, cla_verifier, Arc::new(certifier));
        Ok(rocket
            .manage(Arc::new(tally))
            .manage(OperatorKey::new(&config.operator_key)))
    }
}

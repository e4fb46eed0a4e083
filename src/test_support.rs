//! Fixtures shared by the unit tests and the `backend_test` harness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
};
use rocket::{
    fairing::AdHoc,
    serde::json::serde_json,
    tokio::{self, sync::oneshot, time::Duration},
    Build, Rocket, Shutdown,
};

use crate::model::{
    authority::{Authority, IssuedToken},
    certifier::{CertificationRequest, CertifyError, VoterCertifier},
    notifier::{NotifyError, TokenNotifier},
    signature::{Signature, Signer, Verifier},
    tally::TallyService,
    token::ValidationNumber,
};
use crate::operator::OperatorKey;

pub const CLA_PRIVATE_KEY: &str = include_str!("../keys/test/cla-rsa");
pub const CLA_PUBLIC_KEY: &str = include_str!("../keys/test/cla-rsa.pub");
pub const CTF_PRIVATE_KEY: &str = include_str!("../keys/test/ctf-rsa");
pub const CTF_PUBLIC_KEY: &str = include_str!("../keys/test/ctf-rsa.pub");

pub const OPERATOR_KEY: &str = "let-me-close-it";

pub const CANDIDATES: &[&str] = &["tacocat", "racecar", "radar", "civic"];

pub fn cla_signer() -> Signer {
    Signer::from_pem(CLA_PRIVATE_KEY).unwrap()
}

pub fn cla_verifier() -> Verifier {
    Verifier::from_pem(CLA_PUBLIC_KEY).unwrap()
}

pub fn ctf_signer() -> Signer {
    Signer::from_pem(CTF_PRIVATE_KEY).unwrap()
}

pub fn ctf_verifier() -> Verifier {
    Verifier::from_pem(CTF_PUBLIC_KEY).unwrap()
}

/// A fresh validation number signed by the test authority key.
pub fn signed_token() -> (ValidationNumber, Signature) {
    let vn = ValidationNumber::random();
    let sig = cla_signer().sign(vn.as_bytes()).unwrap();
    (vn, sig)
}

pub fn certification_request(signer: &Signer, tokens: &[ValidationNumber]) -> CertificationRequest {
    let payload = serde_json::to_string(tokens).unwrap();
    let signature = signer.sign(payload.as_bytes()).unwrap();
    CertificationRequest { payload, signature }
}

/// Identity to Argon2 hash, using low-cost parameters and a fixed salt.
pub fn example_registry() -> HashMap<String, String> {
    let config = argon2::Config {
        mem_cost: 256,
        time_cost: 1,
        ..Default::default()
    };
    [
        ("alice", "s3cret"),
        ("bob", "hunter2"),
        ("carol", "correct horse"),
    ]
    .into_iter()
    .map(|(name, secret)| {
        let hash = argon2::hash_encoded(secret.as_bytes(), b"registry-salt", &config).unwrap();
        (name.to_string(), hash)
    })
    .collect()
}

pub fn example_authority(notifier: Arc<dyn TokenNotifier>) -> Authority {
    Authority::new(example_registry(), cla_signer(), ctf_verifier(), notifier)
}

pub fn example_tally(certifier: Arc<dyn VoterCertifier>) -> TallyService {
    TallyService::new(
        CANDIDATES.iter().map(ToString::to_string).collect(),
        ctf_signer(),
        cla_verifier(),
        certifier,
    )
}

/// Credential authority server over fresh in-memory state.
pub async fn cla_rocket() -> Rocket<Build> {
    crate::cla_rocket_with(Arc::new(example_authority(Arc::new(
        RecordingNotifier::default(),
    ))))
}

/// Tally server over fresh in-memory state. Certification always names `alice`.
pub async fn ctf_rocket() -> Rocket<Build> {
    let tally = example_tally(Arc::new(FixedCertifier(vec!["alice".to_string()])));
    crate::ctf_rocket_with(Arc::new(tally), OperatorKey::new(OPERATOR_KEY))
}

static TEST_LOGGING: Once = Once::new();

/// Send test logs to stderr, keeping Rocket's own chatter out.
pub fn init_logging() {
    TEST_LOGGING.call_once(|| {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new("{l} {t} - {m}{n}")))
            .build();
        let config = log4rs::Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .logger(Logger::builder().build("rocket", LevelFilter::Off))
            .logger(Logger::builder().build("_", LevelFilter::Off))
            .logger(Logger::builder().build("hyper", LevelFilter::Off))
            .build(Root::builder().appender("stderr").build(LevelFilter::Warn))
            .unwrap();
        // Another logger may already be installed by an earlier test.
        let _ = log4rs::init_config(config);
    });
}

/// Launch `rocket` on an ephemeral local port. Returns its base URL and a
/// handle to stop it.
pub async fn serve(rocket: Rocket<Build>) -> (String, Shutdown) {
    init_logging();
    let (port_tx, port_rx) = oneshot::channel();
    let figment = rocket::Config::figment()
        .merge(("address", "127.0.0.1"))
        .merge(("port", 0))
        .merge(("log_level", "off"));
    let rocket = rocket
        .configure(figment)
        .attach(AdHoc::on_liftoff("Report port", move |rocket| {
            let _ = port_tx.send(rocket.config().port);
            Box::pin(async {})
        }))
        .ignite()
        .await
        .unwrap();
    let shutdown = rocket.shutdown();
    tokio::spawn(rocket.launch());

    let port = tokio::time::timeout(Duration::from_secs(5), port_rx)
        .await
        .expect("server did not start")
        .unwrap();
    (format!("http://127.0.0.1:{port}"), shutdown)
}

/// Remembers everything it was asked to forward.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<IssuedToken>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<IssuedToken> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait for the background forwarding tasks to deliver `count` tokens.
    pub async fn wait_for(&self, count: usize) {
        let waiting = async {
            while self.sent.lock().unwrap().len() < count {
                tokio::task::yield_now().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("notifications were not delivered");
    }
}

#[rocket::async_trait]
impl TokenNotifier for RecordingNotifier {
    async fn notify(&self, token: &IssuedToken) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(token.clone());
        Ok(())
    }
}

/// Always fails, as if the tally service were unreachable.
pub struct FailingNotifier;

#[rocket::async_trait]
impl TokenNotifier for FailingNotifier {
    async fn notify(&self, _token: &IssuedToken) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }
}

/// Certifies every request with the same voter list.
pub struct FixedCertifier(pub Vec<String>);

#[rocket::async_trait]
impl VoterCertifier for FixedCertifier {
    async fn certify(&self, _request: &CertificationRequest) -> Result<Vec<String>, CertifyError> {
        Ok(self.0.clone())
    }
}

/// Always fails, as if the credential authority were unreachable.
pub struct FailingCertifier;

#[rocket::async_trait]
impl VoterCertifier for FailingCertifier {
    async fn certify(&self, _request: &CertificationRequest) -> Result<Vec<String>, CertifyError> {
        Err(CertifyError::Rejected(reqwest::StatusCode::BAD_GATEWAY))
    }
}

/// Talks to an in-process authority, exactly as the HTTP route would.
pub struct LocalCertifier(pub Arc<Authority>);

#[rocket::async_trait]
impl VoterCertifier for LocalCertifier {
    async fn certify(&self, request: &CertificationRequest) -> Result<Vec<String>, CertifyError> {
        self.0.certify_request(request).await.map_err(|e| {
            CertifyError::Rejected(reqwest::StatusCode::from_u16(e.status().code).unwrap())
        })
    }
}

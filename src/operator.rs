//! Operator access to the tally service: the `X-Operator-Key` request guard
//! and the stdin console.

use std::io::BufRead;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::Status,
    request::{FromRequest, Outcome},
    tokio::runtime::Handle,
    Orbit, Request, Rocket, State,
};
use sha2::Sha256;

use crate::error::Error;
use crate::model::tally::TallyService;

pub const OPERATOR_KEY_HEADER: &str = "X-Operator-Key";

type HmacSha256 = Hmac<Sha256>;

/// The configured operator key.
///
/// Only a MAC of the key under a per-process secret is kept, so presented
/// keys can be compared in constant time.
pub struct OperatorKey {
    secret: [u8; 32],
    digest: Vec<u8>,
}

impl OperatorKey {
    pub fn new(key: &str) -> Self {
        let mut secret = [0; 32];
        OsRng.fill_bytes(&mut secret);
        let digest = mac(&secret, key).finalize().into_bytes().to_vec();
        Self { secret, digest }
    }

    pub fn verify(&self, presented: &str) -> bool {
        mac(&self.secret, presented)
            .verify_slice(&self.digest)
            .is_ok()
    }
}

fn mac(secret: &[u8], key: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(key.as_bytes());
    mac
}

/// Request guard for operator-only endpoints.
pub struct Operator;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Operator {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `OperatorKey` is always managed by the tally server.
        let key = req.guard::<&State<OperatorKey>>().await.unwrap();

        match req.headers().get_one(OPERATOR_KEY_HEADER) {
            Some(presented) if key.verify(presented) => Outcome::Success(Operator),
            Some(_) => Outcome::Error((
                Status::Unauthorized,
                Error::Unauthorized("Wrong operator key".to_string()),
            )),
            None => Outcome::Error((
                Status::Unauthorized,
                Error::Unauthorized(format!("Missing {OPERATOR_KEY_HEADER} header")),
            )),
        }
    }
}

/// A line typed on the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Close,
    Status,
    Unknown(String),
}

impl Command {
    /// Parse one console line. Blank lines are ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "" => None,
            "close" | "kill" => Some(Self::Close),
            "status" => Some(Self::Status),
            _ => Some(Self::Unknown(line.to_string())),
        }
    }
}

/// Reads operator commands from stdin once the server is running.
pub struct OperatorConsoleFairing;

#[rocket::async_trait]
impl Fairing for OperatorConsoleFairing {
    fn info(&self) -> Info {
        Info {
            name: "Operator console",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let tally = match rocket.state::<Arc<TallyService>>() {
            Some(tally) => tally.clone(),
            None => {
                error!("Operator console started without a tally service");
                return;
            }
        };
        let handle = Handle::current();
        let spawned = std::thread::Builder::new()
            .name("operator-console".to_string())
            .spawn(move || run_console(std::io::stdin().lock(), &tally, &handle));
        match spawned {
            Ok(_) => info!("Operator console ready, type `close` to end voting"),
            Err(e) => error!("Failed to start operator console: {e}"),
        }
    }
}

fn run_console(input: impl BufRead, tally: &TallyService, handle: &Handle) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Operator console stopped: {e}");
                return;
            }
        };
        match Command::parse(&line) {
            Some(Command::Close) => match handle.block_on(tally.close_voting()) {
                Ok(()) => info!("Voting closed by operator"),
                Err(e) => warn!("{e}"),
            },
            Some(Command::Status) => {
                let status = handle.block_on(tally.status());
                info!(
                    "{} validation numbers admitted, {} spent, voting {}",
                    status.admitted,
                    status.spent,
                    if status.closed { "closed" } else { "open" }
                );
            }
            Some(Command::Unknown(other)) => warn!("Unknown operator command `{other}`"),
            None => {}
        }
    }
    debug!("Operator console reached end of input");
}

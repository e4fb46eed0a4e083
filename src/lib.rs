#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

use rocket::{
    figment::{
        providers::{Env, Format, Toml},
        Figment,
    },
    Build, Rocket,
};

use crate::config::{ClaConfigFairing, CtfConfigFairing};
use crate::logging::LoggerFairing;
use crate::model::{authority::Authority, tally::TallyService};
use crate::operator::{OperatorConsoleFairing, OperatorKey};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod operator;

#[cfg(test)]
mod test_support;

/// Rocket's own settings, overlaid with a per-service TOML file and
/// prefixed environment variables.
fn figment(file: &str, env_prefix: &str) -> Figment {
    rocket::Config::figment()
        .merge(Toml::file(file).nested())
        .merge(Env::prefixed(env_prefix).global())
}

/// The credential authority server, configured from `Cla.toml` and `CLA_*`
/// environment variables.
pub fn cla_rocket() -> Rocket<Build> {
    rocket::custom(figment("Cla.toml", "CLA_"))
        .mount("/", api::cla::routes())
        .attach(ClaConfigFairing)
        .attach(LoggerFairing { service: "CLA" })
}

/// The tally server, configured from `Ctf.toml` and `CTF_*` environment
/// variables. The operator console on stdin is attached too.
pub fn ctf_rocket() -> Rocket<Build> {
    rocket::custom(figment("Ctf.toml", "CTF_"))
        .mount("/", api::ctf::routes())
        .attach(CtfConfigFairing)
        .attach(OperatorConsoleFairing)
        .attach(LoggerFairing { service: "CTF" })
}

/// A credential authority server over an already built `Authority`.
pub fn cla_rocket_with(authority: Arc<Authority>) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::cla::routes())
        .manage(authority)
        .attach(LoggerFairing { service: "CLA" })
}

/// A tally server over an already built `TallyService`.
pub fn ctf_rocket_with(tally: Arc<TallyService>, operator_key: OperatorKey) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::ctf::routes())
        .manage(tally)
        .manage(operator_key)
        .attach(LoggerFairing { service: "CTF" })
}

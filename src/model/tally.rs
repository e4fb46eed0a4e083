//! The tally service: admits signed validation numbers, accepts one vote per
//! number, and publishes results once voting has closed.

use std::collections::{hash_map::Entry, BTreeMap, HashMap};
use std::sync::Arc;

use rocket::{serde::json::serde_json, tokio::sync::RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    certifier::{CertificationRequest, VoterCertifier},
    signature::{Signature, Signer, Verifier},
    token::ValidationNumber,
};

/// Lifecycle of an admitted validation number. Never moves backwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRecord {
    Eligible,
    Spent,
}

/// Final election output.
///
/// `votes` maps candidates to tracking IDs and `voters` lists the real
/// identities that took part. The two are never joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    pub votes: BTreeMap<String, Vec<String>>,
    pub voters: Vec<String>,
}

/// Operator-facing counters. Reveals nothing about individual votes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub admitted: usize,
    pub spent: usize,
    pub closed: bool,
}

/// All mutable tally state, guarded by a single lock.
#[derive(Default)]
struct BallotBox {
    records: HashMap<ValidationNumber, TokenRecord>,
    /// Tracking ID to the validation number that used it.
    tracking_ids: HashMap<String, ValidationNumber>,
    votes: BTreeMap<String, Vec<String>>,
    closed: bool,
}

pub struct TallyService {
    candidates: Vec<String>,
    signer: Signer,
    /// Pinned key of the credential authority.
    cla_verifier: Verifier,
    certifier: Arc<dyn VoterCertifier>,
    state: RwLock<BallotBox>,
}

impl TallyService {
    pub fn new(
        candidates: Vec<String>,
        signer: Signer,
        cla_verifier: Verifier,
        certifier: Arc<dyn VoterCertifier>,
    ) -> Self {
        Self {
            candidates,
            signer,
            cla_verifier,
            certifier,
            state: Default::default(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Admit a validation number signed by the credential authority.
    pub async fn admit_token(&self, vn: &ValidationNumber, signature: &Signature) -> Result<()> {
        if self.state.read().await.closed {
            return Err(Error::Closed);
        }
        // Checked outside the lock; it only depends on the request.
        self.cla_verifier.verify(vn.as_bytes(), signature)?;

        let mut state = self.state.write().await;
        if state.closed {
            return Err(Error::Closed);
        }
        match state.records.entry(vn.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateToken),
            Entry::Vacant(entry) => {
                entry.insert(TokenRecord::Eligible);
                debug!("Admitted validation number");
                Ok(())
            }
        }
    }

    /// Spend an eligible validation number on a vote for `candidate`.
    ///
    /// All checks and the state change happen under one write lock, so at
    /// most one vote is ever accepted per validation number.
    pub async fn cast_vote(
        &self,
        vn: &ValidationNumber,
        tracking_id: &str,
        candidate: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(Error::Closed);
        }
        if let Some(owner) = state.tracking_ids.get(tracking_id) {
            // Resubmitting the same vote is a spent number, not a stolen tracking ID.
            return Err(if owner == vn {
                Error::AlreadySpent
            } else {
                Error::DuplicateTracking
            });
        }
        match state.records.get(vn) {
            None => return Err(Error::UnknownToken),
            Some(TokenRecord::Spent) => return Err(Error::AlreadySpent),
            Some(TokenRecord::Eligible) => {}
        }
        if !self.candidates.iter().any(|c| c == candidate) {
            return Err(Error::InvalidCandidate(candidate.to_string()));
        }

        state.records.insert(vn.clone(), TokenRecord::Spent);
        state
            .tracking_ids
            .insert(tracking_id.to_string(), vn.clone());
        state
            .votes
            .entry(candidate.to_string())
            .or_default()
            .push(tracking_id.to_string());
        Ok(())
    }

    /// Permanently stop admitting numbers and accepting votes.
    pub async fn close_voting(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(Error::AlreadyClosed);
        }
        state.closed = true;
        info!(
            "Voting closed with {} of {} admitted validation numbers spent",
            count_spent(&state.records),
            state.records.len()
        );
        Ok(())
    }

    /// Compute the final results, asking the credential authority which real
    /// voters the spent validation numbers belong to.
    pub async fn compute_results(&self) -> Result<Results> {
        // Voting is closed, so neither snapshot can go stale once the lock is released.
        let (mut spent, votes) = {
            let state = self.state.read().await;
            if !state.closed {
                return Err(Error::NotClosed);
            }
            let spent = state
                .records
                .iter()
                .filter(|(_, record)| **record == TokenRecord::Spent)
                .map(|(vn, _)| vn.clone())
                .collect::<Vec<_>>();
            (spent, state.votes.clone())
        };
        spent.sort_unstable();

        let payload =
            serde_json::to_string(&spent).expect("validation number serialization does not fail");
        let signature = self.signer.sign(payload.as_bytes())?;
        let request = CertificationRequest { payload, signature };
        let voters = self.certifier.certify(&request).await.map_err(|e| {
            error!("Voter certification failed: {e}");
            Error::CertificationUnavailable(e.to_string())
        })?;

        let votes = votes
            .into_iter()
            .map(|(candidate, mut ids)| {
                ids.sort_unstable();
                (candidate, ids)
            })
            .collect();
        Ok(Results { votes, voters })
    }

    pub async fn status(&self) -> Status {
        let state = self.state.read().await;
        Status {
            admitted: state.records.len(),
            spent: count_spent(&state.records),
            closed: state.closed,
        }
    }
}

fn count_spent(records: &HashMap<ValidationNumber, TokenRecord>) -> usize {
    records
        .values()
        .filter(|record| **record == TokenRecord::Spent)
        .count()
}

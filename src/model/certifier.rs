//! The tally service's side of voter certification: submitting the signed
//! list of spent validation numbers to the credential authority.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::signature::Signature;

/// A signed list of validation numbers.
///
/// `payload` is the JSON array exactly as signed; the authority verifies the
/// signature over these bytes before parsing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationRequest {
    pub payload: String,
    pub signature: Signature,
}

#[derive(Debug, Error)]
pub enum CertifyError {
    #[error("request to credential authority failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("credential authority refused certification with status {0}")]
    Rejected(StatusCode),
}

/// Something that can turn a signed list of validation numbers into the list
/// of voters who were issued them.
#[rocket::async_trait]
pub trait VoterCertifier: Send + Sync {
    async fn certify(&self, request: &CertificationRequest) -> Result<Vec<String>, CertifyError>;
}

/// Asks the credential authority over HTTP.
pub struct HttpCertifier {
    client: Client,
    url: String,
}

impl HttpCertifier {
    pub fn new(client: Client, cla_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/voters", cla_url.trim_end_matches('/')),
        }
    }
}

#[rocket::async_trait]
impl VoterCertifier for HttpCertifier {
    async fn certify(&self, request: &CertificationRequest) -> Result<Vec<String>, CertifyError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CertifyError::Rejected(status));
        }
        Ok(response.json::<Vec<String>>().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::model::{authority::Authority, tally::TallyService};
    use crate::test_support::{
        certification_request, cla_signer, cla_verifier, ctf_signer, example_authority,
        example_tally, serve, signed_token, RecordingNotifier, CANDIDATES,
    };

    async fn authority_server() -> (Arc<Authority>, String, rocket::Shutdown) {
        let authority = Arc::new(example_authority(Arc::new(RecordingNotifier::default())));
        let (url, shutdown) = serve(crate::cla_rocket_with(authority.clone())).await;
        (authority, url, shutdown)
    }

    #[rocket::async_test]
    async fn certified_over_http() {
        let (authority, url, shutdown) = authority_server().await;
        let alice = authority.register("alice", "s3cret").await.unwrap();
        authority.register("bob", "hunter2").await.unwrap();

        let certifier = HttpCertifier::new(Client::new(), &format!("{url}/"));
        let request = certification_request(&ctf_signer(), &[alice.validation]);
        assert_eq!(vec!["alice"], certifier.certify(&request).await.unwrap());

        shutdown.notify();
    }

    #[rocket::async_test]
    async fn forged_request_rejected_over_http() {
        let (authority, url, shutdown) = authority_server().await;
        let alice = authority.register("alice", "s3cret").await.unwrap();

        let certifier = HttpCertifier::new(Client::new(), &url);
        let request = certification_request(&cla_signer(), &[alice.validation]);
        assert!(matches!(
            certifier.certify(&request).await,
            Err(CertifyError::Rejected(StatusCode::BAD_REQUEST))
        ));

        shutdown.notify();
    }

    #[rocket::async_test]
    async fn results_certified_by_remote_authority() {
        let (authority, url, shutdown) = authority_server().await;
        let alice = authority.register("alice", "s3cret").await.unwrap();

        let tally = example_tally(Arc::new(HttpCertifier::new(Client::new(), &url)));
        tally
            .admit_token(&alice.validation, &alice.signature)
            .await
            .unwrap();
        tally
            .cast_vote(&alice.validation, "track1", "radar")
            .await
            .unwrap();
        tally.close_voting().await.unwrap();

        let results = tally.compute_results().await.unwrap();
        assert_eq!(vec!["alice"], results.voters);
        assert_eq!(vec!["track1"], results.votes["radar"]);

        shutdown.notify();
    }

    #[rocket::async_test]
    async fn results_unavailable_when_authority_refuses() {
        let (_authority, url, shutdown) = authority_server().await;

        // Signs with a key the authority does not trust.
        let tally = TallyService::new(
            CANDIDATES.iter().map(ToString::to_string).collect(),
            cla_signer(),
            cla_verifier(),
            Arc::new(HttpCertifier::new(Client::new(), &url)),
        );
        let (vn, sig) = signed_token();
        tally.admit_token(&vn, &sig).await.unwrap();
        tally.cast_vote(&vn, "track1", "civic").await.unwrap();
        tally.close_voting().await.unwrap();

        assert!(matches!(
            tally.compute_results().await,
            Err(Error::CertificationUnavailable(_))
        ));

        shutdown.notify();
    }
}

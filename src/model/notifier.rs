//! Forwarding freshly issued validation numbers from the credential
//! authority to the tally service.
//!
//! Delivery is best effort. A voter presenting their own signed number to the
//! tally service is the authoritative admission path, so a failed forward is
//! only logged.

use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::model::{api::Admission, authority::IssuedToken};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request to tally service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tally service rejected validation number with status {0}")]
    Rejected(StatusCode),
}

/// Something that can hand an issued validation number to the tally service.
#[rocket::async_trait]
pub trait TokenNotifier: Send + Sync {
    async fn notify(&self, token: &IssuedToken) -> Result<(), NotifyError>;
}

/// Posts issued numbers to the tally service's admission endpoint.
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(client: Client, ctf_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/vn", ctf_url.trim_end_matches('/')),
        }
    }
}

#[rocket::async_trait]
impl TokenNotifier for HttpNotifier {
    async fn notify(&self, token: &IssuedToken) -> Result<(), NotifyError> {
        let admission = Admission {
            vn: token.validation.clone(),
            sig: token.signature.clone(),
        };
        let response = self.client.post(&self.url).json(&admission).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status));
        }
        debug!("Tally service accepted forwarded validation number");
        Ok(())
    }
}

/// Used when no tally service URL is configured: voters deliver their own numbers.
pub struct DisabledNotifier;

#[rocket::async_trait]
impl TokenNotifier for DisabledNotifier {
    async fn notify(&self, _token: &IssuedToken) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::authority::Authority;
    use crate::operator::OperatorKey;
    use crate::test_support::{
        cla_signer, ctf_verifier, example_registry, example_tally, serve, signed_token,
        FixedCertifier, OPERATOR_KEY,
    };

    #[rocket::async_test]
    async fn forwarded_once_over_http() {
        let tally = Arc::new(example_tally(Arc::new(FixedCertifier(vec![]))));
        let (url, shutdown) =
            serve(crate::ctf_rocket_with(tally.clone(), OperatorKey::new(OPERATOR_KEY))).await;

        let (validation, signature) = signed_token();
        let token = IssuedToken {
            validation,
            signature,
        };
        let notifier = HttpNotifier::new(Client::new(), &url);
        notifier.notify(&token).await.unwrap();
        assert_eq!(1, tally.status().await.admitted);

        assert!(matches!(
            notifier.notify(&token).await,
            Err(NotifyError::Rejected(StatusCode::CONFLICT))
        ));
        assert_eq!(1, tally.status().await.admitted);

        shutdown.notify();
    }

    #[rocket::async_test]
    async fn registration_reaches_tally() {
        let tally = Arc::new(example_tally(Arc::new(FixedCertifier(vec![]))));
        let (url, shutdown) =
            serve(crate::ctf_rocket_with(tally.clone(), OperatorKey::new(OPERATOR_KEY))).await;

        let notifier = Arc::new(HttpNotifier::new(Client::new(), &url));
        let authority = Authority::new(example_registry(), cla_signer(), ctf_verifier(), notifier);
        let token = authority.register("carol", "correct horse").await.unwrap();

        // Forwarding runs in the background.
        let admitted = async {
            while tally.status().await.admitted == 0 {
                rocket::tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        };
        rocket::tokio::time::timeout(std::time::Duration::from_secs(5), admitted)
            .await
            .unwrap();

        // The voter's own submission is now a duplicate.
        assert!(matches!(
            tally.admit_token(&token.validation, &token.signature).await,
            Err(crate::error::Error::DuplicateToken)
        ));

        shutdown.notify();
    }
}

use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::Registration,
    authority::{Authority, IssuedToken},
    certifier::CertificationRequest,
};

pub fn routes() -> Vec<Route> {
    routes![register, voters]
}

#[post("/register", data = "<registration>", format = "json")]
pub async fn register(
    registration: Json<Registration>,
    authority: &State<Arc<Authority>>,
) -> Result<Json<IssuedToken>> {
    let token = authority
        .register(&registration.name, &registration.secret)
        .await?;
    Ok(Json(token))
}

/// Called by the tally service once voting has closed.
#[post("/voters", data = "<request>", format = "json")]
pub async fn voters(
    request: Json<CertificationRequest>,
    authority: &State<Arc<Authority>>,
) -> Result<Json<Vec<String>>> {
    let voters = authority.certify_request(&request).await?;
    Ok(Json(voters))
}

use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{Admission, Vote},
    tally::{Results, Status as TallyStatus, TallyService},
};
use crate::operator::Operator;

pub fn routes() -> Vec<Route> {
    routes![admit, vote, close, results, status, candidates]
}

/// Accepts validation numbers from voters and from the credential authority.
#[post("/vn", data = "<admission>", format = "json")]
pub async fn admit(
    admission: Json<Admission>,
    tally: &State<Arc<TallyService>>,
) -> Result<&'static str> {
    tally.admit_token(&admission.vn, &admission.sig).await?;
    Ok("Validation number accepted")
}

#[post("/vote", data = "<vote>", format = "json")]
pub async fn vote(vote: Json<Vote>, tally: &State<Arc<TallyService>>) -> Result<&'static str> {
    tally.cast_vote(&vote.vn, &vote.id, &vote.vote).await?;
    Ok("Vote accepted")
}

#[post("/admin/close")]
pub async fn close(_operator: Operator, tally: &State<Arc<TallyService>>) -> Result<&'static str> {
    tally.close_voting().await?;
    info!("Voting closed by operator request");
    Ok("Voting closed")
}

#[get("/results")]
pub async fn results(tally: &State<Arc<TallyService>>) -> Result<Json<Results>> {
    Ok(Json(tally.compute_results().await?))
}

#[get("/status")]
pub async fn status(tally: &State<Arc<TallyService>>) -> Json<TallyStatus> {
    Json(tally.status().await)
}

#[get("/candidates")]
pub fn candidates(tally: &State<Arc<TallyService>>) -> Json<Vec<String>> {
    Json(tally.candidates().to_vec())
}

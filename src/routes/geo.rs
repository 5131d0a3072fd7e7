//! `GET /geo/resolve-postcode?postcode=`

use hyper::body::Incoming;
use hyper::{Request, StatusCode};

use crate::routes::helpers::{json_response, query_param, HttpResponse};
use crate::server::AppState;
use crate::types::{CommunityError, Result};

pub async fn resolve_postcode(req: &Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let postcode = query_param(req.uri().query(), "postcode")
        .ok_or_else(|| CommunityError::Validation("postcode is required".into()))?;
    let info = state.postcodes.resolve(&postcode).await?;
    Ok(json_response(StatusCode::OK, &info))
}

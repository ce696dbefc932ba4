use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::AppError;
use crate::models::resale::ResaleListing;
use crate::services::purchase::{self, PendingPurchase, PurchaseRequest};
use crate::services::resale::{self, ListTicketRequest, ListingPurchaseRequest};

#[derive(Debug, Deserialize)]
pub struct PurchaseTicketBody {
    pub ticket_id: Uuid,
    pub quantity: i32,
    pub buyer_email: String,
    pub buyer_first_name: String,
    pub buyer_last_name: String,
}

async fn purchase_ticket(
    State(state): State<AppState>,
    Json(body): Json<PurchaseTicketBody>,
) -> Result<(StatusCode, Json<PendingPurchase>), AppError> {
    let pending = purchase::purchase_ticket(
        &state.pool,
        &state.redis,
        state.gateway.as_ref(),
        PurchaseRequest {
            ticket_id: body.ticket_id,
            quantity: body.quantity,
            buyer_email: body.buyer_email,
            buyer_first_name: body.buyer_first_name,
            buyer_last_name: body.buyer_last_name,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(pending)))
}

#[derive(Debug, Deserialize)]
pub struct ListTicketBody {
    pub ticket_id: Uuid,
    pub seller_id: Uuid,
    pub price_minor: i64,
}

async fn create_resale_listing(
    State(state): State<AppState>,
    Json(body): Json<ListTicketBody>,
) -> Result<(StatusCode, Json<ResaleListing>), AppError> {
    let listing = resale::list_ticket(
        &state.pool,
        ListTicketRequest {
            ticket_id: body.ticket_id,
            seller_id: body.seller_id,
            price_minor: body.price_minor,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(listing)))
}

#[derive(Debug, Deserialize)]
pub struct PurchaseListingBody {
    pub buyer_id: Uuid,
    pub buyer_email: String,
    pub buyer_first_name: String,
    pub buyer_last_name: String,
}

async fn purchase_resale_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Json(body): Json<PurchaseListingBody>,
) -> Result<(StatusCode, Json<PendingPurchase>), AppError> {
    let pending = resale::purchase_listing(
        &state.pool,
        &state.redis,
        state.gateway.as_ref(),
        ListingPurchaseRequest {
            listing_id,
            buyer_id: body.buyer_id,
            buyer_email: body.buyer_email,
            buyer_first_name: body.buyer_first_name,
            buyer_last_name: body.buyer_last_name,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(pending)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ticket-purchases/purchase", post(purchase_ticket))
        .route("/ticket-purchases/resale", post(create_resale_listing))
        .route(
            "/ticket-purchases/resale/:listing_id/purchase",
            post(purchase_resale_listing),
        )
}

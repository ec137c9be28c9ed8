//! REST API endpoints for the seal service.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, instrument};

use crate::domain::{
    Seal, SealId, SealStats, ShipmentIntegritySummary, ShipmentRef, VerificationAttempt,
    VerificationOutcome, VerifySealRequest,
};
use crate::server::AppState;
use crate::service::{ProvisionSealRequest, ProvisionedSeal};

use super::error::{not_found, ApiError};
use super::types::{
    require_non_blank, AttachSealBody, AvailableSealsQuery, BatchProvisionBody,
    BatchProvisionResponse, ChallengeResponse, ExpirySweepResponse, RemoveSealBody,
    ReportDamageBody, SealIntegrityResponse, VerifySealBody,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/seals", post(provision_seal))
        .route("/v1/seals/batch", post(provision_seals))
        .route("/v1/seals/verify", post(verify_seal))
        .route("/v1/seals/expire", post(process_expired_seals))
        .route("/v1/seals/available", get(get_available_seals))
        .route("/v1/seals/stats", get(get_seal_stats))
        .route(
            "/v1/seals/serial/:serial_number",
            get(get_seal_by_serial_number),
        )
        .route(
            "/v1/seals/serial/:serial_number/challenge",
            get(get_current_challenge),
        )
        .route("/v1/seals/:seal_id", get(get_seal))
        .route("/v1/seals/:seal_id/attach", post(attach_seal))
        .route("/v1/seals/:seal_id/remove", post(remove_seal))
        .route("/v1/seals/:seal_id/damage", post(report_physical_damage))
        .route(
            "/v1/seals/:seal_id/verifications",
            get(get_verification_history),
        )
        .route("/v1/seals/:seal_id/integrity", get(get_integrity_score))
        .route(
            "/v1/shipments/:shipment_ref/seals",
            get(get_shipment_seals),
        )
        .route(
            "/v1/shipments/:shipment_ref/integrity",
            get(get_shipment_integrity_summary),
        )
}

// ============================================================================
// Provisioning
// ============================================================================

/// POST /api/v1/seals - Provision one seal.
#[instrument(skip_all)]
async fn provision_seal(
    State(state): State<AppState>,
    payload: Result<Json<ProvisionSealRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProvisionedSeal>), ApiError> {
    let Json(request) = payload?;
    let provisioned = state
        .service
        .provision_seal(&request.serial_number, request.expires_at)
        .await?;
    Ok((StatusCode::CREATED, Json(provisioned)))
}

/// POST /api/v1/seals/batch - Provision many seals; each item succeeds or fails alone.
#[instrument(skip_all)]
async fn provision_seals(
    State(state): State<AppState>,
    payload: Result<Json<BatchProvisionBody>, JsonRejection>,
) -> ApiResult<BatchProvisionResponse> {
    let Json(body) = payload?;
    body.validate()?;
    let results = state.service.provision_seals(body.seals).await;
    Ok(Json(results.into()))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// POST /api/v1/seals/:seal_id/attach
#[instrument(skip_all)]
async fn attach_seal(
    State(state): State<AppState>,
    seal_id: Result<Path<SealId>, PathRejection>,
    payload: Result<Json<AttachSealBody>, JsonRejection>,
) -> ApiResult<Seal> {
    let Path(seal_id) = seal_id?;
    let Json(body) = payload?;
    require_non_blank("shipmentRef", &body.shipment_ref)?;
    require_non_blank("attachedBy", &body.attached_by)?;

    let seal = state
        .service
        .attach_seal(
            seal_id,
            ShipmentRef::new(body.shipment_ref.trim()),
            &body.attached_by,
            body.location,
        )
        .await?;
    Ok(Json(seal))
}

/// POST /api/v1/seals/verify - Submit an NFC read.
///
/// A mismatched signature or counter anomaly is a `200` with `isValid: false`.
#[instrument(skip_all)]
async fn verify_seal(
    State(state): State<AppState>,
    payload: Result<Json<VerifySealBody>, JsonRejection>,
) -> ApiResult<VerificationOutcome> {
    let Json(body) = payload?;
    let request = VerifySealRequest::try_from(body)?;
    let outcome = state.service.verify_seal(request).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/seals/:seal_id/remove
#[instrument(skip_all)]
async fn remove_seal(
    State(state): State<AppState>,
    seal_id: Result<Path<SealId>, PathRejection>,
    payload: Result<Json<RemoveSealBody>, JsonRejection>,
) -> ApiResult<Seal> {
    let Path(seal_id) = seal_id?;
    let Json(body) = payload?;
    require_non_blank("removedBy", &body.removed_by)?;

    let seal = state
        .service
        .remove_seal(seal_id, &body.removed_by, &body.reason, body.location)
        .await?;
    Ok(Json(seal))
}

/// POST /api/v1/seals/:seal_id/damage
#[instrument(skip_all)]
async fn report_physical_damage(
    State(state): State<AppState>,
    seal_id: Result<Path<SealId>, PathRejection>,
    payload: Result<Json<ReportDamageBody>, JsonRejection>,
) -> ApiResult<Seal> {
    let Path(seal_id) = seal_id?;
    let Json(body) = payload?;
    require_non_blank("reportedBy", &body.reported_by)?;

    let seal = state
        .service
        .report_physical_damage(seal_id, &body.reported_by, &body.description)
        .await?;
    Ok(Json(seal))
}

/// POST /api/v1/seals/expire - Run one expiry sweep.
#[instrument(skip_all)]
async fn process_expired_seals(State(state): State<AppState>) -> ApiResult<ExpirySweepResponse> {
    let expired = state.service.process_expired_seals().await?;
    Ok(Json(ExpirySweepResponse { expired }))
}

// ============================================================================
// Reads
// ============================================================================

/// GET /api/v1/seals/:seal_id
async fn get_seal(
    State(state): State<AppState>,
    seal_id: Result<Path<SealId>, PathRejection>,
) -> ApiResult<Seal> {
    let Path(seal_id) = seal_id?;
    Ok(Json(state.service.get_seal(seal_id).await?))
}

/// GET /api/v1/seals/serial/:serial_number
async fn get_seal_by_serial_number(
    State(state): State<AppState>,
    Path(serial_number): Path<String>,
) -> ApiResult<Seal> {
    Ok(Json(
        state
            .service
            .get_seal_by_serial_number(&serial_number)
            .await?,
    ))
}

/// GET /api/v1/seals/serial/:serial_number/challenge - The nonce for the next read.
async fn get_current_challenge(
    State(state): State<AppState>,
    Path(serial_number): Path<String>,
) -> ApiResult<ChallengeResponse> {
    debug!(%serial_number, "Fetching current challenge");
    match state.service.get_current_challenge(&serial_number).await? {
        Some(challenge) => Ok(Json(ChallengeResponse {
            serial_number: serial_number.trim().to_ascii_uppercase(),
            challenge,
        })),
        None => Err(not_found("seal", serial_number.trim().to_ascii_uppercase())),
    }
}

/// GET /api/v1/seals/:seal_id/verifications - Attempts, oldest first.
async fn get_verification_history(
    State(state): State<AppState>,
    seal_id: Result<Path<SealId>, PathRejection>,
) -> ApiResult<Vec<VerificationAttempt>> {
    let Path(seal_id) = seal_id?;
    Ok(Json(state.service.get_verification_history(seal_id).await?))
}

/// GET /api/v1/seals/:seal_id/integrity
async fn get_integrity_score(
    State(state): State<AppState>,
    seal_id: Result<Path<SealId>, PathRejection>,
) -> ApiResult<SealIntegrityResponse> {
    let Path(seal_id) = seal_id?;
    let report = state.service.get_integrity_score(seal_id).await?;
    Ok(Json(SealIntegrityResponse { seal_id, report }))
}

/// GET /api/v1/seals/available?limit=N
async fn get_available_seals(
    State(state): State<AppState>,
    query: Result<Query<AvailableSealsQuery>, QueryRejection>,
) -> ApiResult<Vec<Seal>> {
    let Query(query) = query?;
    Ok(Json(state.service.get_available_seals(query.limit).await?))
}

/// GET /api/v1/seals/stats
async fn get_seal_stats(State(state): State<AppState>) -> ApiResult<SealStats> {
    Ok(Json(state.service.get_seal_stats().await?))
}

/// GET /api/v1/shipments/:shipment_ref/seals
async fn get_shipment_seals(
    State(state): State<AppState>,
    Path(shipment_ref): Path<String>,
) -> ApiResult<Vec<Seal>> {
    let shipment_ref = ShipmentRef::new(shipment_ref);
    Ok(Json(state.service.get_shipment_seals(&shipment_ref).await?))
}

/// GET /api/v1/shipments/:shipment_ref/integrity
async fn get_shipment_integrity_summary(
    State(state): State<AppState>,
    Path(shipment_ref): Path<String>,
) -> ApiResult<ShipmentIntegritySummary> {
    let shipment_ref = ShipmentRef::new(shipment_ref);
    Ok(Json(
        state
            .service
            .get_shipment_integrity_summary(&shipment_ref)
            .await?,
    ))
}

/// API 표면: 요청 파싱과 응답 성형만 하는 얇은 어댑터.
/// 비즈니스 로직은 엔진/클로저/인보이서/임포터에 있다.
/// 인증 실패는 401/403, 엔진 result_code는 오류 분류에 따라 매핑한다.
// region:    --- Imports
use crate::auction::model::Identity;
use crate::auth::{self, AuthError, AuthResolveError};
use crate::bidding::commands::{BidOutcome, BiddingEngine, BuyNowCommand, PlaceBidCommand};
use crate::clock::SharedClock;
use crate::error::{EngineError, ResultCode, StoreError};
use crate::hub::{LiveEvent, LiveEventKind, LotHub, HEARTBEAT_INTERVAL};
use crate::importer::{Importer, UploadedImage};
use crate::invoice::{InvoiceError, Invoicer};
use crate::query;
use crate::scheduler::Closer;
use crate::store::SharedStore;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// endregion: --- Imports

// region:    --- App State / Router

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub clock: SharedClock,
    pub hub: Arc<LotHub>,
    pub engine: Arc<BiddingEngine>,
    pub closer: Arc<Closer>,
    pub invoicer: Arc<Invoicer>,
    pub importer: Arc<Importer>,
}

/// 라우터 구성. 테스트는 임시 포트에 그대로 띄워 쓴다.
pub fn app(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/bid", post(handle_bid))
        .route("/buy-now", post(handle_buy_now))
        .route("/lots/:id", get(handle_get_lot))
        .route("/lots/:id/bids", get(handle_get_bid_history))
        .route("/lots/:id/highest-bid", get(handle_get_highest_bid))
        .route("/lots/:id/live", get(handle_subscribe))
        .route(
            "/lots/:id/watch",
            post(handle_add_watch).delete(handle_remove_watch),
        )
        .route("/lots/:id/close", post(handle_close_lot))
        .route("/auctions/:id", get(handle_get_auction))
        .route("/auctions/:id/lots", get(handle_get_auction_lots))
        .route("/auctions/:id/close", post(handle_close_auction))
        .route(
            "/auctions/:id/invoices",
            post(handle_generate_invoices).get(handle_get_invoices),
        )
        .route("/auctions/:id/import/lots", post(handle_import_lots_csv))
        .route("/auctions/:id/import/images", post(handle_match_images))
        .route("/imports/images/:id/assign", post(handle_manual_assign))
        .route("/users/me/watchlist", get(handle_get_watchlist))
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// endregion: --- App State / Router

// region:    --- Response Shaping

/// 거절/수락 공통 입찰 응답 본문
#[derive(Debug, Serialize, Deserialize)]
pub struct BidResponse {
    pub success: bool,
    pub result_code: ResultCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot: Option<crate::bidding::model::LotSnapshot>,
    pub proxy_triggered: bool,
    pub outbid_occurred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<i64>,
}

fn bid_outcome_response(outcome: BidOutcome) -> Response {
    let message = outcome_message(&outcome);
    let status = outcome.result_code.http_status();
    let body = BidResponse {
        success: outcome.accepted,
        result_code: outcome.result_code,
        message,
        lot: outcome.lot,
        proxy_triggered: outcome.proxy_triggered,
        outbid_occurred: outcome.outbid_occurred,
        floor: outcome.floor,
    };
    (status, Json(body)).into_response()
}

fn outcome_message(outcome: &BidOutcome) -> String {
    match outcome.result_code {
        ResultCode::Accepted => "입찰이 성공적으로 처리되었습니다.".to_string(),
        ResultCode::OutbidByProxy => {
            let current = outcome.lot.as_ref().map(|l| l.current_bid).unwrap_or(0);
            format!("프록시 입찰에 밀렸습니다. 현재가: {current}")
        }
        ResultCode::BidTooLow => {
            let floor = outcome.floor.unwrap_or(0);
            format!("입찰 금액이 낮습니다. 최소 다음 입찰가: {floor}")
        }
        ResultCode::TransientConflict => "일시적인 충돌입니다. 다시 시도해 주세요.".to_string(),
        code => format!("입찰이 거절되었습니다 ({})", code.as_str()),
    }
}

fn code_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message, "code": code })),
    )
        .into_response()
}

fn auth_error_response(err: AuthResolveError) -> Response {
    match err {
        AuthResolveError::Auth(AuthError::Missing) | AuthResolveError::Auth(AuthError::Invalid) => {
            code_response(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "인증이 필요합니다.",
            )
        }
        AuthResolveError::Auth(AuthError::Forbidden) => {
            code_response(StatusCode::FORBIDDEN, "FORBIDDEN", "권한이 없습니다.")
        }
        AuthResolveError::Store(e) => store_error_response(e),
    }
}

fn forbidden_response() -> Response {
    code_response(StatusCode::FORBIDDEN, "FORBIDDEN", "권한이 없습니다.")
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound => code_response(
            StatusCode::NOT_FOUND,
            ResultCode::NotFound.as_str(),
            "대상을 찾을 수 없습니다.",
        ),
        StoreError::Aborted => code_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ResultCode::TransientConflict.as_str(),
            "일시적인 충돌입니다. 다시 시도해 주세요.",
        ),
        StoreError::Conflict(msg) => {
            code_response(StatusCode::CONFLICT, "CONFLICT", &msg)
        }
        other => {
            error!("{:<12} --> 저장소 오류: {:?}", "Handler", other);
            code_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "내부 오류가 발생했습니다.",
            )
        }
    }
}

fn engine_error_response(err: EngineError) -> Response {
    match err {
        EngineError::Store(store_err) => store_error_response(store_err),
        EngineError::Invariant(msg) => {
            // 불변식 위반: 로그만 남기고 복구를 시도하지 않는다
            error!("{:<12} --> 불변식 위반: {}", "Handler", msg);
            code_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INVARIANT",
                "내부 오류가 발생했습니다.",
            )
        }
    }
}

async fn identify(state: &AppState, headers: &HeaderMap) -> Result<Identity, Response> {
    auth::authenticate(&state.store, &state.clock, headers)
        .await
        .map_err(auth_error_response)
}

// endregion: --- Response Shaping

// region:    --- Command Handlers

/// 입찰 요청 처리
pub async fn handle_bid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<PlaceBidCommand>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_bidder(&identity).is_err() {
        return forbidden_response();
    }
    info!(
        "{:<12} --> 입찰 요청: user={}, {:?}",
        "Handler", identity.user_id, cmd
    );
    match state.engine.place_bid(identity.user_id, cmd).await {
        Ok(outcome) => bid_outcome_response(outcome),
        Err(e) => engine_error_response(e),
    }
}

/// 즉시 구매 요청 처리
pub async fn handle_buy_now(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<BuyNowCommand>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_bidder(&identity).is_err() {
        return forbidden_response();
    }
    info!(
        "{:<12} --> 즉시 구매 요청: user={}, {:?}",
        "Handler", identity.user_id, cmd
    );
    match state.engine.buy_now(identity.user_id, cmd).await {
        Ok(outcome) => bid_outcome_response(outcome),
        Err(e) => engine_error_response(e),
    }
}

/// 로트 마감 (운영)
pub async fn handle_close_lot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lot_id): Path<i64>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_staff(&identity).is_err() {
        return forbidden_response();
    }
    // 아직 열리지 않은 로트는 마감 대상이 아니다
    match state.store.fetch_lot(lot_id).await {
        Ok(lot) if lot.status == crate::bidding::model::LotStatus::Pending => {
            return code_response(
                StatusCode::BAD_REQUEST,
                ResultCode::NotActive.as_str(),
                "아직 시작되지 않은 로트입니다.",
            );
        }
        Ok(_) => {}
        Err(e) => return store_error_response(e),
    }
    match state.closer.close_lot(lot_id).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => engine_error_response(e),
    }
}

/// 경매 마감 (운영)
pub async fn handle_close_auction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(auction_id): Path<i64>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_staff(&identity).is_err() {
        return forbidden_response();
    }
    match state.closer.close_auction(auction_id).await {
        Ok(auction) => (
            StatusCode::OK,
            Json(query::handlers::AuctionView::of(&auction)),
        )
            .into_response(),
        Err(e) => engine_error_response(e),
    }
}

/// 인보이스 생성 (운영)
pub async fn handle_generate_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(auction_id): Path<i64>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_staff(&identity).is_err() {
        return forbidden_response();
    }
    match state.invoicer.generate_invoices(auction_id).await {
        Ok(invoices) => {
            let ids: Vec<serde_json::Value> = invoices
                .iter()
                .map(|inv| {
                    serde_json::json!({
                        "id": inv.invoice.id,
                        "invoice_number": inv.invoice.invoice_number,
                        "bidder_id": inv.invoice.bidder_id,
                        "total": inv.invoice.total,
                    })
                })
                .collect();
            (StatusCode::OK, Json(serde_json::json!({ "invoices": ids }))).into_response()
        }
        Err(InvoiceError::NotFound) => store_error_response(StoreError::NotFound),
        Err(InvoiceError::NotClosed) => code_response(
            StatusCode::BAD_REQUEST,
            ResultCode::NotClosed.as_str(),
            "경매가 아직 마감되지 않았습니다.",
        ),
        Err(InvoiceError::AlreadyGenerated) => code_response(
            StatusCode::BAD_REQUEST,
            ResultCode::AlreadyGenerated.as_str(),
            "인보이스가 이미 생성되었습니다.",
        ),
        Err(InvoiceError::Store(e)) => store_error_response(e),
    }
}

/// 로트 CSV 임포트 (운영)
pub async fn handle_import_lots_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(auction_id): Path<i64>,
    body: Bytes,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_staff(&identity).is_err() {
        return forbidden_response();
    }
    match state.importer.import_lots_csv(auction_id, &body).await {
        Ok(result) => {
            if result.batch.status == crate::importer::model::BatchStatus::Rejected {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "code": ResultCode::InvalidCsv.as_str(),
                        "batch_id": result.batch.id,
                        "errors": result.batch.errors,
                    })),
                )
                    .into_response()
            } else {
                (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "batch_id": result.batch.id,
                        "inserted_lots": result.inserted_lots,
                    })),
                )
                    .into_response()
            }
        }
        Err(e) => store_error_response(e),
    }
}

/// 이미지 파일명 매칭 (운영)
pub async fn handle_match_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(auction_id): Path<i64>,
    Json(files): Json<Vec<UploadedImage>>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_staff(&identity).is_err() {
        return forbidden_response();
    }
    match state.importer.match_images(auction_id, files).await {
        Ok(result) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "batch_id": result.batch.id,
                "mappings": result.mappings,
            })),
        )
            .into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ManualAssignRequest {
    pub lot_id: i64,
    pub photo_order: i64,
}

/// 이미지 수동 배정 (운영)
pub async fn handle_manual_assign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(mapping_id): Path<i64>,
    Json(req): Json<ManualAssignRequest>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_staff(&identity).is_err() {
        return forbidden_response();
    }
    match state
        .importer
        .manual_assign(mapping_id, req.lot_id, req.photo_order)
        .await
    {
        Ok(mapping) => (StatusCode::OK, Json(mapping)).into_response(),
        Err(e) => store_error_response(e),
    }
}

// endregion: --- Command Handlers

// region:    --- Watch / Subscribe Handlers

/// 워치리스트 추가 (멱등)
pub async fn handle_add_watch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lot_id): Path<i64>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.store.add_watch(identity.user_id, lot_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "watching": true })),
        )
            .into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 워치리스트 제거 (멱등)
pub async fn handle_remove_watch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lot_id): Path<i64>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.store.remove_watch(identity.user_id, lot_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "watching": false })),
        )
            .into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 라이브 구독 (SSE). 초기 스냅샷 → 커밋 순서대로 증분 이벤트.
pub async fn handle_subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lot_id): Path<i64>,
) -> Response {
    if let Err(response) = identify(&state, &headers).await {
        return response;
    }
    let lot = match state.store.fetch_lot(lot_id).await {
        Ok(lot) => lot,
        Err(e) => return store_error_response(e),
    };
    // 구독 등록을 스냅샷 조회보다 먼저 하면 그 사이 커밋을 놓치지 않는다
    let rx = state.hub.subscribe(lot_id);
    let initial = LiveEvent {
        kind: LiveEventKind::Snapshot,
        lot: crate::bidding::model::LotSnapshot::of(&lot),
        at: state.clock.now().timestamp_millis(),
    };
    Sse::new(crate::hub::sse_stream(initial, rx, HEARTBEAT_INTERVAL)).into_response()
}

// endregion: --- Watch / Subscribe Handlers

// region:    --- Query Handlers

/// 로트 조회
pub async fn handle_get_lot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lot_id): Path<i64>,
) -> Response {
    if let Err(response) = identify(&state, &headers).await {
        return response;
    }
    match query::handlers::get_lot_snapshot(&state.store, lot_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 입찰 이력 조회
pub async fn handle_get_bid_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lot_id): Path<i64>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match query::handlers::get_bid_history(&state.store, &identity, lot_id).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 최고 입찰가 조회
pub async fn handle_get_highest_bid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lot_id): Path<i64>,
) -> Response {
    if let Err(response) = identify(&state, &headers).await {
        return response;
    }
    match query::handlers::get_highest_bid(&state.store, lot_id).await {
        Ok(highest) => Json(serde_json::json!({ "highest_bid": highest })).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 경매 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(auction_id): Path<i64>,
) -> Response {
    if let Err(response) = identify(&state, &headers).await {
        return response;
    }
    match query::handlers::get_auction_view(&state.store, auction_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 경매 로트 목록 조회
pub async fn handle_get_auction_lots(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(auction_id): Path<i64>,
) -> Response {
    if let Err(response) = identify(&state, &headers).await {
        return response;
    }
    match query::handlers::get_auction_lots(&state.store, auction_id).await {
        Ok(lots) => Json(lots).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 인보이스 목록 조회 (운영)
pub async fn handle_get_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(auction_id): Path<i64>,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    if auth::require_staff(&identity).is_err() {
        return forbidden_response();
    }
    match query::handlers::get_invoices(&state.store, auction_id).await {
        Ok(invoices) => Json(invoices).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// 내 워치리스트 조회
pub async fn handle_get_watchlist(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let identity = match identify(&state, &headers).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match query::handlers::get_watchlist(&state.store, identity.user_id).await {
        Ok(lots) => Json(lots).into_response(),
        Err(e) => store_error_response(e),
    }
}

// endregion: --- Query Handlers

/// 읽기 경로 SQL 상수
/// 쓰기 경로 SQL은 store::postgres의 트랜잭션 코드에 인라인으로 둔다.

/// 로트 컬럼 목록 (읽기/잠금 공용)
pub const LOT_COLUMNS: &str = "id, auction_id, lot_number, title, description, category, \
     condition, quantity, location, shipping_available, tags, starting_bid, \
     reserve_price, buy_now_price, increment_rules_override, original_close_at, \
     current_close_at, extension_count, status, current_bid, current_bidder_id, \
     bid_count, reserve_met, shipping_amount, closed_at, created_at";

/// 경매 컬럼 목록
pub const AUCTION_COLUMNS: &str = "id, title, status, start_at, end_at, soft_close_enabled, \
     trigger_window_secs, extension_secs, increment_rules, premium_rules, tax_rate_bp, created_at";

/// 비드 컬럼 목록
pub const BID_COLUMNS: &str = "id, lot_id, bidder_id, amount, bid_type, max_bid, max_bid_active, \
     is_winning, buy_now, status, previous_amount, previous_bidder_id, outbid_at, created_at";

/// 감사 이벤트 컬럼 목록
pub const AUDIT_COLUMNS: &str = "id, auction_id, lot_id, bidder_id, kind, previous_amount, \
     new_amount, result_code, result_message, snapshot, created_at";

/// 입찰 이력 조회 (최신순)
pub fn get_bid_history() -> String {
    format!("SELECT {BID_COLUMNS} FROM bids WHERE lot_id = $1 ORDER BY id DESC")
}

/// 로트 감사 이력 조회 (오래된 순)
pub fn get_audit_for_lot() -> String {
    format!("SELECT {AUDIT_COLUMNS} FROM audit_events WHERE lot_id = $1 ORDER BY id ASC")
}

/// 로트 조회
pub fn get_lot() -> String {
    format!("SELECT {LOT_COLUMNS} FROM lots WHERE id = $1")
}

/// 로트 배타 잠금 조회. NOWAIT이므로 경합은 즉시 실패하고
/// 호출자의 재시도 루프(Aborted)로 이어진다.
pub fn get_lot_for_update() -> String {
    format!("SELECT {LOT_COLUMNS} FROM lots WHERE id = $1 FOR UPDATE NOWAIT")
}

/// 경매 조회
pub fn get_auction() -> String {
    format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1")
}

/// 경매의 로트 목록 (로트 번호 순)
pub fn get_lots_for_auction() -> String {
    format!("SELECT {LOT_COLUMNS} FROM lots WHERE auction_id = $1 ORDER BY lot_number ASC")
}

/// 현재 승자 비드 조회
pub fn get_winning_bid() -> String {
    format!("SELECT {BID_COLUMNS} FROM bids WHERE lot_id = $1 AND is_winning LIMIT 1")
}

/// 입찰자의 유효한 최대 입찰 조회
pub fn get_active_max_bid() -> String {
    format!(
        "SELECT {BID_COLUMNS} FROM bids \
         WHERE lot_id = $1 AND bidder_id = $2 AND max_bid_active AND max_bid IS NOT NULL \
         ORDER BY id DESC LIMIT 1"
    )
}

/// 워치리스트 조회
pub const GET_WATCHLIST: &str =
    "SELECT lot_id FROM watchlist WHERE user_id = $1 ORDER BY lot_id ASC";

/// 토큰 → 신원 해석 (만료 세션 제외)
pub const RESOLVE_TOKEN: &str = "SELECT u.id AS user_id, u.role FROM sessions s \
     JOIN users u ON u.id = s.user_id WHERE s.token = $1 AND s.expires_at > $2";

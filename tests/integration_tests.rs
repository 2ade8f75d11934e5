/// HTTP 표면 통합 테스트.
/// 인메모리 저장소 위에 앱을 임시 포트로 띄우고 reqwest로 검증한다.
mod common;

use auction_engine::bidding::model::LotStatus;
use axum::http::StatusCode;
use common::{rig, seed_auction, seed_auction_with, seed_lot, seed_user, spawn_app, LotSeed};
use reqwest::Client;
use serde_json::{json, Value};

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// 신원 없는 요청은 401, 자원 존재 여부를 누설하지 않는다.
#[tokio::test]
async fn missing_identity_is_401() {
    let rig = rig();
    let base = spawn_app(&rig).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/bid"))
        .json(&json!({ "lot_id": 99999, "amount": 1000 }))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{base}/lots/99999"))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// 만료된 세션도 401.
#[tokio::test]
async fn expired_session_is_401() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let lot = seed_lot(&rig, auction.id, 1, LotSeed::default()).await;
    let (user_id, token) = seed_user(&rig, "bidder").await;
    let _ = user_id;
    let base = spawn_app(&rig).await;

    rig.clock.advance_secs(60 * 60 * 25); // 세션 만료(24h) 이후
    let response = Client::new()
        .get(format!("{base}/lots/{}", lot.id))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// 입찰 성공과 BID_TOO_LOW 바닥 보고.
#[tokio::test]
async fn bid_flow_over_http() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let lot = seed_lot(&rig, auction.id, 1, LotSeed::default()).await;
    let (_u1, t1) = seed_user(&rig, "bidder").await;
    let (_u2, t2) = seed_user(&rig, "bidder").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t1))
        .json(&json!({ "lot_id": lot.id, "amount": 10_000 }))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("JSON 파싱");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["result_code"], json!("ACCEPTED"));
    assert_eq!(body["lot"]["current_bid"], json!(10_000));

    let response = client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t2))
        .json(&json!({ "lot_id": lot.id, "amount": 10_500 }))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("JSON 파싱");
    assert_eq!(body["result_code"], json!("BID_TOO_LOW"));
    assert_eq!(body["floor"], json!(11_000));
}

/// 게스트 역할은 입찰할 수 없다 (403).
#[tokio::test]
async fn guest_cannot_bid() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let lot = seed_lot(&rig, auction.id, 1, LotSeed::default()).await;
    let (_guest, token) = seed_user(&rig, "guest").await;
    let base = spawn_app(&rig).await;

    let response = Client::new()
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&token))
        .json(&json!({ "lot_id": lot.id, "amount": 10_000 }))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// 프록시에 밀린 입찰은 200 + success=false + 새 현재가.
#[tokio::test]
async fn outbid_by_proxy_is_200_with_failure_body() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let lot = seed_lot(&rig, auction.id, 1, LotSeed::default()).await;
    let (_u1, t1) = seed_user(&rig, "bidder").await;
    let (_u2, t2) = seed_user(&rig, "bidder").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t1))
        .json(&json!({ "lot_id": lot.id, "amount": 10_000, "max_bid": 50_000 }))
        .send()
        .await
        .expect("요청 전송");

    let response = client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t2))
        .json(&json!({ "lot_id": lot.id, "amount": 11_000 }))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("JSON 파싱");
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["result_code"], json!("OUTBID_BY_PROXY"));
    assert_eq!(body["proxy_triggered"], json!(true));
    // 방어가: 11000 + 1000(구간 step) = 12000
    assert_eq!(body["lot"]["current_bid"], json!(12_000));
}

/// 입찰 이력: 타인에게는 입찰자/상한이 가려진다.
#[tokio::test]
async fn bid_history_redaction() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let lot = seed_lot(&rig, auction.id, 1, LotSeed::default()).await;
    let (u1, t1) = seed_user(&rig, "bidder").await;
    let (_u2, t2) = seed_user(&rig, "bidder").await;
    let (_staff, t_staff) = seed_user(&rig, "staff").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t1))
        .json(&json!({ "lot_id": lot.id, "amount": 10_000, "max_bid": 30_000 }))
        .send()
        .await
        .expect("요청 전송");

    // 타인: 가림
    let body: Value = client
        .get(format!("{base}/lots/{}/bids", lot.id))
        .header("Authorization", bearer(&t2))
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");
    assert_eq!(body[0]["bidder_id"], Value::Null);
    assert_eq!(body[0]["max_bid"], Value::Null);
    assert_eq!(body[0]["amount"], json!(10_000));

    // 본인: 전체
    let body: Value = client
        .get(format!("{base}/lots/{}/bids", lot.id))
        .header("Authorization", bearer(&t1))
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");
    assert_eq!(body[0]["bidder_id"], json!(u1));
    assert_eq!(body[0]["max_bid"], json!(30_000));

    // 스태프: 전체
    let body: Value = client
        .get(format!("{base}/lots/{}/bids", lot.id))
        .header("Authorization", bearer(&t_staff))
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");
    assert_eq!(body[0]["bidder_id"], json!(u1));
}

/// 없는 로트 이력 조회는 404.
#[tokio::test]
async fn bid_history_not_found() {
    let rig = rig();
    let (_u, token) = seed_user(&rig, "bidder").await;
    let base = spawn_app(&rig).await;

    let response = Client::new()
        .get(format!("{base}/lots/424242/bids"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// 운영 마감 플로우: 일반 입찰자는 403, 스태프는 마감 + 멱등.
#[tokio::test]
async fn admin_close_lot_over_http() {
    let rig = rig();
    let auction = seed_auction_with(&rig, false, None, None).await;
    let lot = seed_lot(
        &rig,
        auction.id,
        1,
        LotSeed {
            close_in_secs: 60,
            ..LotSeed::default()
        },
    )
    .await;
    let (_u1, t1) = seed_user(&rig, "bidder").await;
    let (_staff, t_staff) = seed_user(&rig, "staff").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t1))
        .json(&json!({ "lot_id": lot.id, "amount": 10_000 }))
        .send()
        .await
        .expect("요청 전송");

    let forbidden = client
        .post(format!("{base}/lots/{}/close", lot.id))
        .header("Authorization", bearer(&t1))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    rig.clock.advance_secs(60);
    let closed: Value = client
        .post(format!("{base}/lots/{}/close", lot.id))
        .header("Authorization", bearer(&t_staff))
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");
    assert_eq!(closed["status"], json!("sold"));

    // 두 번째 마감도 같은 응답 (멱등)
    let again: Value = client
        .post(format!("{base}/lots/{}/close", lot.id))
        .header("Authorization", bearer(&t_staff))
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");
    assert_eq!(again, closed);
}

/// 경매 마감 + 인보이스: NOT_CLOSED → 마감 → 생성 → ALREADY_GENERATED.
#[tokio::test]
async fn invoice_flow_over_http() {
    let rig = rig();
    let auction = seed_auction_with(&rig, false, Some(1_500), None).await;
    let lot = seed_lot(
        &rig,
        auction.id,
        1,
        LotSeed {
            close_in_secs: 60,
            ..LotSeed::default()
        },
    )
    .await;
    let (_u1, t1) = seed_user(&rig, "bidder").await;
    let (_staff, t_staff) = seed_user(&rig, "staff").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t1))
        .json(&json!({ "lot_id": lot.id, "amount": 10_000 }))
        .send()
        .await
        .expect("요청 전송");

    let early = client
        .post(format!("{base}/auctions/{}/invoices", auction.id))
        .header("Authorization", bearer(&t_staff))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(early.status(), StatusCode::BAD_REQUEST);
    let body: Value = early.json().await.expect("JSON 파싱");
    assert_eq!(body["code"], json!("NOT_CLOSED"));

    rig.clock.advance_secs(60);
    let closed = client
        .post(format!("{base}/auctions/{}/close", auction.id))
        .header("Authorization", bearer(&t_staff))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(closed.status(), StatusCode::OK);

    // 마감 시 자동 생성되었으므로 재요청은 ALREADY_GENERATED
    let again = client
        .post(format!("{base}/auctions/{}/invoices", auction.id))
        .header("Authorization", bearer(&t_staff))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    let body: Value = again.json().await.expect("JSON 파싱");
    assert_eq!(body["code"], json!("ALREADY_GENERATED"));

    let invoices: Value = client
        .get(format!("{base}/auctions/{}/invoices", auction.id))
        .header("Authorization", bearer(&t_staff))
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");
    let list = invoices.as_array().expect("배열");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["invoice"]["subtotal"], json!(10_000));
    assert_eq!(list[0]["invoice"]["premium"], json!(1_500));
    assert_eq!(list[0]["invoice"]["total"], json!(11_500));
}

/// CSV 임포트: 정상 배치는 pending 로트로 삽입, 오류 배치는 400 + 행 오류.
#[tokio::test]
async fn csv_import_over_http() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let (_staff, t_staff) = seed_user(&rig, "staff").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    let good_csv = "lot_number,title,starting_bid,reserve_price\n\
                    1,\"의자, 오크\",100.00,150\n\
                    2,책상,250.55,\n";
    let response = client
        .post(format!("{base}/auctions/{}/import/lots", auction.id))
        .header("Authorization", bearer(&t_staff))
        .body(good_csv.as_bytes().to_vec())
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("JSON 파싱");
    assert_eq!(body["inserted_lots"], json!(2));

    let lots = rig.store.lots_for_auction(auction.id).await.unwrap();
    assert_eq!(lots.len(), 2);
    assert!(lots.iter().all(|l| l.status == LotStatus::Pending));
    assert_eq!(lots[0].title, "의자, 오크");
    assert_eq!(lots[0].starting_bid, 10_000);
    assert_eq!(lots[0].reserve_price, Some(15_000));

    // 기존 로트 번호와 충돌하는 배치는 통째로 거부
    let bad_csv = "lot_number,title,starting_bid\n1,중복,10\n3,정상,20\n";
    let response = client
        .post(format!("{base}/auctions/{}/import/lots", auction.id))
        .header("Authorization", bearer(&t_staff))
        .body(bad_csv.as_bytes().to_vec())
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("JSON 파싱");
    assert_eq!(body["code"], json!("INVALID_CSV"));
    assert!(!body["errors"].as_array().expect("배열").is_empty());
    // 거부된 배치는 아무 로트도 넣지 않는다
    assert_eq!(rig.store.lots_for_auction(auction.id).await.unwrap().len(), 2);
}

/// 이미지 매칭 엔드포인트 (시나리오 8 입력).
#[tokio::test]
async fn image_matching_over_http() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    seed_lot(&rig, auction.id, 12, LotSeed::default()).await;
    let (_staff, t_staff) = seed_user(&rig, "staff").await;
    let base = spawn_app(&rig).await;

    let files = json!([
        { "filename": "12-1.jpg", "stored_url": "https://cdn.example.com/a" },
        { "filename": "lot_12_2.PNG", "stored_url": "https://cdn.example.com/b" },
        { "filename": "12.3.webp", "stored_url": "https://cdn.example.com/c" },
        { "filename": "foo.jpg", "stored_url": "https://cdn.example.com/d" },
        { "filename": "12-1.jpg", "stored_url": "https://cdn.example.com/e" },
    ]);
    let body: Value = Client::new()
        .post(format!("{base}/auctions/{}/import/images", auction.id))
        .header("Authorization", bearer(&t_staff))
        .json(&files)
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");

    let mappings = body["mappings"].as_array().expect("배열");
    let statuses: Vec<&str> = mappings
        .iter()
        .map(|m| m["status"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        vec!["matched", "matched", "matched", "unmatched", "conflict"]
    );
}

/// 워치리스트 HTTP 플로우.
#[tokio::test]
async fn watchlist_over_http() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let lot = seed_lot(&rig, auction.id, 1, LotSeed::default()).await;
    let (_u1, token) = seed_user(&rig, "bidder").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/lots/{}/watch", lot.id))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::OK);

    let list: Value = client
        .get(format!("{base}/users/me/watchlist"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .expect("요청 전송")
        .json()
        .await
        .expect("JSON 파싱");
    assert_eq!(list.as_array().expect("배열").len(), 1);

    let response = client
        .delete(format!("{base}/lots/{}/watch", lot.id))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(response.status(), StatusCode::OK);

    let missing = client
        .post(format!("{base}/lots/424242/watch"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

/// 라이브 구독: 첫 프레임은 스냅샷, 입찰 후 bid 프레임이 이어진다.
#[tokio::test]
async fn sse_snapshot_then_bid() {
    let rig = rig();
    let auction = seed_auction(&rig).await;
    let lot = seed_lot(&rig, auction.id, 1, LotSeed::default()).await;
    let (_u1, t1) = seed_user(&rig, "bidder").await;
    let (_u2, t2) = seed_user(&rig, "bidder").await;
    let base = spawn_app(&rig).await;
    let client = Client::new();

    let mut response = client
        .get(format!("{base}/lots/{}/live", lot.id))
        .header("Authorization", bearer(&t2))
        .send()
        .await
        .expect("구독 연결");
    assert_eq!(response.status(), StatusCode::OK);

    // 첫 프레임은 스냅샷
    let first = tokio::time::timeout(std::time::Duration::from_secs(5), response.chunk())
        .await
        .expect("타임아웃")
        .expect("청크 읽기")
        .expect("스트림 종료 아님");
    let first_text = String::from_utf8_lossy(&first);
    assert!(first_text.contains("\"kind\":\"snapshot\""));

    // 입찰 발생 → bid 프레임
    client
        .post(format!("{base}/bid"))
        .header("Authorization", bearer(&t1))
        .json(&json!({ "lot_id": lot.id, "amount": 10_000 }))
        .send()
        .await
        .expect("요청 전송");

    let mut seen_bid = false;
    for _ in 0..4 {
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), response.chunk())
            .await
            .expect("타임아웃")
            .expect("청크 읽기");
        let Some(chunk) = chunk else { break };
        let text = String::from_utf8_lossy(&chunk);
        if text.contains("\"kind\":\"bid\"") && text.contains("10000") {
            seen_bid = true;
            break;
        }
    }
    assert!(seen_bid);

    // 없는 로트 구독은 404
    let missing = client
        .get(format!("{base}/lots/424242/live"))
        .header("Authorization", bearer(&t2))
        .send()
        .await
        .expect("요청 전송");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

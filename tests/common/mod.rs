//! 테스트 공용 리그: 인메모리 저장소 + 수동 시계 위에 전체 스택을 조립한다.
// 각 테스트 바이너리가 서로 다른 부분집합만 쓴다
#![allow(dead_code)]

use auction_engine::auction::model::{
    Auction, AuctionStatus, IncrementTier, NewAuction, PremiumTier, UserId,
};
use auction_engine::bidding::commands::BiddingEngine;
use auction_engine::bidding::model::{Lot, LotStatus, NewLot};
use auction_engine::bidding::rules;
use auction_engine::clock::{Clock, ManualClock};
use auction_engine::handlers::{app, AppState};
use auction_engine::hub::LotHub;
use auction_engine::importer::Importer;
use auction_engine::invoice::Invoicer;
use auction_engine::notifier::NoopNotifier;
use auction_engine::scheduler::Closer;
use auction_engine::store::{MemStore, SharedStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

pub struct TestRig {
    pub mem: Arc<MemStore>,
    pub store: SharedStore,
    pub clock: Arc<ManualClock>,
    pub hub: Arc<LotHub>,
    pub engine: Arc<BiddingEngine>,
    pub closer: Arc<Closer>,
    pub invoicer: Arc<Invoicer>,
    pub importer: Arc<Importer>,
}

pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn rig() -> TestRig {
    let mem = MemStore::new_shared();
    let store: SharedStore = mem.clone();
    let clock = ManualClock::new_shared(test_epoch());
    let clock_shared: auction_engine::clock::SharedClock = clock.clone();
    let hub = LotHub::new_shared(64);
    let notifier = NoopNotifier::new_shared();
    let engine = Arc::new(BiddingEngine::new(
        Arc::clone(&store),
        Arc::clone(&clock_shared),
        Arc::clone(&hub),
        Arc::clone(&notifier),
    ));
    let invoicer = Arc::new(Invoicer::new(Arc::clone(&store), Arc::clone(&clock_shared)));
    let closer = Arc::new(Closer::new(
        Arc::clone(&store),
        Arc::clone(&clock_shared),
        Arc::clone(&hub),
        Arc::clone(&notifier),
        Arc::clone(&invoicer),
    ));
    let importer = Arc::new(Importer::new(Arc::clone(&store), Arc::clone(&clock_shared)));
    TestRig {
        mem,
        store,
        clock,
        hub,
        engine,
        closer,
        invoicer,
        importer,
    }
}

/// 기본 경매: 활성, 기본 증분 구간, 15% 프리미엄, 소프트 클로즈 5분/5분
pub async fn seed_auction(rig: &TestRig) -> Auction {
    seed_auction_with(rig, true, Some(1_500), None).await
}

pub async fn seed_auction_with(
    rig: &TestRig,
    soft_close: bool,
    premium_bp: Option<i64>,
    tax_rate_bp: Option<i64>,
) -> Auction {
    let now = rig.clock.now();
    rig.store
        .insert_auction(NewAuction {
            title: "테스트 경매".to_string(),
            status: AuctionStatus::Active,
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            soft_close_enabled: soft_close,
            trigger_window_secs: 300,
            extension_secs: 300,
            increment_rules: rules::default_increment_tiers(),
            premium_rules: premium_bp
                .map(|rate_bp| {
                    vec![PremiumTier {
                        min: 0,
                        max: None,
                        rate_bp,
                    }]
                })
                .unwrap_or_default(),
            tax_rate_bp,
        })
        .await
        .expect("경매 생성")
}

pub struct LotSeed {
    pub starting_bid: i64,
    pub reserve_price: Option<i64>,
    pub buy_now_price: Option<i64>,
    pub increment_override: Option<Vec<IncrementTier>>,
    pub close_in_secs: i64,
}

impl Default for LotSeed {
    fn default() -> Self {
        Self {
            starting_bid: 10_000,
            reserve_price: None,
            buy_now_price: None,
            increment_override: None,
            close_in_secs: 3_600,
        }
    }
}

pub async fn seed_lot(rig: &TestRig, auction_id: i64, lot_number: i64, seed: LotSeed) -> Lot {
    let close_at = rig.clock.now() + Duration::seconds(seed.close_in_secs);
    rig.store
        .insert_lot(NewLot {
            auction_id,
            lot_number,
            title: format!("로트 {lot_number}"),
            description: String::new(),
            category: None,
            condition: None,
            quantity: 1,
            location: None,
            shipping_available: false,
            tags: vec![],
            starting_bid: seed.starting_bid,
            reserve_price: seed.reserve_price,
            buy_now_price: seed.buy_now_price,
            increment_rules_override: seed.increment_override,
            original_close_at: close_at,
            status: LotStatus::Active,
            shipping_amount: 0,
        })
        .await
        .expect("로트 생성")
}

/// 입찰자 + 세션 생성. 토큰은 "token-<id>" 형식으로 돌려준다.
pub async fn seed_user(rig: &TestRig, role: &str) -> (UserId, String) {
    let user_id = rig
        .store
        .insert_user(&format!("user-{role}"), role)
        .await
        .expect("사용자 생성");
    let token = format!("token-{user_id}");
    rig.store
        .insert_session(&token, user_id, rig.clock.now() + Duration::days(1))
        .await
        .expect("세션 생성");
    (user_id, token)
}

/// 인프로세스 HTTP 앱을 임시 포트에 띄우고 base URL을 돌려준다.
pub async fn spawn_app(rig: &TestRig) -> String {
    let state = AppState {
        store: Arc::clone(&rig.store),
        clock: rig.clock.clone(),
        hub: Arc::clone(&rig.hub),
        engine: Arc::clone(&rig.engine),
        closer: Arc::clone(&rig.closer),
        invoicer: Arc::clone(&rig.invoicer),
        importer: Arc::clone(&rig.importer),
    };
    let router = app(state, 1024 * 1024 * 20);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("리스너 바인드");
    let addr = listener.local_addr().expect("로컬 주소");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service()).await;
    });
    format!("http://{addr}")
}

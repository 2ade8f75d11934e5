// region:    --- Imports
use auction_engine::bidding::commands::BiddingEngine;
use auction_engine::clock::SystemClock;
use auction_engine::config::Config;
use auction_engine::handlers::{app, AppState};
use auction_engine::hub::LotHub;
use auction_engine::importer::Importer;
use auction_engine::invoice::Invoicer;
use auction_engine::notifier::{KafkaNotifier, NoopNotifier, SharedNotifier};
use auction_engine::scheduler::{AuctionScheduler, Closer};
use auction_engine::store::{PgStore, SharedStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env();

    // 저장소 연결 + 초기화
    let database_url = config
        .database_url
        .clone()
        .ok_or("DATABASE_URL must be set")?;
    let pg = PgStore::connect(&database_url).await?;
    if let Err(e) = pg.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");
    let store: SharedStore = Arc::new(pg);

    // 노티파이어 (Kafka가 꺼져 있으면 no-op)
    let notifier: SharedNotifier = if config.kafka_enabled {
        let kafka = KafkaNotifier::new(&config.kafka_brokers, "auction-events")?;
        if let Err(e) = kafka.create_topic(5, 1).await {
            error!("{:<12} --> Kafka 초기화 실패: {:?}", "Main", e);
            return Err(e.into());
        }
        info!("{:<12} --> Kafka 초기화 성공", "Main");
        Arc::new(kafka)
    } else {
        info!("{:<12} --> Kafka 비활성화, Noop 노티파이어 사용", "Main");
        NoopNotifier::new_shared()
    };

    // 컴포넌트 조립
    let clock = SystemClock::new_shared();
    let hub = LotHub::new_shared(config.hub_capacity);
    let engine = Arc::new(BiddingEngine::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        Arc::clone(&hub),
        Arc::clone(&notifier),
    ));
    let invoicer = Arc::new(Invoicer::new(Arc::clone(&store), Arc::clone(&clock)));
    let closer = Arc::new(Closer::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        Arc::clone(&hub),
        Arc::clone(&notifier),
        Arc::clone(&invoicer),
    ));
    let importer = Arc::new(Importer::new(Arc::clone(&store), Arc::clone(&clock)));

    // 상태 스케줄러 시작 (활성화/마감/인보이스)
    let scheduler = AuctionScheduler::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        Arc::clone(&closer),
        config.sweep_interval,
    );
    scheduler.start().await;

    // 라우터 설정
    let state = AppState {
        store,
        clock,
        hub,
        engine,
        closer,
        invoicer,
        importer,
    };
    let routes_all = app(state, config.body_limit);

    // 리스너 생성
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main

/// 환경 변수 기반 런타임 설정
// region:    --- Imports
use std::time::Duration;

// endregion: --- Imports

// region:    --- Config

#[derive(Debug, Clone)]
pub struct Config {
    /// 웹 서버 바인드 주소
    pub bind_addr: String,
    /// Postgres 연결 URL (없으면 기동 실패)
    pub database_url: Option<String>,
    /// Kafka 브로커 주소
    pub kafka_brokers: String,
    /// Kafka 알림 사용 여부 (테스트/로컬에서는 끈다)
    pub kafka_enabled: bool,
    /// 스케줄러 틱 간격
    pub sweep_interval: Duration,
    /// 구독 허브 브로드캐스트 버퍼 크기
    pub hub_capacity: usize,
    /// 요청 본문 최대 크기 (CSV 업로드 포함)
    pub body_limit: usize,
}

impl Config {
    /// 환경 변수에서 설정을 읽는다. 없는 값은 기본값으로 채운다.
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            kafka_brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            kafka_enabled: std::env::var("KAFKA_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            sweep_interval: Duration::from_secs(1),
            hub_capacity: 256,
            body_limit: 1024 * 1024 * 20,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            kafka_brokers: "localhost:9092".to_string(),
            kafka_enabled: false,
            sweep_interval: Duration::from_secs(1),
            hub_capacity: 256,
            body_limit: 1024 * 1024 * 20,
        }
    }
}

// endregion: --- Config

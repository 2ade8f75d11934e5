/// 노티파이어 협력자.
/// 커밋된 입찰 이벤트를 외부(알림/메일 발송 서비스)로 내보낸다.
/// 게이트가 아닌 관찰자이므로 발행 실패는 로깅만 하고 전파하지 않는다.
// region:    --- Imports
use crate::hub::LiveEvent;
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Notifier Trait

#[async_trait]
pub trait Notifier: Send + Sync {
    /// 커밋 이후 이벤트 발행
    async fn publish(&self, event: &LiveEvent);
}

pub type SharedNotifier = Arc<dyn Notifier>;

// endregion: --- Notifier Trait

// region:    --- Kafka Notifier

pub struct KafkaNotifier {
    producer: FutureProducer,
    brokers: String,
    topic: String,
}

/// KafkaNotifier 구현
impl KafkaNotifier {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(KafkaNotifier {
            producer,
            brokers: brokers.to_string(),
            topic: topic.to_string(),
        })
    }

    /// 토픽 생성
    pub async fn create_topic(
        &self,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), String> {
        info!(
            "{:<12} --> Kafka 토픽 생성 시작: {}",
            "Notifier", self.topic
        );

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| format!("AdminClient 생성 실패: {:?}", e))?;

        let new_topic = NewTopic::new(
            &self.topic,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        match admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
        {
            Ok(_) => {
                info!(
                    "{:<12} --> Kafka 토픽 생성 성공: {}",
                    "Notifier", self.topic
                );
                Ok(())
            }
            Err(e) => {
                error!("{:<12} --> Kafka 토픽 생성 실패: {:?}", "Notifier", e);
                Err(format!("토픽 생성 실패: {:?}", e))
            }
        }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn publish(&self, event: &LiveEvent) {
        let key = event.lot.lot_id.to_string();
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("{:<12} --> 이벤트 직렬화 실패: {:?}", "Notifier", e);
                return;
            }
        };
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);
        if let Err((e, _)) = self.producer.send(record, Duration::from_secs(0)).await {
            error!("{:<12} --> Kafka 발행 실패: {:?}", "Notifier", e);
        }
    }
}

// endregion: --- Kafka Notifier

// region:    --- Noop Notifier

/// 테스트/로컬용: 아무 것도 내보내지 않는다
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new_shared() -> SharedNotifier {
        Arc::new(NoopNotifier)
    }
}

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(&self, _event: &LiveEvent) {}
}

// endregion: --- Noop Notifier

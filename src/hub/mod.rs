/// 로트별 구독 허브.
/// 엔진 트랜잭션 커밋 이후에만 발행되는 관찰자이며, 느린 구독자는
/// 발행자를 막지 않고 분리된다. 과거 이벤트 재생은 없다.
// region:    --- Imports
use crate::auction::model::LotId;
use crate::bidding::model::LotSnapshot;
use axum::response::sse;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

// endregion: --- Imports

// region:    --- Live Event

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveEventKind {
    Snapshot,
    Bid,
    SoftClose,
    LotClosed,
    Heartbeat,
}

/// 구독자에게 전달되는 이벤트. at은 epoch 밀리초.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    pub kind: LiveEventKind,
    pub lot: LotSnapshot,
    pub at: i64,
}

// endregion: --- Live Event

// region:    --- Lot Hub

/// 유휴 하트비트 간격 (최대 30초에 한 번)
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct LotHub {
    capacity: usize,
    topics: StdMutex<HashMap<LotId, broadcast::Sender<LiveEvent>>>,
}

impl LotHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: StdMutex::new(HashMap::new()),
        }
    }

    pub fn new_shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// 로트 토픽 구독. 토픽이 없으면 만든다.
    pub fn subscribe(&self, lot_id: LotId) -> broadcast::Receiver<LiveEvent> {
        let mut topics = self.topics.lock().expect("topics 잠금");
        topics
            .entry(lot_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 커밋 이후 발행. 구독자가 없으면 no-op이고 빈 토픽은 정리한다.
    pub fn publish(&self, lot_id: LotId, event: LiveEvent) {
        let mut topics = self.topics.lock().expect("topics 잠금");
        if let Some(sender) = topics.get(&lot_id) {
            if sender.send(event).is_err() {
                // 수신자 전무
                topics.remove(&lot_id);
                debug!("{:<12} --> 빈 토픽 정리: lot={}", "Hub", lot_id);
            }
        }
    }

    pub fn subscriber_count(&self, lot_id: LotId) -> usize {
        let topics = self.topics.lock().expect("topics 잠금");
        topics
            .get(&lot_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

// endregion: --- Lot Hub

// region:    --- SSE Stream

/// SSE 이벤트 스트림을 만든다.
/// 초기 스냅샷 프레임을 먼저 내보내고, 이후 발행 순서대로 중계한다.
/// 유휴 시간이 heartbeat를 넘길 때마다 하트비트 프레임을 내보내고,
/// 버퍼를 놓친(lagged) 구독자는 스트림 종료로 분리한다.
pub fn sse_stream(
    initial: LiveEvent,
    rx: broadcast::Receiver<LiveEvent>,
    heartbeat: Duration,
) -> impl Stream<Item = Result<sse::Event, Infallible>> {
    let updates = BroadcastStream::new(rx)
        .timeout(heartbeat)
        .map_while(|next| match next {
            Ok(Ok(event)) => Some(event_frame(&event)),
            // 유휴 시간 초과 → 하트비트
            Err(_) => Some(heartbeat_frame()),
            // 버퍼를 놓친 구독자는 분리한다
            Ok(Err(BroadcastStreamRecvError::Lagged(_))) => None,
        });
    tokio_stream::once(event_frame(&initial))
        .chain(updates)
        .map(Ok::<sse::Event, Infallible>)
}

fn event_frame(event: &LiveEvent) -> sse::Event {
    sse::Event::default().data(serde_json::to_string(event).unwrap_or_default())
}

fn heartbeat_frame() -> sse::Event {
    sse::Event::default().data(serde_json::json!({ "kind": "heartbeat" }).to_string())
}

// endregion: --- SSE Stream

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidding::model::LotStatus;

    fn event(kind: LiveEventKind, bid: i64) -> LiveEvent {
        LiveEvent {
            kind,
            lot: LotSnapshot {
                lot_id: 1,
                auction_id: 1,
                lot_number: 1,
                status: LotStatus::Active,
                starting_bid: 0,
                current_bid: bid,
                current_bidder_id: Some(1),
                bid_count: 1,
                reserve_met: false,
                buy_now_price: None,
                original_close_at: 0,
                current_close_at: 0,
                extension_count: 0,
            },
            at: bid,
        }
    }

    #[tokio::test]
    async fn subscribers_observe_publication_order() {
        let hub = LotHub::new(16);
        let mut rx = hub.subscribe(1);
        hub.publish(1, event(LiveEventKind::Bid, 100));
        hub.publish(1, event(LiveEventKind::Bid, 200));
        hub.publish(1, event(LiveEventKind::SoftClose, 200));

        assert_eq!(rx.recv().await.unwrap().lot.current_bid, 100);
        assert_eq!(rx.recv().await.unwrap().lot.current_bid, 200);
        assert_eq!(rx.recv().await.unwrap().kind, LiveEventKind::SoftClose);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = LotHub::new(16);
        // 구독자가 없어도 발행자는 막히지 않는다
        hub.publish(42, event(LiveEventKind::Bid, 1));
        assert_eq!(hub.subscriber_count(42), 0);
    }

    #[tokio::test]
    async fn topics_are_isolated_per_lot() {
        let hub = LotHub::new(16);
        let mut rx1 = hub.subscribe(1);
        let mut rx2 = hub.subscribe(2);
        hub.publish(1, event(LiveEventKind::Bid, 111));
        hub.publish(2, event(LiveEventKind::Bid, 222));
        assert_eq!(rx1.recv().await.unwrap().lot.current_bid, 111);
        assert_eq!(rx2.recv().await.unwrap().lot.current_bid, 222);
    }

    #[tokio::test]
    async fn lagged_subscriber_is_detached() {
        let hub = LotHub::new(2);
        let rx = hub.subscribe(1);
        // 버퍼(2)보다 많이 발행해 구독자를 lagged 상태로 만든다
        for i in 0..8 {
            hub.publish(1, event(LiveEventKind::Bid, i));
        }
        let stream = sse_stream(
            event(LiveEventKind::Snapshot, 0),
            rx,
            Duration::from_millis(50),
        );
        tokio::pin!(stream);
        // 스냅샷 프레임은 항상 먼저 온다
        assert!(stream.next().await.is_some());
        // 다음 수신에서 Lagged → 스트림 종료 (분리)
        let mut ended = false;
        for _ in 0..4 {
            if stream.next().await.is_none() {
                ended = true;
                break;
            }
        }
        assert!(ended);
    }

    #[tokio::test]
    async fn idle_subscriber_gets_heartbeat() {
        let hub = LotHub::new(16);
        let rx = hub.subscribe(1);
        let stream = sse_stream(
            event(LiveEventKind::Snapshot, 0),
            rx,
            Duration::from_millis(20),
        );
        tokio::pin!(stream);
        // 스냅샷 다음, 발행이 없으면 하트비트 프레임이 온다
        assert!(stream.next().await.is_some());
        let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("하트비트 대기")
            .expect("스트림 유지")
            .expect("프레임");
        assert!(format!("{frame:?}").contains("heartbeat"));
    }
}

// endregion: --- Tests

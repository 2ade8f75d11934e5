/// 서버 권위 시간 소스
/// 마감 판정("이 로트는 닫혔는가?")은 오직 이 시계만 사용한다.
// region:    --- Imports
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

// endregion: --- Imports

// region:    --- Clock Trait

/// 현재 시각 제공자 트레이트
pub trait Clock: Send + Sync {
    /// 현재 시각 (UTC)
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

// endregion: --- Clock Trait

// region:    --- System Clock

/// 운영용 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new_shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// endregion: --- System Clock

// region:    --- Manual Clock

/// 테스트용 수동 시계 (밀리초 단위로 전진만 가능, 역행 불가)
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn new_shared(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    /// 시계를 지정한 밀리초만큼 전진
    pub fn advance_ms(&self, delta_ms: i64) {
        assert!(delta_ms >= 0, "시계는 역행할 수 없습니다");
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// 시계를 지정한 초만큼 전진
    pub fn advance_secs(&self, delta_secs: i64) {
        self.advance_ms(delta_secs * 1000);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms.load(Ordering::SeqCst))
            .single()
            .expect("유효한 타임스탬프")
    }
}

// endregion: --- Manual Clock

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1);
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance_secs(90);
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }
}

// endregion: --- Tests

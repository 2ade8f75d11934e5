/// 무작위 입찰 이력에 대한 속성 테스트.
/// 어떤 순서의 입찰이 와도 깨지면 안 되는 불변식을 검사한다.
mod common;

use auction_engine::auction::events::AuditKind;
use auction_engine::bidding::commands::PlaceBidCommand;
use common::{rig, seed_auction_with, seed_lot, seed_user, LotSeed};
use proptest::prelude::*;

/// 무작위 입찰 한 건: (입찰자 인덱스, 금액, 상한 여분)
#[derive(Debug, Clone)]
struct RandomBid {
    bidder_idx: usize,
    amount: i64,
    max_extra: Option<i64>,
}

fn arb_bid() -> impl Strategy<Value = RandomBid> {
    (
        0usize..5,
        1i64..50_000,
        prop_oneof![Just(None), (0i64..100_000).prop_map(Some)],
    )
        .prop_map(|(bidder_idx, amount, max_extra)| RandomBid {
            bidder_idx,
            amount,
            max_extra,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// 임의 이력에서: 승자 비드는 항상 1개 이하이고 로트 스냅샷과 일치하며,
    /// current_bid는 수락될 때마다 순증하고, current_close_at은 줄지 않고,
    /// bid_placed 감사는 모두 실제 비드 행에 대응한다.
    #[test]
    fn random_histories_preserve_invariants(bids in prop::collection::vec(arb_bid(), 1..30)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("런타임");
        rt.block_on(async move {
            let rig = rig();
            let auction = seed_auction_with(&rig, true, None, None).await;
            let lot = seed_lot(&rig, auction.id, 1, LotSeed {
                starting_bid: 1_000,
                close_in_secs: 3_600,
                ..LotSeed::default()
            }).await;
            let mut users = Vec::new();
            for _ in 0..5 {
                let (uid, _) = seed_user(&rig, "bidder").await;
                users.push(uid);
            }

            let mut last_accepted_bid = 0i64;
            let mut last_close_at = lot.original_close_at.timestamp();
            for random in &bids {
                // 시간도 조금씩 흐른다
                rig.clock.advance_secs(1);
                let cmd = PlaceBidCommand {
                    lot_id: lot.id,
                    amount: random.amount,
                    max_bid: random.max_extra.map(|extra| random.amount + extra),
                };
                let outcome = rig.engine.place_bid(users[random.bidder_idx], cmd)
                    .await
                    .expect("엔진 오류 없음");
                if let Some(snapshot) = &outcome.lot {
                    // 마감은 절대 줄지 않는다
                    prop_assert!(snapshot.current_close_at >= last_close_at);
                    last_close_at = snapshot.current_close_at;
                    if outcome.accepted {
                        // 수락마다 순증
                        prop_assert!(snapshot.current_bid > last_accepted_bid);
                    }
                    // 상태 변경이 있으면 비감소
                    if outcome.state_changed {
                        prop_assert!(snapshot.current_bid >= last_accepted_bid);
                        last_accepted_bid = snapshot.current_bid;
                    }
                }
            }

            let after = rig.store.fetch_lot(lot.id).await.expect("로트 조회");
            let history = rig.store.bid_history(lot.id).await.expect("이력 조회");

            // 승자 비드는 1개 이하, 로트 스냅샷과 일치
            let winners: Vec<_> = history.iter().filter(|b| b.is_winning).collect();
            prop_assert!(winners.len() <= 1);
            if let Some(winner) = winners.first() {
                prop_assert_eq!(winner.amount, after.current_bid);
                prop_assert_eq!(Some(winner.bidder_id), after.current_bidder_id);
            } else {
                prop_assert_eq!(after.bid_count, 0);
            }

            // 입찰이 있으면 current_bid ≥ starting_bid
            if after.bid_count > 0 {
                prop_assert!(after.current_bid >= after.starting_bid);
            }

            // 입찰자별 유효 상한은 1개 이하
            for uid in &users {
                let active = history.iter()
                    .filter(|b| b.bidder_id == *uid && b.max_bid_active)
                    .count();
                prop_assert!(active <= 1);
            }

            // 감사 대응: bid_placed마다 실제 비드 행, 고아 감사 없음
            let audits = rig.store.audit_for_lot(lot.id).await.expect("감사 조회");
            for audit in audits.iter().filter(|a| a.kind == AuditKind::BidPlaced) {
                prop_assert!(history.iter().any(|b| {
                    Some(b.bidder_id) == audit.bidder_id
                        && Some(b.amount) == audit.new_amount
                        && b.created_at == audit.created_at
                }), "orphaned bid_placed audit");
            }
            // 감사 created_at 단조성
            let mut prev = None;
            for audit in &audits {
                if let Some(p) = prev {
                    prop_assert!(audit.created_at >= p);
                }
                prev = Some(audit.created_at);
            }
            Ok(())
        })?;
    }

    /// 마감 후에는 어떤 입찰도 상태를 바꾸지 못한다.
    #[test]
    fn no_bid_lands_after_close(bids in prop::collection::vec(arb_bid(), 1..10)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("런타임");
        rt.block_on(async move {
            let rig = rig();
            let auction = seed_auction_with(&rig, false, None, None).await;
            let lot = seed_lot(&rig, auction.id, 1, LotSeed {
                starting_bid: 1_000,
                close_in_secs: 60,
                ..LotSeed::default()
            }).await;
            let mut users = Vec::new();
            for _ in 0..5 {
                let (uid, _) = seed_user(&rig, "bidder").await;
                users.push(uid);
            }

            rig.clock.advance_secs(60);
            rig.closer.close_lot(lot.id).await.expect("마감");
            let closed = rig.store.fetch_lot(lot.id).await.expect("로트");
            prop_assert!(closed.status.is_terminal());

            for random in &bids {
                let cmd = PlaceBidCommand {
                    lot_id: lot.id,
                    amount: random.amount,
                    max_bid: random.max_extra.map(|extra| random.amount + extra),
                };
                let outcome = rig.engine.place_bid(users[random.bidder_idx], cmd)
                    .await
                    .expect("엔진 오류 없음");
                prop_assert!(!outcome.state_changed);
            }
            let after = rig.store.fetch_lot(lot.id).await.expect("로트");
            prop_assert_eq!(after.bid_count, closed.bid_count);
            prop_assert_eq!(after.status, closed.status);
            Ok(())
        })?;
    }
}

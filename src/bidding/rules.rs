/// 순수 규칙 함수: 증분 구간, 구매자 수수료, 최소 다음 입찰가, 파일명 파싱.
/// 전부 결정적이고 부작용이 없다 (속성 테스트 대상).
// region:    --- Imports
use crate::auction::model::{Amount, IncrementTier, PremiumTier, RateBp};
use once_cell::sync::Lazy;
use regex::Regex;

// endregion: --- Imports

// region:    --- Default Tiers

/// 기본 증분 구간 (센트): 0–100.00는 5.00, 100.00–500.00는 10.00, 이후 25.00
pub fn default_increment_tiers() -> Vec<IncrementTier> {
    vec![
        IncrementTier {
            min: 0,
            max: Some(10_000),
            step: 500,
        },
        IncrementTier {
            min: 10_000,
            max: Some(50_000),
            step: 1_000,
        },
        IncrementTier {
            min: 50_000,
            max: None,
            step: 2_500,
        },
    ]
}

// endregion: --- Default Tiers

// region:    --- Increment / Floor

/// 현재가에 적용되는 증분 step을 구한다.
/// 구간은 목록 순서대로 평가되고 `min ≤ current < max`인 첫 구간이 이긴다.
/// 매치되는 구간이 없으면 마지막 구간의 step을, 목록이 비면 기본 구간을 쓴다.
pub fn increment(current: Amount, tiers: &[IncrementTier]) -> Amount {
    if tiers.is_empty() {
        return increment(current, &default_increment_tiers());
    }
    for tier in tiers {
        let upper = tier.max.unwrap_or(Amount::MAX);
        if tier.min <= current && current < upper {
            return tier.step;
        }
    }
    tiers[tiers.len() - 1].step
}

/// 수락 가능한 최소 다음 입찰가.
/// 아직 입찰이 없으면(current = 0) 시작가가 바닥이다.
pub fn min_next_bid(current: Amount, starting: Amount, tiers: &[IncrementTier]) -> Amount {
    if current == 0 {
        starting
    } else {
        current + increment(current, tiers)
    }
}

// endregion: --- Increment / Floor

// region:    --- Premium

/// bp 요율 곱을 센트로 반올림(half-up)한다.
pub fn half_up_bp(amount: Amount, rate_bp: RateBp) -> Amount {
    let product = amount * rate_bp;
    (product + 5_000) / 10_000
}

/// 낙찰가에 적용되는 프리미엄 요율(bp). 단일 구간만 적용된다.
pub fn premium_rate_bp(amount: Amount, tiers: &[PremiumTier]) -> RateBp {
    for tier in tiers {
        let upper = tier.max.unwrap_or(Amount::MAX);
        if tier.min <= amount && amount < upper {
            return tier.rate_bp;
        }
    }
    0
}

/// 구매자 수수료: 구간 요율 × 금액, half-up 반올림.
pub fn premium(amount: Amount, tiers: &[PremiumTier]) -> Amount {
    half_up_bp(amount, premium_rate_bp(amount, tiers))
}

// endregion: --- Premium

// region:    --- Money Parsing

/// 십진 금액 문자열을 센트로 파싱한다. 소수부는 최대 2자리.
/// "100" → 10000, "250.55" → 25055, "1.5" → 150.
pub fn parse_money_cents(input: &str) -> Option<Amount> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s),
    };
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next()?;
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let cents = match parts.next() {
        None => 0,
        Some(frac) => {
            if frac.is_empty() || frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let mut v: i64 = frac.parse().ok()?;
            if frac.len() == 1 {
                v *= 10;
            }
            v
        }
    };
    Some(sign * (whole * 100 + cents))
}

// endregion: --- Money Parsing

// region:    --- Image Filename Grammar

/// 이미지 확장자 (대소문자 무시)
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "heic"];

static FILENAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^(\d+)-(\d+)$").expect("파일명 패턴 1"),
        Regex::new(r"(?i)^lot[_-]?(\d+)[_-](\d+)$").expect("파일명 패턴 2"),
        Regex::new(r"^(\d+)_(\d+)$").expect("파일명 패턴 3"),
        Regex::new(r"^(\d+)\.(\d+)$").expect("파일명 패턴 4"),
    ]
});

/// 업로드 파일명에서 (lot_number, photo_order)를 파싱한다.
/// 확장자를 떼고 패턴을 순서대로 시도하며 첫 매치가 이긴다.
pub fn parse_image_filename(name: &str) -> Option<(i64, i64)> {
    let stem = strip_image_extension(name)?;
    for pattern in FILENAME_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(stem) {
            let lot: i64 = caps.get(1)?.as_str().parse().ok()?;
            let order: i64 = caps.get(2)?.as_str().parse().ok()?;
            return Some((lot, order));
        }
    }
    None
}

/// 알려진 이미지 확장자를 제거한다. 확장자가 없거나 미지원이면 None.
fn strip_image_extension(name: &str) -> Option<&str> {
    let dot = name.rfind('.')?;
    let ext = &name[dot + 1..];
    if IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
    {
        Some(&name[..dot])
    } else {
        None
    }
}

// endregion: --- Image Filename Grammar

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tiers() -> Vec<IncrementTier> {
        default_increment_tiers()
    }

    #[test]
    fn floor_is_starting_bid_before_first_bid() {
        assert_eq!(min_next_bid(0, 10_000, &tiers()), 10_000);
    }

    #[test]
    fn floor_walks_tiers_in_order() {
        // 100.00 현재가 → 두 번째 구간(step 10.00)
        assert_eq!(min_next_bid(10_000, 10_000, &tiers()), 11_000);
        // 99.99 → 첫 구간(step 5.00)
        assert_eq!(min_next_bid(9_999, 10_000, &tiers()), 10_499);
        // 500.00 → 마지막 구간(step 25.00)
        assert_eq!(min_next_bid(50_000, 10_000, &tiers()), 52_500);
    }

    #[test]
    fn increment_falls_back_to_last_tier() {
        let odd = vec![IncrementTier {
            min: 100,
            max: Some(200),
            step: 7,
        }];
        // 어떤 구간에도 안 걸리면 마지막 구간 step
        assert_eq!(increment(5_000, &odd), 7);
    }

    #[test]
    fn premium_rounds_half_up() {
        let tiers = vec![PremiumTier {
            min: 0,
            max: None,
            rate_bp: 1_500,
        }];
        // 100.00 × 15% = 15.00
        assert_eq!(premium(10_000, &tiers), 1_500);
        // 250.55 × 15% = 37.5825 → 37.58
        assert_eq!(premium(25_055, &tiers), 3_758);
        // 0.03 × 15% = 0.0045 → 0.00 (0.45센트는 내림)
        assert_eq!(premium(3, &tiers), 0);
        // 0.04 × 15% = 0.006 → 0.01 (0.6센트는 올림)
        assert_eq!(premium(4, &tiers), 1);
    }

    #[test]
    fn premium_uses_single_matching_tier() {
        let tiers = vec![
            PremiumTier {
                min: 0,
                max: Some(10_000),
                rate_bp: 2_000,
            },
            PremiumTier {
                min: 10_000,
                max: None,
                rate_bp: 1_000,
            },
        ];
        assert_eq!(premium_rate_bp(9_999, &tiers), 2_000);
        assert_eq!(premium_rate_bp(10_000, &tiers), 1_000);
    }

    #[test]
    fn money_parsing_is_exact() {
        assert_eq!(parse_money_cents("100"), Some(10_000));
        assert_eq!(parse_money_cents("250.55"), Some(25_055));
        assert_eq!(parse_money_cents("1.5"), Some(150));
        assert_eq!(parse_money_cents("0.05"), Some(5));
        assert_eq!(parse_money_cents("-3.20"), Some(-320));
        assert_eq!(parse_money_cents(""), None);
        assert_eq!(parse_money_cents("abc"), None);
        assert_eq!(parse_money_cents("1.234"), None);
        assert_eq!(parse_money_cents("1."), None);
    }

    #[test]
    fn filename_grammar_matches_in_order() {
        assert_eq!(parse_image_filename("12-1.jpg"), Some((12, 1)));
        assert_eq!(parse_image_filename("lot_12_2.PNG"), Some((12, 2)));
        assert_eq!(parse_image_filename("LOT-7-3.webp"), Some((7, 3)));
        assert_eq!(parse_image_filename("lot12_4.heic"), Some((12, 4)));
        assert_eq!(parse_image_filename("12_5.gif"), Some((12, 5)));
        assert_eq!(parse_image_filename("12.3.webp"), Some((12, 3)));
        assert_eq!(parse_image_filename("foo.jpg"), None);
        assert_eq!(parse_image_filename("12-1.txt"), None);
        assert_eq!(parse_image_filename("12-1"), None);
    }

    proptest! {
        /// 수락되는 모든 포맷은 파싱으로 왕복된다.
        #[test]
        fn filename_roundtrip(lot in 1i64..100_000, order in 1i64..1_000) {
            for formatted in [
                format!("{lot}-{order}.jpg"),
                format!("lot_{lot}_{order}.jpeg"),
                format!("lot-{lot}-{order}.png"),
                format!("{lot}_{order}.webp"),
                format!("{lot}.{order}.gif"),
            ] {
                prop_assert_eq!(parse_image_filename(&formatted), Some((lot, order)));
            }
        }

        /// floor는 현재가보다 항상 크다 (입찰이 있는 한).
        #[test]
        fn floor_exceeds_current(current in 1i64..10_000_000, starting in 0i64..100_000) {
            let floor = min_next_bid(current, starting, &tiers());
            prop_assert!(floor > current);
        }

        /// step은 항상 양수이고 결정적이다.
        #[test]
        fn increment_is_positive_and_deterministic(current in 0i64..10_000_000) {
            let a = increment(current, &tiers());
            let b = increment(current, &tiers());
            prop_assert!(a > 0);
            prop_assert_eq!(a, b);
        }

        /// half-up 반올림의 오차는 0.5센트 이하다.
        #[test]
        fn half_up_error_bound(amount in 0i64..10_000_000, rate in 0i64..10_000) {
            let fee = half_up_bp(amount, rate);
            let exact_x2 = amount as i128 * rate as i128 * 2; // 2×10000 스케일
            let fee_x2 = fee as i128 * 10_000 * 2;
            prop_assert!((fee_x2 - exact_x2).abs() <= 10_000);
        }
    }
}

// endregion: --- Tests

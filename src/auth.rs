/// 인증 어댑터.
/// 세션 발급은 외부 협력자 소관이고, 여기서는 Bearer 토큰을 신원으로
/// 해석하고 역할 게이트만 적용한다. 존재 여부를 누설하지 않는다.
// region:    --- Imports
use crate::auction::model::{Identity, Role};
use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::store::SharedStore;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Auth Error

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("인증 정보가 없습니다")]
    Missing,

    #[error("유효하지 않은 인증 정보입니다")]
    Invalid,

    #[error("권한이 없습니다")]
    Forbidden,
}

// endregion: --- Auth Error

// region:    --- Authentication

/// `Authorization: Bearer <token>` 헤더를 신원으로 해석한다.
pub async fn authenticate(
    store: &SharedStore,
    clock: &SharedClock,
    headers: &HeaderMap,
) -> Result<Identity, AuthResolveError> {
    let token = bearer_token(headers).ok_or(AuthResolveError::Auth(AuthError::Missing))?;
    let identity = store
        .resolve_token(token, clock.now())
        .await
        .map_err(AuthResolveError::Store)?;
    identity.ok_or(AuthResolveError::Auth(AuthError::Invalid))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 입찰 가능 역할 (bidder 이상)
pub fn require_bidder(identity: &Identity) -> Result<(), AuthError> {
    if matches!(identity.role, Role::Bidder | Role::Staff | Role::Admin) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// 운영 권한 (staff 이상)
pub fn require_staff(identity: &Identity) -> Result<(), AuthError> {
    if identity.role.is_staff() {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// 인증 실패와 저장소 장애를 구분한다 (401 vs 5xx)
#[derive(Debug)]
pub enum AuthResolveError {
    Auth(AuthError),
    Store(StoreError),
}

// endregion: --- Authentication

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn role_gates() {
        let guest = Identity {
            user_id: 1,
            role: Role::Guest,
        };
        let bidder = Identity {
            user_id: 2,
            role: Role::Bidder,
        };
        let staff = Identity {
            user_id: 3,
            role: Role::Staff,
        };
        assert_eq!(require_bidder(&guest), Err(AuthError::Forbidden));
        assert!(require_bidder(&bidder).is_ok());
        assert_eq!(require_staff(&bidder), Err(AuthError::Forbidden));
        assert!(require_staff(&staff).is_ok());
    }
}

// endregion: --- Tests

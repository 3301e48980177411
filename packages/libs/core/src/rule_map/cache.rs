//! Rule Map 캐시
//!
//! 프로세스 전역에서 공유되는 버전 기반 스냅샷 셀입니다.
//! 읽기는 현재 스냅샷의 `Arc`를 복제해서 가져가며, 재생성은 락 밖에서 수행한 뒤 교체합니다.
//! 재생성 도중 무효화가 일어나면 만들어진 맵은 호출자에게만 반환되고 게시되지 않습니다.
//! 스냅샷은 TTL이 지나거나 규칙 유효 기간 경계에 도달하면 다시 만들어집니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};

use super::RuleMap;

/// Rule Map 캐시
pub struct RuleMapCache {
    current: RwLock<Option<Arc<RuleMap>>>,
    version: AtomicU64,
    ttl: Option<Duration>,
}

impl RuleMapCache {
    /// 새 캐시 (`ttl_secs == 0`이면 무효화될 때까지 유지)
    pub fn new(ttl_secs: u64) -> Self {
        let ttl = match ttl_secs {
            0 => None,
            secs => Some(Duration::seconds(
                i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000),
            )),
        };
        Self {
            current: RwLock::new(None),
            version: AtomicU64::new(0),
            ttl,
        }
    }

    /// 캐시된 맵을 반환하거나 새로 생성
    pub fn get_or_build(&self, build: impl FnOnce() -> RuleMap) -> Arc<RuleMap> {
        if let Some(map) = self.cached() {
            return map;
        }

        // 버전을 먼저 잡고 나서 생성한다
        let version = self.version.load(Ordering::SeqCst);
        let map = Arc::new(build());

        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if self.version.load(Ordering::SeqCst) == version {
            *current = Some(Arc::clone(&map));
            tracing::info!(
                version,
                rules = map.rule_count(),
                "rule map rebuilt"
            );
        } else {
            tracing::debug!(version, "rule map invalidated during rebuild; not publishing");
        }
        map
    }

    /// 캐시 무효화
    pub fn invalidate(&self) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = None;
        tracing::debug!(version, "rule map invalidated");
    }

    /// 현재 버전 (무효화마다 증가)
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// 유효한 캐시 스냅샷
    pub fn cached(&self) -> Option<Arc<RuleMap>> {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        let map = current.as_ref()?;
        let now = Utc::now();
        if !map.is_current(now) {
            return None;
        }
        if let Some(ttl) = self.ttl {
            if now - map.built_at >= ttl {
                return None;
            }
        }
        Some(Arc::clone(map))
    }
}

impl Default for RuleMapCache {
    fn default() -> Self {
        Self::new(0)
    }
}

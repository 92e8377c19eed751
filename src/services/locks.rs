//! 대상별 상호 배제 (KeyedLocks)
//!
//! 같은 성적표를 건드리는 계산 작업이 동시에 돌면 결과가 섞일 수 있으므로,
//! 키마다 `tokio::sync::Mutex`를 하나씩 두고 작업 동안 잡습니다.
//! 아무도 쓰지 않는 키의 잠금은 가드가 해제될 때 맵에서 지워집니다.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// 잠금을 쥐고 있는 동안 유지되는 가드
pub struct KeyedGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    owner: KeyedLocks,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key: key.to_string(),
            guard: Some(guard),
            owner: self.clone(),
        }
    }

    /// 현재 맵에 남아 있는 키 수
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // 가드를 먼저 풀어야 Arc 참조 수가 정확해집니다.
        drop(self.guard.take());

        let mut map = self.owner.inner.lock().unwrap_or_else(|e| e.into_inner());
        // 맵만 참조하고 있으면 대기자가 없다는 뜻입니다.
        if map
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            map.remove(&self.key);
        }
    }
}

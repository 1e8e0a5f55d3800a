//! 태스크 그룹 — 공유 취소 토큰과 전체 합류(join)
//!
//! "활동마다 태스크 하나, 공유 취소 토큰으로 동기화, 전원 합류 후 보고"
//! 패턴의 구현입니다:
//! - 어떤 태스크든 에러로 끝나면 **첫 에러**로 기록하고 토큰을 취소해
//!   나머지 태스크의 협조적 종료를 유도합니다.
//! - [`TaskGroup::join_all`]은 모든 태스크가 반환한 뒤에야 끝나며,
//!   기록된 첫 에러를 돌려줍니다.
//!
//! 취소는 협조적입니다 — 진행 중인 I/O를 강제로 끊지 않습니다.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::PipelineError;

/// 합류 가능한 태스크 그룹
pub struct TaskGroup {
    token: CancellationToken,
    first_error: Arc<Mutex<Option<PipelineError>>>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    /// 주어진 수명 토큰을 공유하는 그룹을 생성합니다.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            first_error: Arc::new(Mutex::new(None)),
            handles: Vec::new(),
        }
    }

    /// 그룹이 공유하는 수명 토큰을 복제해 돌려줍니다.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 태스크를 그룹에 추가합니다.
    ///
    /// 태스크가 에러로 끝나면 첫 에러로 기록하고 토큰을 취소합니다.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let token = self.token.clone();
        let slot = Arc::clone(&self.first_error);

        self.handles.push(tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "pipeline task failed");
                record_first(&slot, e);
                token.cancel();
            }
        }));
    }

    /// 모든 태스크가 반환할 때까지 기다린 뒤 첫 에러를 돌려줍니다.
    ///
    /// 패닉으로 join에 실패한 태스크도 에러로 집계합니다.
    pub async fn join_all(&mut self) -> Option<PipelineError> {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                record_first(&self.first_error, PipelineError::Join(e.to_string()));
                self.token.cancel();
            }
        }

        lock_slot(&self.first_error).take()
    }
}

fn record_first(slot: &Mutex<Option<PipelineError>>, err: PipelineError) {
    let mut guard = lock_slot(slot);
    if guard.is_none() {
        *guard = Some(err);
    }
}

fn lock_slot(
    slot: &Mutex<Option<PipelineError>>,
) -> std::sync::MutexGuard<'_, Option<PipelineError>> {
    slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

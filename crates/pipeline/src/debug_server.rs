//! 디버그 HTTP 엔드포인트 — 파이프라인 introspection 서버
//!
//! 미리 바인드된 리스너 위에서 상태 점검 라우트를 제공합니다:
//! - `GET /healthz`: 프로세스 생존 확인
//! - `GET /status`: 파이프라인 상태/카운터 JSON 스냅샷
//!
//! serve는 수명 토큰이 취소될 때까지 블록하며, 취소 이후 표면화되는
//! serve 에러는 파이프라인 실패로 취급하지 않습니다.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::stats::{PipelineStats, StatusSnapshot};

/// 디버그 서버를 실행합니다. 토큰 취소 시 우아하게 종료합니다.
pub async fn serve(
    listener: TcpListener,
    stats: Arc<PipelineStats>,
    token: CancellationToken,
) -> Result<(), PipelineError> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(stats);

    if let Ok(addr) = listener.local_addr() {
        info!(listen_addr = %addr, "debug endpoint serving");
    }

    let shutdown_token = token.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if token.is_cancelled() => {
            debug!(error = %e, "debug endpoint error after shutdown");
            Ok(())
        }
        Err(e) => Err(PipelineError::Debug(e.to_string())),
    }
}

async fn healthz() -> &'static str {
    "ok\n"
}

async fn status(State(stats): State<Arc<PipelineStats>>) -> Json<StatusSnapshot> {
    Json(stats.snapshot())
}

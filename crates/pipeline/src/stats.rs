//! 파이프라인 상태 집계 — 디버그 엔드포인트로 노출되는 상태와 카운터
//!
//! 팬인 태스크가 기록하고 디버그 엔드포인트가 읽는 공유 상태입니다.
//! 모든 필드는 원자적이므로 락 없이 동시 접근이 가능합니다.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 설정만 부착된 초기 상태
    Created,
    /// 자원 할당 완료, 실행 전
    Initialized,
    /// 실행 중
    Running,
    /// 입력 종료 후 큐 드레인 중
    Draining,
    /// 정지됨
    Stopped,
}

impl PipelineState {
    /// 상태 이름을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Draining,
            4 => Self::Stopped,
            _ => Self::Created,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Initialized => 1,
            Self::Running => 2,
            Self::Draining => 3,
            Self::Stopped => 4,
        }
    }
}

/// 공유 파이프라인 카운터
pub struct PipelineStats {
    state: AtomicU8,
    started_at: Instant,
    /// 큐에서 소비한 전체 레코드 수
    pub lines_total: AtomicU64,
    /// 주 출력에 포함된 레코드 수
    pub lines_included: AtomicU64,
    /// 판정으로 제외된 레코드 수
    pub lines_excluded: AtomicU64,
    /// fail-open 처리된 판정 에러 수
    pub filter_errors: AtomicU64,
}

impl PipelineStats {
    /// 새 카운터를 생성합니다.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PipelineState::Created.as_u8()),
            started_at: Instant::now(),
            lines_total: AtomicU64::new(0),
            lines_included: AtomicU64::new(0),
            lines_excluded: AtomicU64::new(0),
            filter_errors: AtomicU64::new(0),
        }
    }

    /// 현재 상태를 반환합니다.
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 상태를 전이시킵니다.
    pub fn set_state(&self, state: PipelineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// 직렬화 가능한 스냅샷을 만듭니다.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state().as_str(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            lines_total: self.lines_total.load(Ordering::Relaxed),
            lines_included: self.lines_included.load(Ordering::Relaxed),
            lines_excluded: self.lines_excluded.load(Ordering::Relaxed),
            filter_errors: self.filter_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// `/status` 응답 본문
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// 파이프라인 상태 이름
    pub state: &'static str,
    /// 기동 이후 경과 시간 (초)
    pub uptime_secs: u64,
    /// 큐에서 소비한 전체 레코드 수
    pub lines_total: u64,
    /// 주 출력에 포함된 레코드 수
    pub lines_included: u64,
    /// 판정으로 제외된 레코드 수
    pub lines_excluded: u64,
    /// fail-open 처리된 판정 에러 수
    pub filter_errors: u64,
}

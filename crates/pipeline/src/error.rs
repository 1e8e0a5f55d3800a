//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 파이프라인 실행 중 발생하는 치명적 에러를,
//! [`FilterError`]는 포함 판정 과정의 에러를 표현합니다. 판정 에러는
//! 라인 단위로 fail-open 처리되므로 대부분 치명적이지 않습니다.
//! `From<PipelineError> for LogsieveError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logsieve_core::error::{LogsieveError, PipelineError as CorePipelineError};

/// 파이프라인 도메인 에러
///
/// 스캐닝, 명령 감독, 쓰기, 캡처, 디버그 엔드포인트, 채널 통신 등
/// 파이프라인 내부의 치명적 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 스캐너 읽기 실패
    #[error("scanner error: {source_id}: {reason}")]
    Scanner {
        /// 입력 소스 식별자 (stdin, child-stdout, child-stderr)
        source_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 단일 레코드가 허용 최대 크기를 초과
    #[error("record exceeds max size: {len} bytes (max: {max})")]
    RecordTooLarge {
        /// 레코드 크기 (바이트, 잘린 시점까지)
        len: usize,
        /// 허용 최대 크기
        max: usize,
    },

    /// 명령 실행(spawn) 실패
    #[error("command spawn failed: {0}")]
    CommandSpawn(String),

    /// 명령이 0이 아닌 상태로 종료
    #[error("command exited with {status}")]
    CommandFailed {
        /// 자식 프로세스의 종료 상태
        status: std::process::ExitStatus,
    },

    /// 유예 시간 내에 종료하지 않아 강제 종료됨
    #[error("command killed after {grace_secs}s grace period")]
    CommandKilled {
        /// 적용된 유예 시간 (초)
        grace_secs: u64,
    },

    /// 명령 종료 대기 실패
    #[error("command wait failed: {0}")]
    CommandWait(String),

    /// 주 출력 쓰기 실패
    #[error("writer write failed: {0}")]
    Write(String),

    /// 캡처 출력 쓰기/정리 실패
    #[error("capture writer failed: {0}")]
    Capture(String),

    /// 디버그 엔드포인트 에러
    #[error("debug endpoint error: {0}")]
    Debug(String),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 태스크 패닉 등 join 실패
    #[error("task join failed: {0}")]
    Join(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 정리(teardown) 중 수집된 에러 묶음
    #[error("teardown errors: {0}")]
    Teardown(String),

    /// 포함 판정 셋업 에러
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 포함 판정 엔진 에러
///
/// 셋업 에러(템플릿/쿼리 컴파일 실패, 중복 설정)는 치명적이고,
/// 라인별 평가 에러(JSON 파싱, 렌더링, 평가 실패)는 호출자가
/// fail-open으로 처리합니다.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// 제외 템플릿 파싱 실패 (셋업 에러)
    #[error("failed to parse exclude template: {0}")]
    TemplateParse(String),

    /// 템플릿 렌더링 실패
    #[error("failed to render exclude template: {0}")]
    TemplateRender(String),

    /// 필터 쿼리 파싱 실패 (셋업 에러)
    #[error("failed to parse filter query: {0}")]
    QueryParse(String),

    /// 필터 쿼리 컴파일 실패 (셋업 에러)
    #[error("failed to compile filter query: {0}")]
    QueryCompile(String),

    /// 쿼리 평가 중 에러 값 반환
    #[error("filter query evaluation failed: {0}")]
    QueryEval(String),

    /// 라인 JSON 파싱 실패
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),

    /// 쿼리 입력이 최상위 JSON 객체가 아님
    #[error("line is not a top-level json object")]
    NotAnObject,

    /// 템플릿과 쿼리를 동시에 설정 (셋업 에러)
    #[error("cannot use both exclude template and filter query")]
    ConflictingPredicates,
}

impl From<PipelineError> for LogsieveError {
    fn from(err: PipelineError) -> Self {
        LogsieveError::Pipeline(CorePipelineError::RunFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_too_large_display() {
        let err = PipelineError::RecordTooLarge { len: 11, max: 10 };
        let msg = err.to_string();
        assert!(msg.contains("11"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn filter_error_wraps_into_pipeline_error() {
        let err: PipelineError = FilterError::ConflictingPredicates.into();
        assert!(matches!(err, PipelineError::Filter(_)));
    }

    #[test]
    fn converts_to_logsieve_error() {
        let err = PipelineError::Channel("receiver closed".to_owned());
        let top: LogsieveError = err.into();
        assert!(matches!(top, LogsieveError::Pipeline(_)));
    }
}

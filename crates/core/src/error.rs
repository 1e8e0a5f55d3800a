//! 에러 타입 — 도메인별 에러 정의

/// Logsieve 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogsieveError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
///
/// 파이프라인 크레이트의 도메인 에러가 상위 레이어로 전파될 때
/// 사용하는 축약 형태입니다.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 파이프라인 실행 중 실패
    #[error("pipeline run failed: {0}")]
    RunFailed(String),

    /// 파이프라인 정리(teardown) 실패
    #[error("pipeline teardown failed: {0}")]
    TeardownFailed(String),
}

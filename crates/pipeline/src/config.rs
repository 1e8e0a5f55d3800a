//! 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`LogsieveConfig`](logsieve_core::config::LogsieveConfig)를
//! 기반으로 파이프라인이 실제로 소비하는 평탄화된 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logsieve_core::config::LogsieveConfig;
//! use logsieve_pipeline::config::PipelineConfig;
//!
//! let core_config = LogsieveConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// 파이프라인 설정
///
/// core 설정의 섹션들을 파이프라인 관점에서 평탄화한 형태입니다.
/// 생성 이후에는 파이프라인 수명 내내 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 감독할 명령과 인자. 비어 있으면 외부 입력 스트림(stdin) 모드.
    pub command_argv: Vec<String>,
    /// SIGINT 후 SIGKILL까지의 유예 시간 (초)
    pub shutdown_grace_secs: u64,
    /// 제외 판정용 표현식 템플릿 (비어 있으면 미사용)
    pub exclude_template: String,
    /// 포함 판정용 jq 방언 쿼리 (비어 있으면 미사용)
    pub query: String,
    /// 캡처 파일 경로 (비어 있으면 discard)
    pub capture_path: String,
    /// 캡처 파일 로테이션 크기 (MB)
    pub capture_max_size_mb: usize,
    /// 캡처 백업 보관 일수 (0 = 무제한)
    pub capture_max_age_days: usize,
    /// 캡처 백업 보관 개수 (0 = 무제한)
    pub capture_max_backups: usize,
    /// 캡처 백업 gzip 압축 여부
    pub capture_compress: bool,
    /// 단일 레코드 최대 크기 (바이트)
    pub max_line_bytes: usize,
    /// 디버그 엔드포인트 바인드 주소
    pub debug_listen_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            command_argv: Vec::new(),
            shutdown_grace_secs: 10,
            exclude_template: String::new(),
            query: String::new(),
            capture_path: String::new(),
            capture_max_size_mb: 100,
            capture_max_age_days: 0,
            capture_max_backups: 0,
            capture_compress: false,
            max_line_bytes: 52_428_800, // 50MiB
            debug_listen_addr: "127.0.0.1:4083".to_owned(),
        }
    }
}

impl PipelineConfig {
    /// core의 `LogsieveConfig`에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &logsieve_core::config::LogsieveConfig) -> Self {
        Self {
            command_argv: core.command.argv.clone(),
            shutdown_grace_secs: core.command.shutdown_grace_secs,
            exclude_template: core.filter.exclude_template.clone(),
            query: core.filter.query.clone(),
            capture_path: core.capture.path.clone(),
            capture_max_size_mb: core.capture.max_size_mb,
            capture_max_age_days: core.capture.max_age_days,
            capture_max_backups: core.capture.max_backups,
            capture_compress: core.capture.compress,
            max_line_bytes: core.scanner.max_line_bytes,
            debug_listen_addr: core.debug.listen_addr.clone(),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        const MAX_GRACE_SECS: u64 = 3600; // 1 hour

        if !self.command_argv.is_empty() && self.command_argv[0].trim().is_empty() {
            return Err(PipelineError::Config {
                field: "command_argv".to_owned(),
                reason: "command name must not be empty".to_owned(),
            });
        }

        if self.shutdown_grace_secs == 0 || self.shutdown_grace_secs > MAX_GRACE_SECS {
            return Err(PipelineError::Config {
                field: "shutdown_grace_secs".to_owned(),
                reason: format!("must be 1-{MAX_GRACE_SECS}"),
            });
        }

        if !self.exclude_template.is_empty() && !self.query.is_empty() {
            return Err(PipelineError::Config {
                field: "filter".to_owned(),
                reason: "cannot use both exclude_template and query".to_owned(),
            });
        }

        if !self.capture_path.is_empty() && self.capture_max_size_mb == 0 {
            return Err(PipelineError::Config {
                field: "capture_max_size_mb".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_line_bytes == 0 {
            return Err(PipelineError::Config {
                field: "max_line_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.debug_listen_addr.parse::<SocketAddr>().is_err() {
            return Err(PipelineError::Config {
                field: "debug_listen_addr".to_owned(),
                reason: format!("'{}' is not a numeric socket address", self.debug_listen_addr),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 감독할 명령을 설정합니다.
    pub fn command_argv(mut self, argv: Vec<String>) -> Self {
        self.config.command_argv = argv;
        self
    }

    /// 종료 유예 시간(초)을 설정합니다.
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_secs = secs;
        self
    }

    /// 제외 템플릿을 설정합니다.
    pub fn exclude_template(mut self, template: impl Into<String>) -> Self {
        self.config.exclude_template = template.into();
        self
    }

    /// 필터 쿼리를 설정합니다.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.config.query = query.into();
        self
    }

    /// 캡처 파일 경로를 설정합니다.
    pub fn capture_path(mut self, path: impl Into<String>) -> Self {
        self.config.capture_path = path.into();
        self
    }

    /// 캡처 로테이션 크기(MB)를 설정합니다.
    pub fn capture_max_size_mb(mut self, mb: usize) -> Self {
        self.config.capture_max_size_mb = mb;
        self
    }

    /// 캡처 백업 보관 개수를 설정합니다.
    pub fn capture_max_backups(mut self, count: usize) -> Self {
        self.config.capture_max_backups = count;
        self
    }

    /// 캡처 백업 압축 여부를 설정합니다.
    pub fn capture_compress(mut self, compress: bool) -> Self {
        self.config.capture_compress = compress;
        self
    }

    /// 단일 레코드 최대 크기(바이트)를 설정합니다.
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.config.max_line_bytes = bytes;
        self
    }

    /// 디버그 엔드포인트 바인드 주소를 설정합니다.
    pub fn debug_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.debug_listen_addr = addr.into();
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

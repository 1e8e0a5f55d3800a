//! 설정 관리 — logsieve.toml 파싱 및 런타임 설정
//!
//! [`LogsieveConfig`]는 파이프라인 전체가 수명 내내 공유하는 불변 설정
//! 스냅샷입니다. 한 번 로드된 뒤에는 변경되지 않습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGSIEVE_FILTER_QUERY=...` 형식)
//! 3. 설정 파일 (`logsieve.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logsieve_core::error::LogsieveError> {
//! use logsieve_core::config::LogsieveConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogsieveConfig::load("logsieve.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogsieveConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogsieveError};

/// Logsieve 통합 설정
///
/// `logsieve.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsieveConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 감독 대상 명령 설정
    #[serde(default)]
    pub command: CommandConfig,
    /// 포함 판정(필터) 설정
    #[serde(default)]
    pub filter: FilterConfig,
    /// 전체 캡처 출력 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 라인 스캐너 설정
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// 디버그 엔드포인트 설정
    #[serde(default)]
    pub debug: DebugConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 포맷 (json, pretty). 진단 로그는 항상 stderr로 출력됩니다 —
    /// stdout은 필터링된 데이터 전용입니다.
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 감독 대상 명령 설정
///
/// `argv`가 비어 있으면 stdin을 입력으로 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// 실행할 명령과 인자. 비어 있으면 stdin 모드.
    pub argv: Vec<String>,
    /// 협조적 종료(SIGINT) 후 강제 종료(SIGKILL)까지의 유예 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            argv: Vec::new(),
            shutdown_grace_secs: 10,
        }
    }
}

/// 포함 판정(필터) 설정
///
/// `exclude_template`와 `query`는 동시에 설정할 수 없습니다.
/// 둘 다 비어 있으면 모든 라인이 포함됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// 제외 판정용 표현식 템플릿 (minijinja 문법).
    /// 렌더링 결과에 "true"가 포함된 라인은 주 출력에서 제외됩니다.
    pub exclude_template: String,
    /// 포함 판정용 필터 쿼리 (jq 방언).
    /// 예: `select(.level != "debug")`
    pub query: String,
}

/// 전체 캡처 출력 설정
///
/// `path`가 비어 있으면 캡처 출력은 버려집니다(discard).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 캡처 파일 경로. 비어 있으면 캡처 비활성화.
    pub path: String,
    /// 로테이션 전 파일 최대 크기 (MB)
    pub max_size_mb: usize,
    /// 로테이션된 파일 보관 최대 일수. 0이면 일수 기준 삭제 없음.
    pub max_age_days: usize,
    /// 로테이션된 파일 보관 최대 개수. 0이면 전부 보관.
    /// `max_age_days`가 설정된 경우 일수 기준이 우선합니다.
    pub max_backups: usize,
    /// 로테이션된 파일의 gzip 압축 여부
    pub compress: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_size_mb: 100,
            max_age_days: 0,
            max_backups: 0,
            compress: false,
        }
    }
}

/// 라인 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 단일 레코드 최대 크기 (바이트). 초과 시 치명적 에러.
    pub max_line_bytes: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 52_428_800, // 50MiB
        }
    }
}

/// 디버그 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// 디버그 HTTP 서버 바인드 주소 (숫자 IP:포트 형식)
    pub listen_addr: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4083".to_owned(),
        }
    }
}

impl LogsieveConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogsieveError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogsieveError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogsieveError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogsieveError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogsieveError> {
        toml::from_str(toml_str).map_err(|e| {
            LogsieveError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGSIEVE_{SECTION}_{FIELD}`
    /// 예: `LOGSIEVE_FILTER_QUERY='select(.level != "debug")'`
    ///
    /// `LOGSIEVE_COMMAND_ARGV`는 공백으로 분리됩니다 (따옴표 미지원 —
    /// 인용이 필요한 명령은 설정 파일의 배열 문법을 사용하세요).
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGSIEVE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGSIEVE_GENERAL_LOG_FORMAT");

        // Command
        override_argv(&mut self.command.argv, "LOGSIEVE_COMMAND_ARGV");
        override_u64(
            &mut self.command.shutdown_grace_secs,
            "LOGSIEVE_COMMAND_SHUTDOWN_GRACE_SECS",
        );

        // Filter
        override_string(
            &mut self.filter.exclude_template,
            "LOGSIEVE_FILTER_EXCLUDE_TEMPLATE",
        );
        override_string(&mut self.filter.query, "LOGSIEVE_FILTER_QUERY");

        // Capture
        override_string(&mut self.capture.path, "LOGSIEVE_CAPTURE_PATH");
        override_usize(&mut self.capture.max_size_mb, "LOGSIEVE_CAPTURE_MAX_SIZE_MB");
        override_usize(
            &mut self.capture.max_age_days,
            "LOGSIEVE_CAPTURE_MAX_AGE_DAYS",
        );
        override_usize(&mut self.capture.max_backups, "LOGSIEVE_CAPTURE_MAX_BACKUPS");
        override_bool(&mut self.capture.compress, "LOGSIEVE_CAPTURE_COMPRESS");

        // Scanner
        override_usize(
            &mut self.scanner.max_line_bytes,
            "LOGSIEVE_SCANNER_MAX_LINE_BYTES",
        );

        // Debug
        override_string(&mut self.debug.listen_addr, "LOGSIEVE_DEBUG_LISTEN_ADDR");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX_GRACE_SECS: u64 = 3600; // 1 hour
        const MAX_LINE_BYTES: usize = 1_073_741_824; // 1GiB
        const MAX_CAPTURE_SIZE_MB: usize = 10_000;

        match self.general.log_format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "general.log_format".to_owned(),
                    reason: format!("unknown format '{other}', expected 'json' or 'pretty'"),
                });
            }
        }

        if !self.command.argv.is_empty() && self.command.argv[0].trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "command.argv".to_owned(),
                reason: "command name must not be empty".to_owned(),
            });
        }

        if self.command.shutdown_grace_secs == 0
            || self.command.shutdown_grace_secs > MAX_GRACE_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "command.shutdown_grace_secs".to_owned(),
                reason: format!("must be 1-{MAX_GRACE_SECS}"),
            });
        }

        if !self.filter.exclude_template.is_empty() && !self.filter.query.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "filter".to_owned(),
                reason: "cannot use both exclude_template and query".to_owned(),
            });
        }

        if !self.capture.path.is_empty()
            && (self.capture.max_size_mb == 0 || self.capture.max_size_mb > MAX_CAPTURE_SIZE_MB)
        {
            return Err(ConfigError::InvalidValue {
                field: "capture.max_size_mb".to_owned(),
                reason: format!("must be 1-{MAX_CAPTURE_SIZE_MB}"),
            });
        }

        if self.scanner.max_line_bytes == 0 || self.scanner.max_line_bytes > MAX_LINE_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "scanner.max_line_bytes".to_owned(),
                reason: format!("must be 1-{MAX_LINE_BYTES}"),
            });
        }

        if self.debug.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "debug.listen_addr".to_owned(),
                reason: format!(
                    "'{}' is not a numeric socket address",
                    self.debug.listen_addr
                ),
            });
        }

        Ok(())
    }
}

fn override_string(target: &mut String, key: &str) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

fn override_bool(target: &mut bool, key: &str) {
    if let Ok(value) = std::env::var(key) {
        match value.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value, "ignoring malformed boolean env override"),
        }
    }
}

fn override_u64(target: &mut u64, key: &str) {
    if let Ok(value) = std::env::var(key) {
        match value.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value, "ignoring malformed integer env override"),
        }
    }
}

fn override_usize(target: &mut usize, key: &str) {
    if let Ok(value) = std::env::var(key) {
        match value.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value, "ignoring malformed integer env override"),
        }
    }
}

fn override_argv(target: &mut Vec<String>, key: &str) {
    if let Ok(value) = std::env::var(key) {
        *target = value.split_whitespace().map(str::to_owned).collect();
    }
}

//! 전체 캡처 출력 — 로테이션 파일 싱크
//!
//! 포함 판정과 무관하게 모든 레코드를 기록하는 포렌식 사본입니다.
//! 로테이션/보존/압축 알고리즘은 `file-rotate` 크레이트가 담당하며,
//! 이 모듈은 설정 매핑과 기록/정리 계약만 제공합니다.
//!
//! # 소유권
//! 파일은 첫 기록 시점에 생성됩니다. 기록은 팬인 태스크만 수행하고,
//! 정리(teardown) 시 정확히 한 번 닫힙니다.

use std::io::Write;
use std::path::PathBuf;

use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use tracing::debug;

use crate::error::PipelineError;

const MIB: usize = 1024 * 1024;

/// 캡처 싱크
pub enum CaptureWriter {
    /// 캡처 미설정 — 기록을 버립니다.
    Discard,
    /// 로테이션 파일 기록
    Rotating(Box<FileRotate<AppendTimestamp>>),
    /// close() 이후 상태 — 추가 기록은 에러입니다.
    Closed,
}

impl CaptureWriter {
    /// 설정에서 캡처 싱크를 구성합니다. `path`가 비어 있으면 Discard.
    ///
    /// 보존 기준은 하나만 적용됩니다: `max_age_days`가 설정되면 일수 기준,
    /// 아니면 `max_backups` 개수 기준, 둘 다 0이면 무제한 보관.
    pub fn from_config(
        path: &str,
        max_size_mb: usize,
        max_age_days: usize,
        max_backups: usize,
        compress: bool,
    ) -> Self {
        if path.is_empty() {
            return Self::Discard;
        }

        let file_limit = if max_age_days > 0 {
            FileLimit::Age(chrono::Duration::days(max_age_days as i64))
        } else if max_backups > 0 {
            FileLimit::MaxFiles(max_backups)
        } else {
            FileLimit::Unlimited
        };

        Self::rotating(
            PathBuf::from(path),
            ContentLimit::Bytes(max_size_mb * MIB),
            file_limit,
            compress,
        )
    }

    /// 명시적 한계값으로 로테이션 싱크를 구성합니다.
    pub fn rotating(
        path: PathBuf,
        content_limit: ContentLimit,
        file_limit: FileLimit,
        compress: bool,
    ) -> Self {
        let compression = if compress {
            Compression::OnRotate(0)
        } else {
            Compression::None
        };

        let writer = FileRotate::new(
            path,
            AppendTimestamp::default(file_limit),
            content_limit,
            compression,
            #[cfg(unix)]
            None,
        );

        Self::Rotating(Box::new(writer))
    }

    /// 캡처가 활성화되어 있는지 반환합니다.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Rotating(_))
    }

    /// 레코드와 구분자를 기록합니다.
    pub fn write_line(&mut self, line: &[u8]) -> Result<(), PipelineError> {
        match self {
            Self::Discard => Ok(()),
            Self::Rotating(writer) => writer
                .write_all(line)
                .and_then(|()| writer.write_all(b"\n"))
                .map_err(|e| PipelineError::Capture(e.to_string())),
            Self::Closed => Err(PipelineError::Capture(
                "write after close".to_owned(),
            )),
        }
    }

    /// 싱크를 닫습니다. 두 번째 호출부터는 아무 일도 하지 않습니다.
    pub fn close(&mut self) -> Result<(), PipelineError> {
        match std::mem::replace(self, Self::Closed) {
            Self::Rotating(mut writer) => {
                debug!("closing capture writer");
                writer
                    .flush()
                    .map_err(|e| PipelineError::Capture(e.to_string()))
            }
            Self::Discard | Self::Closed => Ok(()),
        }
    }
}

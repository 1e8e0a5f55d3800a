//! 라인 스캐너 — 바이트 스트림을 개행 단위 레코드로 분할
//!
//! 스트림을 `\n` 기준으로 엄격하게 분할하여 공유 라인 큐로 전달합니다.
//! 큐가 가득 차면 송신이 블록되어 자연스러운 back-pressure가 걸립니다.
//!
//! # 계약
//! - 레코드는 재사용 버퍼에서 **복사된 뒤** 큐에 들어갑니다.
//! - 최대 크기를 초과하는 레코드는 치명적 스캐너 에러입니다.
//! - 정상 EOF는 에러가 아니며, 스캐너는 조용히 생산을 멈춥니다.
//! - 개행 없이 끝나는 마지막 레코드도 전달됩니다.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::PipelineError;

/// 라인 스캐너
///
/// 하나의 입력 스트림을 소비하며, 완성된 레코드를 `mpsc::Sender<Bytes>`
/// 채널로 전달합니다. 각 스캐너는 자체 tokio 태스크에서 실행됩니다.
pub struct LineScanner {
    /// 입력 소스 식별자 (stdin, child-stdout, child-stderr)
    source_id: String,
    /// 단일 레코드 최대 크기 (바이트)
    max_line_bytes: usize,
    /// 레코드 전달 채널
    tx: mpsc::Sender<Bytes>,
}

impl LineScanner {
    /// 새 스캐너를 생성합니다.
    pub fn new(source_id: impl Into<String>, max_line_bytes: usize, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            source_id: source_id.into(),
            max_line_bytes,
            tx,
        }
    }

    /// 스트림이 끝날 때까지 레코드를 생산합니다.
    ///
    /// `tokio::spawn`으로 별도 태스크에서 호출하세요.
    pub async fn run<R>(self, reader: R) -> Result<(), PipelineError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);

        loop {
            buf.clear();

            // 최대 크기 + 1까지만 읽어 과대 레코드를 메모리에 쌓지 않고 검출합니다
            let mut limited = (&mut reader).take(self.max_line_bytes as u64 + 1);
            let n = limited
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| PipelineError::Scanner {
                    source_id: self.source_id.clone(),
                    reason: e.to_string(),
                })?;

            if n == 0 {
                // EOF — 정상 종료
                debug!(source = %self.source_id, "scanner reached end of stream");
                break;
            }

            if buf.last() == Some(&b'\n') {
                buf.pop();
            } else if buf.len() > self.max_line_bytes {
                return Err(PipelineError::RecordTooLarge {
                    len: buf.len(),
                    max: self.max_line_bytes,
                });
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }

            // 재사용 버퍼와 독립적인 레코드로 복사한 뒤 큐에 넣습니다
            let record = Bytes::copy_from_slice(&buf);
            if self.tx.send(record).await.is_err() {
                return Err(PipelineError::Channel(format!(
                    "{}: line queue receiver closed",
                    self.source_id
                )));
            }
        }

        Ok(())
    }
}

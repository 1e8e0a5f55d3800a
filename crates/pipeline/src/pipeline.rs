//! 파이프라인 오케스트레이션 — 스캐너/감독자/팬인/디버그 엔드포인트의
//! 전체 생명주기를 관리합니다.
//!
//! # 내부 아키텍처
//! ```text
//! {stdin} 또는 {child stdout, child stderr}
//!   -> LineScanner(s) -> mpsc<Bytes> -> fan-in
//!        -> LineFilter 판정 -> 주 출력 (포함된 라인만)
//!        -> CaptureWriter (모든 라인, 무조건)
//! ```
//!
//! # 상태 머신
//! `Created -> Initialized -> Running -> Draining -> Stopped`
//!
//! # 종료 규칙
//! - 외부 인터럽트, 첫 치명적 태스크 에러, 입력 소진 중 어느 것이든
//!   수명 토큰을 취소하고, 나머지 태스크는 협조적으로 종료됩니다.
//! - 명령이 없는 모드에서는 입력 스캐너를 그룹 밖에서 실행해 취소가
//!   수신 중인 레코드를 잘라먹지 않게 합니다. 자연 EOF나 자체 에러만이
//!   그 스캐너를 멈춥니다.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::capture::CaptureWriter;
use crate::commander::Commander;
use crate::config::PipelineConfig;
use crate::debug_server;
use crate::error::PipelineError;
use crate::filter::{self, LineFilter};
use crate::scanner::LineScanner;
use crate::stats::{PipelineState, PipelineStats};
use crate::tasks::TaskGroup;

/// 공유 라인 큐 용량 (생산자 1~2, 소비자 1)
const LINE_CHANNEL_CAPACITY: usize = 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 로그 필터링 파이프라인
///
/// 생명주기: [`SievePipelineBuilder::build`] -> [`init`](Self::init) ->
/// [`run`](Self::run) -> [`close`](Self::close). `close`는 실행 상태와
/// 무관하게 안전합니다.
pub struct SievePipeline {
    /// 파이프라인 설정 (수명 내내 불변)
    config: PipelineConfig,
    /// 명령 미설정 시 사용할 외부 입력 스트림
    reader: Option<BoxedReader>,
    /// 주 출력 스트림
    writer: Option<BoxedWriter>,
    /// 공유 상태/카운터
    stats: Arc<PipelineStats>,

    // --- init()에서 채워지는 실행 자원 ---
    /// 공유 수명 토큰
    token: Option<CancellationToken>,
    /// 합류 가능한 태스크 그룹
    group: Option<TaskGroup>,
    /// 미리 바인드된 디버그 리스너
    debug_listener: Option<TcpListener>,
    /// 실제 바인드된 디버그 주소
    debug_addr: Option<SocketAddr>,
    /// 프로세스 감독자 (명령 모드에서만)
    commander: Option<Commander>,
    /// 포함 판정 엔진
    filter: Option<Box<dyn LineFilter>>,
    /// 전체 캡처 싱크 (팬인 태스크가 기록, teardown에서 닫음)
    capture: Option<Arc<Mutex<CaptureWriter>>>,
    /// teardown 완료 여부
    closed: bool,
}

impl SievePipeline {
    /// 실행 자원을 할당합니다.
    ///
    /// 디버그 리스너 바인드, 감독자/판정 엔진/캡처 싱크 구성이 여기서
    /// 일어나며, 실패는 모두 셋업 에러입니다 (어떤 태스크도 생성되지
    /// 않습니다).
    pub async fn init(&mut self) -> Result<(), PipelineError> {
        if self.stats.state() != PipelineState::Created {
            return Err(PipelineError::Config {
                field: "state".to_owned(),
                reason: format!("init called in state '{}'", self.stats.state().as_str()),
            });
        }

        let token = CancellationToken::new();
        let group = TaskGroup::new(token.clone());

        // 디버그 리스너 바인드 — 사용 불가면 즉시 실패
        let listener = TcpListener::bind(&self.config.debug_listen_addr)
            .await
            .map_err(|e| {
                PipelineError::Debug(format!(
                    "bind {} failed: {e}",
                    self.config.debug_listen_addr
                ))
            })?;
        self.debug_addr = listener.local_addr().ok();

        // 감독 대상 명령 (설정된 경우에만)
        if self.config.command_argv.is_empty() {
            if self.reader.is_none() {
                return Err(PipelineError::Config {
                    field: "input".to_owned(),
                    reason: "no command configured and no input stream supplied".to_owned(),
                });
            }
        } else {
            self.commander = Some(Commander::new(
                self.config.command_argv.clone(),
                Duration::from_secs(self.config.shutdown_grace_secs),
            ));
        }

        // 포함 판정 엔진은 정확히 하나
        self.filter = Some(filter::build_filter(
            &self.config.exclude_template,
            &self.config.query,
        )?);

        // 전체 캡처 싱크 (미설정이면 discard)
        let capture = CaptureWriter::from_config(
            &self.config.capture_path,
            self.config.capture_max_size_mb,
            self.config.capture_max_age_days,
            self.config.capture_max_backups,
            self.config.capture_compress,
        );
        if capture.is_enabled() {
            info!(path = %self.config.capture_path, "capture output enabled");
        }
        self.capture = Some(Arc::new(Mutex::new(capture)));

        self.token = Some(token);
        self.group = Some(group);
        self.debug_listener = Some(listener);
        self.stats.set_state(PipelineState::Initialized);
        Ok(())
    }

    /// 파이프라인을 실행하고, 토큰 취소와 전체 태스크 합류까지 블록합니다.
    ///
    /// 반환값은 첫 번째로 기록된 치명적 에러입니다. 외부 취소로 모든
    /// 태스크가 정상 반환하면 `Ok(())`입니다.
    pub async fn run(&mut self) -> Result<(), PipelineError> {
        if self.stats.state() != PipelineState::Initialized {
            return Err(PipelineError::Config {
                field: "state".to_owned(),
                reason: format!("run called in state '{}'", self.stats.state().as_str()),
            });
        }

        let token = self.take_token()?;
        let mut group = self.take_group()?;
        let listener = self.take_listener()?;
        let line_filter = self.take_filter()?;
        let writer = self.take_writer()?;
        let capture = self.take_capture()?;

        // 자식 프로세스 기동과 파이프 확보를 태스크 생성보다 먼저
        // 끝냅니다 — 이후 실패 경로가 없어야 태스크가 새지 않습니다.
        let (child_parts, reader) = if let Some(commander) = self.commander.take() {
            let mut child = commander.spawn()?;
            let stdout = child.stdout.take().ok_or_else(|| {
                PipelineError::CommandSpawn("child stdout unavailable".to_owned())
            })?;
            let stderr = child.stderr.take().ok_or_else(|| {
                PipelineError::CommandSpawn("child stderr unavailable".to_owned())
            })?;
            (Some((commander, child, stdout, stderr)), None)
        } else {
            (None, Some(self.take_reader()?))
        };

        self.stats.set_state(PipelineState::Running);
        info!("pipeline running");

        // 디버그 엔드포인트 accept 루프
        group.spawn(
            "debug-endpoint",
            debug_server::serve(listener, Arc::clone(&self.stats), token.clone()),
        );

        let (line_tx, line_rx) = mpsc::channel::<Bytes>(LINE_CHANNEL_CAPACITY);
        let stdin_mode = child_parts.is_none();

        if let Some((commander, child, stdout, stderr)) = child_parts {
            // 명령 모드: 자식 stdout/stderr 스캐너 + 감독 태스크
            let scanner =
                LineScanner::new("child-stdout", self.config.max_line_bytes, line_tx.clone());
            group.spawn("scan-child-stdout", scanner.run(stdout));

            let scanner =
                LineScanner::new("child-stderr", self.config.max_line_bytes, line_tx.clone());
            group.spawn("scan-child-stderr", scanner.run(stderr));

            let supervisor_token = token.clone();
            group.spawn("command-supervisor", async move {
                commander.supervise(child, supervisor_token).await
            });
        } else {
            // 입력 모드: 스캐너는 그룹 밖(detached)에서 실행합니다.
            // 토큰 취소로 버려지지 않아야 수신 중인 레코드가 잘리지
            // 않습니다 — 자연 EOF나 자체 에러만이 스캐너를 멈춥니다.
            let reader = reader.ok_or_else(|| internal("reader missing"))?;
            let scanner = LineScanner::new("stdin", self.config.max_line_bytes, line_tx.clone());
            let (scan_done_tx, scan_done_rx) = oneshot::channel();
            tokio::spawn(async move {
                let result = scanner.run(reader).await;
                let _ = scan_done_tx.send(result);
            });

            // 그룹 내 감시 태스크: 스캐너 종료 결과 또는 토큰 취소를
            // 기다립니다. 취소 시 스캐너는 그대로 둡니다.
            let watcher_token = token.clone();
            group.spawn("input-watcher", async move {
                tokio::select! {
                    scan_result = scan_done_rx => match scan_result {
                        Ok(result) => result,
                        // 스캐너 태스크 소멸 — 채널 닫힘이 드레인을 끝냄
                        Err(_) => Ok(()),
                    },
                    () = watcher_token.cancelled() => Ok(()),
                }
            });
        }

        // 오케스트레이터가 쥔 송신단을 닫아야 채널 닫힘 = 드레인 완료가
        // 성립합니다
        drop(line_tx);

        // 팬인 태스크: 큐 드레인 + 판정 + 이중 쓰기
        group.spawn(
            "fan-in",
            fan_in(
                line_rx,
                line_filter,
                writer,
                capture,
                Arc::clone(&self.stats),
                token.clone(),
                stdin_mode,
            ),
        );

        let first_error = group.join_all().await;
        self.stats.set_state(PipelineState::Stopped);

        match first_error {
            Some(e) => {
                info!(error = %e, "pipeline stopped with error");
                Err(e)
            }
            None => {
                info!("pipeline stopped");
                Ok(())
            }
        }
    }

    /// 파이프라인 자원을 정리합니다.
    ///
    /// 실행 상태와 무관하게 안전하며, 여러 번 호출해도 한 번만 정리합니다.
    /// 정리 중 에러는 중단 없이 전부 수집해 하나로 보고합니다.
    pub fn close(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut close_errors: Vec<String> = Vec::new();

        if let Some(capture) = self.capture.take() {
            let mut guard = lock_capture(&capture);
            if let Err(e) = guard.close() {
                close_errors.push(format!("failed to close capture writer: {e}"));
            }
        }

        // run()이 호출되지 않았다면 리스너가 아직 남아 있습니다
        if let Some(listener) = self.debug_listener.take() {
            drop(listener);
        }

        if close_errors.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Teardown(close_errors.join("; ")))
        }
    }

    /// 공유 수명 토큰을 돌려줍니다. `init` 이후에만 존재합니다.
    ///
    /// 외부 인터럽트 처리기는 이 토큰을 취소해 파이프라인 전체의
    /// 협조적 종료를 시작합니다.
    pub fn shutdown_token(&self) -> Option<CancellationToken> {
        self.token.clone()
    }

    /// 실제 바인드된 디버그 엔드포인트 주소를 돌려줍니다.
    pub fn debug_addr(&self) -> Option<SocketAddr> {
        self.debug_addr
    }

    /// 공유 상태/카운터 핸들을 돌려줍니다.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// 현재 상태 이름을 돌려줍니다.
    pub fn state_name(&self) -> &'static str {
        self.stats.state().as_str()
    }

    fn take_token(&self) -> Result<CancellationToken, PipelineError> {
        self.token.clone().ok_or_else(|| internal("lifetime token missing"))
    }

    fn take_group(&mut self) -> Result<TaskGroup, PipelineError> {
        self.group.take().ok_or_else(|| internal("task group missing"))
    }

    fn take_listener(&mut self) -> Result<TcpListener, PipelineError> {
        self.debug_listener
            .take()
            .ok_or_else(|| internal("debug listener missing"))
    }

    fn take_filter(&mut self) -> Result<Box<dyn LineFilter>, PipelineError> {
        self.filter.take().ok_or_else(|| internal("filter missing"))
    }

    fn take_writer(&mut self) -> Result<BoxedWriter, PipelineError> {
        self.writer.take().ok_or_else(|| internal("writer missing"))
    }

    fn take_reader(&mut self) -> Result<BoxedReader, PipelineError> {
        self.reader.take().ok_or_else(|| internal("reader missing"))
    }

    fn take_capture(&mut self) -> Result<Arc<Mutex<CaptureWriter>>, PipelineError> {
        self.capture
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| internal("capture writer missing"))
    }
}

fn internal(reason: &str) -> PipelineError {
    PipelineError::Config {
        field: "state".to_owned(),
        reason: reason.to_owned(),
    }
}

fn lock_capture(capture: &Mutex<CaptureWriter>) -> MutexGuard<'_, CaptureWriter> {
    capture.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 팬인 루프 — 공유 큐의 유일한 소비자
///
/// 드레인 완료 조건:
/// - 채널 닫힘 (모든 스캐너 송신단 드롭): 명령 모드의 기본 경로
/// - 입력 모드에서 토큰 취소: 이미 큐에 들어온 레코드만 마저 기록하고
///   종료 (버려진 스캐너는 그대로 둠)
///
/// 팬인이 끝나면 입력 소진으로 보고 토큰을 취소해 나머지 태스크를
/// 정리합니다.
async fn fan_in(
    mut line_rx: mpsc::Receiver<Bytes>,
    mut line_filter: Box<dyn LineFilter>,
    mut writer: BoxedWriter,
    capture: Arc<Mutex<CaptureWriter>>,
    stats: Arc<PipelineStats>,
    token: CancellationToken,
    abandon_input_on_cancel: bool,
) -> Result<(), PipelineError> {
    loop {
        tokio::select! {
            biased;
            maybe_line = line_rx.recv() => match maybe_line {
                Some(line) => {
                    forward_line(&line, line_filter.as_mut(), writer.as_mut(), &capture, &stats)
                        .await?;
                }
                // 모든 스캐너 종료 — 드레인 완료
                None => break,
            },
            () = token.cancelled(), if abandon_input_on_cancel => {
                stats.set_state(PipelineState::Draining);
                while let Ok(line) = line_rx.try_recv() {
                    forward_line(&line, line_filter.as_mut(), writer.as_mut(), &capture, &stats)
                        .await?;
                }
                break;
            }
        }
    }

    stats.set_state(PipelineState::Draining);
    debug!("line queue drained");
    writer
        .flush()
        .await
        .map_err(|e| PipelineError::Write(e.to_string()))?;

    // 입력 소진 — 나머지 태스크의 winddown을 시작합니다
    token.cancel();
    Ok(())
}

/// 한 레코드를 판정하고 주 출력/캡처에 기록합니다.
///
/// 판정과 두 쓰기는 같은 패스 안에서 일어나므로 두 출력이 서로 다른
/// 판정을 관측하는 일은 없습니다.
async fn forward_line(
    line: &Bytes,
    line_filter: &mut dyn LineFilter,
    writer: &mut (dyn AsyncWrite + Send + Unpin),
    capture: &Mutex<CaptureWriter>,
    stats: &PipelineStats,
) -> Result<(), PipelineError> {
    stats.lines_total.fetch_add(1, Ordering::Relaxed);

    if is_included(line_filter, line, stats) {
        stats.lines_included.fetch_add(1, Ordering::Relaxed);
        writer
            .write_all(line)
            .await
            .map_err(|e| PipelineError::Write(e.to_string()))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| PipelineError::Write(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| PipelineError::Write(e.to_string()))?;
    } else {
        stats.lines_excluded.fetch_add(1, Ordering::Relaxed);
    }

    // 포함 여부와 무관하게 전체 캡처에 기록합니다
    lock_capture(capture).write_line(line)?;
    Ok(())
}

/// 판정 에러는 fail-open: 라인을 포함시키고 진단 로그만 남깁니다.
fn is_included(line_filter: &mut dyn LineFilter, line: &Bytes, stats: &PipelineStats) -> bool {
    match line_filter.is_included(line) {
        Ok(included) => included,
        Err(e) => {
            stats.filter_errors.fetch_add(1, Ordering::Relaxed);
            debug!(
                error = %e,
                line = %String::from_utf8_lossy(line),
                "failed to filter line"
            );
            true
        }
    }
}

/// 파이프라인 빌더
///
/// 입출력 스트림과 설정을 조립합니다. 명령이 설정되지 않은 경우
/// 입력 스트림(reader)이 필수입니다.
pub struct SievePipelineBuilder {
    config: PipelineConfig,
    reader: Option<BoxedReader>,
    writer: Option<BoxedWriter>,
}

impl SievePipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            reader: None,
            writer: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 명령 미설정 시 사용할 입력 스트림을 지정합니다.
    pub fn reader(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    /// 주 출력 스트림을 지정합니다.
    pub fn writer(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// 설정을 검증하고 파이프라인을 생성합니다.
    pub fn build(self) -> Result<SievePipeline, PipelineError> {
        self.config.validate()?;

        if self.writer.is_none() {
            return Err(PipelineError::Config {
                field: "writer".to_owned(),
                reason: "primary output stream is required".to_owned(),
            });
        }
        if self.config.command_argv.is_empty() && self.reader.is_none() {
            return Err(PipelineError::Config {
                field: "reader".to_owned(),
                reason: "input stream is required when no command is configured".to_owned(),
            });
        }

        Ok(SievePipeline {
            config: self.config,
            reader: self.reader,
            writer: self.writer,
            stats: Arc::new(PipelineStats::new()),
            token: None,
            group: None,
            debug_listener: None,
            debug_addr: None,
            commander: None,
            filter: None,
            capture: None,
            closed: false,
        })
    }
}

impl Default for SievePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PipelineConfigBuilder;

    use super::*;

    fn test_config() -> PipelineConfig {
        PipelineConfigBuilder::new()
            .debug_listen_addr("127.0.0.1:0")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_writer() {
        let (_input_tx, input_rx) = tokio::io::duplex(64);
        let result = SievePipelineBuilder::new()
            .config(test_config())
            .reader(input_rx)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_requires_reader_without_command() {
        let (_output_tx, output_rx) = tokio::io::duplex(64);
        let result = SievePipelineBuilder::new()
            .config(test_config())
            .writer(output_rx)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_conflicting_predicates() {
        let config = PipelineConfig {
            exclude_template: "{{ level }}".to_owned(),
            query: ".level".to_owned(),
            debug_listen_addr: "127.0.0.1:0".to_owned(),
            ..PipelineConfig::default()
        };
        let (_input_tx, input_rx) = tokio::io::duplex(64);
        let (output_tx, _output_rx) = tokio::io::duplex(64);
        let result = SievePipelineBuilder::new()
            .config(config)
            .reader(input_rx)
            .writer(output_tx)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_creates_pipeline_in_created_state() {
        let (_input_tx, input_rx) = tokio::io::duplex(64);
        let (output_tx, _output_rx) = tokio::io::duplex(64);
        let pipeline = SievePipelineBuilder::new()
            .config(test_config())
            .reader(input_rx)
            .writer(output_tx)
            .build()
            .unwrap();
        assert_eq!(pipeline.state_name(), "created");
        assert!(pipeline.shutdown_token().is_none());
    }

    #[tokio::test]
    async fn init_allocates_resources() {
        let (_input_tx, input_rx) = tokio::io::duplex(64);
        let (output_tx, _output_rx) = tokio::io::duplex(64);
        let mut pipeline = SievePipelineBuilder::new()
            .config(test_config())
            .reader(input_rx)
            .writer(output_tx)
            .build()
            .unwrap();

        pipeline.init().await.unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert!(pipeline.shutdown_token().is_some());
        assert!(pipeline.debug_addr().is_some());
        pipeline.close().unwrap();
    }

    #[tokio::test]
    async fn init_twice_is_error() {
        let (_input_tx, input_rx) = tokio::io::duplex(64);
        let (output_tx, _output_rx) = tokio::io::duplex(64);
        let mut pipeline = SievePipelineBuilder::new()
            .config(test_config())
            .reader(input_rx)
            .writer(output_tx)
            .build()
            .unwrap();

        pipeline.init().await.unwrap();
        assert!(pipeline.init().await.is_err());
        pipeline.close().unwrap();
    }

    #[tokio::test]
    async fn run_before_init_is_error() {
        let (_input_tx, input_rx) = tokio::io::duplex(64);
        let (output_tx, _output_rx) = tokio::io::duplex(64);
        let mut pipeline = SievePipelineBuilder::new()
            .config(test_config())
            .reader(input_rx)
            .writer(output_tx)
            .build()
            .unwrap();

        assert!(pipeline.run().await.is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_before_run() {
        let (_input_tx, input_rx) = tokio::io::duplex(64);
        let (output_tx, _output_rx) = tokio::io::duplex(64);
        let mut pipeline = SievePipelineBuilder::new()
            .config(test_config())
            .reader(input_rx)
            .writer(output_tx)
            .build()
            .unwrap();

        pipeline.close().unwrap();
        pipeline.close().unwrap();
    }
}

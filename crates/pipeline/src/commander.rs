//! 프로세스 감독 — 협조적 종료와 유예 후 강제 종료
//!
//! 하나의 명령을 실행하고 종료까지 감독합니다. 수명 토큰이 취소되면
//! SIGINT로 협조적 종료를 요청하고, 유예 시간 안에 종료하지 않으면
//! SIGKILL로 강제 종료합니다.
//!
//! # 종료 보고
//! - 정상 종료(exit 0): 입력 소진으로 취급, 에러 아님
//! - 0이 아닌 종료 / 시그널 종료: 에러
//! - 유예 초과 후 강제 종료: 에러 (예상된 시나리오이며 재시도하지 않음)

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::PipelineError;

/// 프로세스 감독자
///
/// 명령은 한 번만 실행되며, 어떤 경우에도 재시도하지 않습니다.
pub struct Commander {
    /// 실행할 명령과 인자
    argv: Vec<String>,
    /// SIGINT 후 SIGKILL까지의 유예 시간
    shutdown_grace: Duration,
}

impl Commander {
    /// 새 감독자를 생성합니다. `argv`는 비어 있지 않아야 합니다.
    pub fn new(argv: Vec<String>, shutdown_grace: Duration) -> Self {
        Self {
            argv,
            shutdown_grace,
        }
    }

    /// 자식 프로세스를 시작합니다.
    ///
    /// stdout/stderr는 파이프로 연결되어 호출자가 스캐너에 넘겨줍니다.
    /// 환경변수는 상속되고 stdin은 닫힙니다.
    pub fn spawn(&self) -> Result<Child, PipelineError> {
        let mut command = Command::new(&self.argv[0]);
        command
            .args(&self.argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command.spawn().map_err(|e| {
            PipelineError::CommandSpawn(format!("{}: {e}", self.argv[0]))
        })
    }

    /// 자식이 종료할 때까지 블록합니다.
    ///
    /// 토큰이 먼저 취소되면 협조적 종료 절차를 수행합니다:
    /// SIGINT 전송 → 유예 타이머 시작 → 자식이 먼저 종료하면 타이머 취소,
    /// 타이머가 먼저 만료되면 SIGKILL. 어느 경로든 종료 결과는 정확히
    /// 한 번 보고됩니다.
    pub async fn supervise(
        &self,
        mut child: Child,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        info!(cmd = %self.argv.join(" "), "command started");

        let status = tokio::select! {
            status = child.wait() => status,
            () = token.cancelled() => {
                info!(
                    grace_secs = self.shutdown_grace.as_secs(),
                    "gracefully shutting down command"
                );
                send_interrupt(&child);

                tokio::select! {
                    status = child.wait() => status,
                    () = tokio::time::sleep(self.shutdown_grace) => {
                        warn!("grace period elapsed, forcefully shutting down command");
                        child
                            .kill()
                            .await
                            .map_err(|e| PipelineError::CommandWait(e.to_string()))?;
                        return Err(PipelineError::CommandKilled {
                            grace_secs: self.shutdown_grace.as_secs(),
                        });
                    }
                }
            }
        };

        match status {
            Ok(status) if status.success() => {
                info!("command exited cleanly");
                Ok(())
            }
            Ok(status) => {
                info!(%status, "command exited with error");
                Err(PipelineError::CommandFailed { status })
            }
            Err(e) => Err(PipelineError::CommandWait(e.to_string())),
        }
    }
}

/// 자식에게 협조적 종료 시그널(SIGINT)을 보냅니다.
#[cfg(unix)]
fn send_interrupt(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: 유효한 pid에 시그널만 전송합니다
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    }
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) {
    // SIGINT가 없는 플랫폼에서는 유예 타이머 만료 시의 강제 종료에 맡깁니다
}

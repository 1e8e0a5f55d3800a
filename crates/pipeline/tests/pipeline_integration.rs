//! 통합 테스트 -- 파이프라인 전체 흐름 검증
//!
//! 인메모리 duplex 스트림과 실제 자식 프로세스로 스캐너 → 판정 →
//! 팬인 → 주 출력/캡처의 전체 경로를 검증합니다.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use logsieve_pipeline::{PipelineConfig, PipelineConfigBuilder, SievePipelineBuilder};

/// 주어진 입력을 stdin 모드 파이프라인에 통과시키고 주 출력을 돌려줍니다.
async fn run_stdin_pipeline(config: PipelineConfig, input: &[u8]) -> Vec<u8> {
    let (mut input_tx, input_rx) = tokio::io::duplex(256 * 1024);
    let (output_tx, mut output_rx) = tokio::io::duplex(256 * 1024);

    let collector = tokio::spawn(async move {
        let mut collected = Vec::new();
        output_rx.read_to_end(&mut collected).await.unwrap();
        collected
    });

    let mut pipeline = SievePipelineBuilder::new()
        .config(config)
        .reader(input_rx)
        .writer(output_tx)
        .build()
        .unwrap();
    pipeline.init().await.unwrap();

    input_tx.write_all(input).await.unwrap();
    drop(input_tx); // EOF — 입력 소진

    pipeline.run().await.unwrap();
    assert_eq!(pipeline.state_name(), "stopped");
    pipeline.close().unwrap();

    collector.await.unwrap()
}

fn ephemeral_config() -> PipelineConfigBuilder {
    PipelineConfigBuilder::new().debug_listen_addr("127.0.0.1:0")
}

/// 출력 바이트를 라인 벡터로 분해합니다.
fn lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::to_owned)
        .collect()
}

/// 쿼리 판정: Debug 레벨 제외, 비 JSON 라인은 fail-open으로 포함,
/// 캡처는 판정과 무관하게 모든 라인을 원래 순서로 보존
#[tokio::test]
async fn test_query_filtering_with_capture() {
    let dir = tempfile::tempdir().unwrap();
    let capture_path = dir.path().join("capture.log");

    let config = ephemeral_config()
        .query(r#"select(.Level != "Debug")"#)
        .capture_path(capture_path.to_str().unwrap())
        .build()
        .unwrap();

    let input = concat!(
        "{\"Level\":\"Info\",\"seq\":1}\n",
        "not valid json\n",
        "{\"Level\":\"Debug\",\"seq\":3}\n",
        "{\"Level\":\"Info\",\"seq\":4}\n",
    );
    let output = run_stdin_pipeline(config, input.as_bytes()).await;

    // 주 출력: A, B(비 JSON → 포함), D — C(Debug)만 제외
    assert_eq!(
        lines(&output),
        vec![
            r#"{"Level":"Info","seq":1}"#,
            "not valid json",
            r#"{"Level":"Info","seq":4}"#,
        ]
    );

    // 캡처: 포함 여부와 무관하게 모든 라인이 원래 순서로
    let captured = std::fs::read(&capture_path).unwrap();
    assert_eq!(captured, input.as_bytes());
}

/// 템플릿 판정: 렌더링 결과에 "true"가 있으면 제외
#[tokio::test]
async fn test_template_filtering_end_to_end() {
    let config = ephemeral_config()
        .exclude_template(r#"{{ Level == "Debug" }}"#)
        .build()
        .unwrap();

    let input = concat!(
        "{\"Level\":\"Info\"}\n",
        "{\"Level\":\"Debug\"}\n",
        "plain text line\n",
    );
    let output = run_stdin_pipeline(config, input.as_bytes()).await;

    assert_eq!(
        lines(&output),
        vec![r#"{"Level":"Info"}"#, "plain text line"]
    );
}

/// 판정 엔진 미설정: 모든 라인 포함 (비 JSON 포함)
#[tokio::test]
async fn test_default_filter_includes_everything() {
    let config = ephemeral_config().build().unwrap();
    let input = b"alpha\n{\"x\":1}\n\nomega\n";
    let output = run_stdin_pipeline(config, input).await;
    assert_eq!(output, input);
}

/// 동일 입력 + 동일 설정 → 바이트 단위로 동일한 주 출력 (멱등성)
#[tokio::test]
async fn test_identical_runs_produce_identical_output() {
    let input = concat!(
        "{\"Level\":\"Info\",\"msg\":\"a\"}\n",
        "{\"Level\":\"Debug\",\"msg\":\"b\"}\n",
        "broken {\n",
        "{\"Level\":\"Warn\",\"msg\":\"c\"}\n",
    );

    let config = || {
        ephemeral_config()
            .query(r#"select(.Level != "Debug")"#)
            .build()
            .unwrap()
    };

    let first = run_stdin_pipeline(config(), input.as_bytes()).await;
    let second = run_stdin_pipeline(config(), input.as_bytes()).await;
    assert_eq!(first, second);
}

/// 외부 인터럽트가 이미 수신된 레코드를 잘라먹지 않는다
#[tokio::test]
async fn test_interrupt_does_not_truncate_received_records() {
    let (mut input_tx, input_rx) = tokio::io::duplex(64 * 1024);
    let (output_tx, mut output_rx) = tokio::io::duplex(64 * 1024);

    let collector = tokio::spawn(async move {
        let mut collected = Vec::new();
        output_rx.read_to_end(&mut collected).await.unwrap();
        collected
    });

    let config = ephemeral_config().build().unwrap();
    let mut pipeline = SievePipelineBuilder::new()
        .config(config)
        .reader(input_rx)
        .writer(output_tx)
        .build()
        .unwrap();
    pipeline.init().await.unwrap();
    let token = pipeline.shutdown_token().unwrap();

    // 입력 스트림은 계속 열린 채로 둔다 — EOF가 아니라 인터럽트로 종료
    input_tx.write_all(b"first\nsecond\n").await.unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    pipeline.run().await.unwrap();
    pipeline.close().unwrap();

    let output = collector.await.unwrap();
    assert_eq!(lines(&output), vec!["first", "second"]);
}

/// 자식 프로세스 모드: stdout/stderr 모두 수집되고, 정상 종료는 에러가 아니다
#[cfg(unix)]
#[tokio::test]
async fn test_child_command_both_streams() {
    let script = concat!(
        r#"printf '{"Level":"Info","src":"out"}\n{"Level":"Debug","src":"out"}\n'; "#,
        r#"printf 'stderr line\n' 1>&2"#,
    );
    let config = ephemeral_config()
        .command_argv(vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()])
        .query(r#"select(.Level != "Debug")"#)
        .build()
        .unwrap();

    let (output_tx, mut output_rx) = tokio::io::duplex(64 * 1024);
    let collector = tokio::spawn(async move {
        let mut collected = Vec::new();
        output_rx.read_to_end(&mut collected).await.unwrap();
        collected
    });

    let mut pipeline = SievePipelineBuilder::new()
        .config(config)
        .writer(output_tx)
        .build()
        .unwrap();
    pipeline.init().await.unwrap();
    pipeline.run().await.unwrap();
    pipeline.close().unwrap();

    // stdout/stderr 간 상대 순서는 보장되지 않으므로 집합으로 검증
    let mut output_lines = lines(&collector.await.unwrap());
    output_lines.sort();
    let mut expected = vec![
        r#"{"Level":"Info","src":"out"}"#.to_owned(),
        "stderr line".to_owned(),
    ];
    expected.sort();
    assert_eq!(output_lines, expected);
}

/// 자식의 0이 아닌 종료는 파이프라인의 종단 에러가 된다
#[cfg(unix)]
#[tokio::test]
async fn test_child_nonzero_exit_is_pipeline_error() {
    let config = ephemeral_config()
        .command_argv(vec![
            "sh".to_owned(),
            "-c".to_owned(),
            "exit 7".to_owned(),
        ])
        .build()
        .unwrap();

    let (output_tx, _output_rx) = tokio::io::duplex(4 * 1024);
    let mut pipeline = SievePipelineBuilder::new()
        .config(config)
        .writer(output_tx)
        .build()
        .unwrap();
    pipeline.init().await.unwrap();

    let result = pipeline.run().await;
    pipeline.close().unwrap();
    let err = result.unwrap_err();
    assert!(err.to_string().contains("command exited"));
}

/// 템플릿과 쿼리를 동시에 설정하면 빌드 단계에서 거부된다 —
/// 스캐너/팬인 태스크는 생성되지 않는다
#[tokio::test]
async fn test_conflicting_predicates_rejected_before_any_task() {
    let result = ephemeral_config()
        .exclude_template("{{ Level }}")
        .query(".Level")
        .build();
    assert!(result.is_err());
}

/// 디버그 엔드포인트는 실행 중 상태를 보고하고, 취소 시 함께 내려간다
#[tokio::test]
async fn test_debug_endpoint_reports_status_while_running() {
    let (mut input_tx, input_rx) = tokio::io::duplex(64 * 1024);
    let (output_tx, _output_rx) = tokio::io::duplex(64 * 1024);

    let config = ephemeral_config().build().unwrap();
    let mut pipeline = SievePipelineBuilder::new()
        .config(config)
        .reader(input_rx)
        .writer(output_tx)
        .build()
        .unwrap();
    pipeline.init().await.unwrap();

    let token = pipeline.shutdown_token().unwrap();
    let addr = pipeline.debug_addr().unwrap();

    let runner = tokio::spawn(async move {
        let result = pipeline.run().await;
        (result, pipeline)
    });

    input_tx.write_all(b"one\ntwo\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response).into_owned();

    assert!(response.contains("200 OK"));
    assert!(response.contains("\"state\":\"running\""));
    assert!(response.contains("\"lines_total\":2"));

    token.cancel();
    let (result, mut pipeline) = runner.await.unwrap();
    result.unwrap();
    pipeline.close().unwrap();
}

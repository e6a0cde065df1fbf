use super::*;
use crate::classifier::HealthStatus;
use crate::config::PlantguardConfig;
use crate::serial::BufferedChannel;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;

fn test_config(capture_dir: &std::path::Path, endpoint: &str) -> PlantguardConfig {
    let mut config = PlantguardConfig::default();
    config.capture.path = capture_dir.to_string_lossy().into_owned();
    config.classifier.endpoint = endpoint.to_string();
    config.classifier.request_timeout_secs = 2;
    config.serial.poll_timeout_ms = 500;
    config.protocol.start_window_secs = 3;
    config.protocol.payload_window_secs = 3;
    config.protocol.settle_ms = 200;
    config
}

async fn orchestrator_pair(
    config: PlantguardConfig,
) -> (
    PlantguardOrchestrator<BufferedChannel<DuplexStream>>,
    DuplexStream,
) {
    let (host, device) = tokio::io::duplex(4096);
    let orchestrator = PlantguardOrchestrator::new(config, BufferedChannel::new(host))
        .await
        .unwrap();
    (orchestrator, device)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Minimal one-shot HTTP fixture standing in for the classification
/// endpoint: reads one request fully, answers with `body` as JSON.
async fn serve_classifier_once(listener: TcpListener, body: &'static str) {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];

    let header_end = loop {
        let n = socket.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed before sending a full request");
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();
}

async fn write_frame(device: &mut DuplexStream, header: &str, payload: &[u8], end_line: &str) {
    // give the receiver time to flush stale input first
    tokio::time::sleep(Duration::from_millis(150)).await;
    device.write_all(b"START_IMAGE\n").await.unwrap();
    device
        .write_all(format!("{header}\n").as_bytes())
        .await
        .unwrap();
    device.write_all(payload).await.unwrap();
    device
        .write_all(format!("{end_line}\n").as_bytes())
        .await
        .unwrap();
}

#[tokio::test]
async fn healthy_classification_commands_h_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/detect", listener.local_addr().unwrap());
    let server = tokio::spawn(serve_classifier_once(
        listener,
        r#"{"status":"healthy","confidence":0.92}"#,
    ));

    let (mut orchestrator, mut device) = orchestrator_pair(test_config(dir.path(), &endpoint)).await;

    let device_task = tokio::spawn(async move {
        write_frame(&mut device, "IMG:10", b"0123456789", "END_IMAGE").await;
        // the command the host sends back
        let mut command = [0u8; 2];
        device.read_exact(&mut command).await.unwrap();
        // nothing further should arrive
        let extra = tokio::time::timeout(Duration::from_millis(300), device.read(&mut [0u8; 8])).await;
        (command, extra.is_err())
    });

    let outcome = orchestrator.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Classified {
            status: HealthStatus::Healthy,
            commanded: true,
        }
    );

    let (command, no_extra) = device_task.await.unwrap();
    assert_eq!(&command, b"H\n");
    assert!(no_extra, "only one command must be issued");

    // the frame was persisted before classification
    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn unhealthy_classification_commands_spray() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/detect", listener.local_addr().unwrap());
    let server = tokio::spawn(serve_classifier_once(
        listener,
        r#"{"status":"unhealthy","confidence":0.87,"recommendations":["Isolate affected plants"]}"#,
    ));

    let (mut orchestrator, mut device) = orchestrator_pair(test_config(dir.path(), &endpoint)).await;

    let device_task = tokio::spawn(async move {
        write_frame(&mut device, "IMG:4", b"leaf", "END_IMAGE").await;
        let mut command = [0u8; 2];
        device.read_exact(&mut command).await.unwrap();
        device.write_all(b"SPRAY_SIGNAL_SENT\n").await.unwrap();
        command
    });

    let outcome = orchestrator.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Classified {
            status: HealthStatus::Unhealthy,
            commanded: true,
        }
    );
    assert_eq!(&device_task.await.unwrap(), b"D\n");
    server.await.unwrap();
}

#[tokio::test]
async fn missing_status_field_defaults_to_unknown_and_no_command() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/detect", listener.local_addr().unwrap());
    let server = tokio::spawn(serve_classifier_once(listener, r#"{"confidence":0.5}"#));

    let (mut orchestrator, mut device) = orchestrator_pair(test_config(dir.path(), &endpoint)).await;

    let device_task = tokio::spawn(async move {
        write_frame(&mut device, "IMG:4", b"leaf", "END_IMAGE").await;
        // no command may follow an indeterminate classification
        let read = tokio::time::timeout(Duration::from_millis(500), device.read(&mut [0u8; 8])).await;
        read.is_err()
    });

    let outcome = orchestrator.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Classified {
            status: HealthStatus::Unknown,
            commanded: false,
        }
    );
    assert!(device_task.await.unwrap(), "no command expected");
    server.await.unwrap();
}

#[tokio::test]
async fn negative_size_header_skips_cycle_without_files() {
    let dir = tempfile::tempdir().unwrap();
    // endpoint is never contacted on a skipped cycle
    let config = test_config(dir.path(), "http://127.0.0.1:1/detect");
    let (mut orchestrator, mut device) = orchestrator_pair(config).await;

    let device_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        device.write_all(b"START_IMAGE\n").await.unwrap();
        device.write_all(b"IMG:-1\n").await.unwrap();
        // hold the device end open so the host does not see EOF
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let outcome = orchestrator.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped);

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(files.is_empty(), "no file may be written on a bad header");
    device_task.abort();
}

#[tokio::test]
async fn cancelled_token_stops_the_run_loop() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "http://127.0.0.1:1/detect");
    let (mut orchestrator, _device) = orchestrator_pair(config).await;

    orchestrator.cancellation_token().cancel();
    let exit_code = orchestrator.run().await.unwrap();
    assert_eq!(exit_code, 0);
}

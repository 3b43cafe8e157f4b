use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WELL_SHAPED: &str = r#"{"choices":[{"message":{"content":"hi there"}}],"model":"gpt-4-0613","usage":{"total_tokens":12.0}}"#;

/// Reads one request off `reader` and returns its body.
fn read_request(reader: &mut impl BufRead) -> String {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read request line");
        if line == "\r\n" || line.is_empty() {
            break;
        }
        head.push_str(&line);
    }
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).expect("read request body");
    String::from_utf8_lossy(&body).into_owned()
}

/// Accepts one connection, replies with `response`, returns the raw request.
fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("address should be available");
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept should succeed");
        let mut reader = BufReader::new(stream);
        let body = read_request(&mut reader);
        reader
            .get_mut()
            .write_all(response.as_bytes())
            .expect("write response");
        body
    });
    (format!("http://{addr}/v1/chat/completions"), server)
}

fn http_response(status: &str, extra_headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in extra_headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(body);
    response
}

fn aeh(config_dir: &Path, api_url: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_aeh"));
    cmd.env("AEH_CONFIG_DIR", config_dir)
        .env("AEH_API_URL", api_url)
        .env("AEH_ERR", "plain")
        .env("AEH_SPIN", "false")
        .env("AEH_TIMEOUT_SECS", "10")
        .env("OPENAI_API_KEY", "sk-test")
        .env_remove("RUST_LOG")
        .env_remove("AEH_LOG_OUTPUT");
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn aeh binary");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("failed to wait for aeh")
}

fn request_json(body: &str) -> Value {
    serde_json::from_str(body).expect("request body should be JSON")
}

#[test]
fn answer_goes_to_stdout_and_metadata_to_stderr() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (api_url, server) = serve_once(http_response(
        "200 OK",
        &[
            ("X-Ratelimit-Remaining-Requests", "199"),
            ("X-Ratelimit-Remaining-Tokens", "9973"),
        ],
        WELL_SHAPED,
    ));

    let output = aeh(tmp.path(), &api_url)
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "stderr:\n{stderr}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hi there\n");
    assert!(stderr.contains("model: gpt-4-0613"), "stderr:\n{stderr}");
    assert!(stderr.contains("total tokens used: 12"), "stderr:\n{stderr}");
    assert!(stderr.contains("remaining requests: 199"), "stderr:\n{stderr}");
    assert!(stderr.contains("remaining tokens: 9973"), "stderr:\n{stderr}");

    let request = request_json(&server.join().expect("server thread should join"));
    assert_eq!(
        request,
        serde_json::json!({
            "model": "gpt-3.5-turbo",
            "messages": [{"role": "user", "content": "hello"}],
            "temperature": 0.7,
        })
    );

    let history = fs::read_to_string(tmp.path().join("history.json")).expect("history written");
    assert_eq!(history, "{\"Prompt\":\"hello\",\"Response\":\"hi there\"}\n");
    assert!(tmp.path().join("config.yaml").is_file());
}

#[test]
fn first_run_reports_default_config_creation() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config_dir = tmp.path().join("äh");
    let (api_url, server) = serve_once(http_response("200 OK", &[], WELL_SHAPED));

    let output = aeh(&config_dir, &api_url)
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");
    server.join().expect("server thread should join");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr:\n{stderr}");
    assert!(
        stderr.contains("filled default config at"),
        "stderr:\n{stderr}"
    );
    let config = fs::read_to_string(config_dir.join("config.yaml")).expect("config written");
    assert!(config.contains("model: gpt-3.5-turbo"), "config:\n{config}");
}

#[test]
fn piped_stdin_and_flags_shape_the_request() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (api_url, server) = serve_once(http_response("200 OK", &[], WELL_SHAPED));

    let mut cmd = aeh(tmp.path(), &api_url);
    cmd.args(["-m", "gpt-4", "-t", "0.2", "summarize"]);
    let output = run_with_stdin(cmd, "line one\nline two\n");

    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let request = request_json(&server.join().expect("server thread should join"));
    assert_eq!(request["model"], "gpt-4");
    assert_eq!(request["temperature"], 0.2);
    assert_eq!(
        request["messages"][0]["content"],
        "summarize\n\nline one\nline two\n"
    );

    let history = fs::read_to_string(tmp.path().join("history.json")).expect("history written");
    let entry: Value = serde_json::from_str(history.trim_end()).expect("history line is JSON");
    assert_eq!(entry["Prompt"], "summarize\n\nline one\nline two\n");
}

#[test]
fn config_file_defaults_apply_when_flags_are_absent() {
    let tmp = tempfile::tempdir().expect("tempdir");
    fs::write(
        tmp.path().join("config.yaml"),
        "defaults:\n  model: gpt-4\n  temp: 0.1\n",
    )
    .expect("write config");
    let (api_url, server) = serve_once(http_response("200 OK", &[], WELL_SHAPED));

    let output = aeh(tmp.path(), &api_url)
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");

    assert!(output.status.success());
    let request = request_json(&server.join().expect("server thread should join"));
    assert_eq!(request["model"], "gpt-4");
    assert_eq!(request["temperature"], 0.1);
}

#[test]
fn missing_prompt_prints_usage_and_exits_1() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = aeh(tmp.path(), "http://127.0.0.1:9/v1/chat/completions")
        .output()
        .expect("failed to run aeh binary");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no prompt given"), "stderr:\n{stderr}");
    assert!(stderr.contains("Usage:"), "stderr:\n{stderr}");
}

#[test]
fn extra_positional_arguments_exit_1() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = aeh(tmp.path(), "http://127.0.0.1:9/v1/chat/completions")
        .args(["hello", "world"])
        .output()
        .expect("failed to run aeh binary");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("additional command line"),
        "stderr:\n{stderr}"
    );
}

#[test]
fn missing_api_key_fails_before_any_request() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    listener
        .set_nonblocking(true)
        .expect("nonblocking listener");
    let api_url = format!(
        "http://{}/v1/chat/completions",
        listener.local_addr().expect("address should be available")
    );

    let output = aeh(tmp.path(), &api_url)
        .env_remove("OPENAI_API_KEY")
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("OPENAI_API_KEY environment variable not set"),
        "stderr:\n{stderr}"
    );
    match listener.accept() {
        Err(err) if err.kind() == ErrorKind::WouldBlock => {}
        other => panic!("expected no connection attempt, got {other:?}"),
    }
}

#[test]
fn non_success_status_dumps_raw_response_and_exits_1() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (api_url, server) = serve_once(http_response(
        "401 Unauthorized",
        &[],
        r#"{"error":{"message":"Incorrect API key provided"}}"#,
    ));

    let output = aeh(tmp.path(), &api_url)
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");
    server.join().expect("server thread should join");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("HTTP/1.1 401"), "stderr:\n{stderr}");
    assert!(
        stderr.contains("Incorrect API key provided"),
        "stderr:\n{stderr}"
    );
    assert!(
        stderr.contains("received non-success HTTP status code (401)"),
        "stderr:\n{stderr}"
    );
    assert!(!tmp.path().join("history.json").exists());
}

#[test]
fn malformed_response_is_reported_without_panicking() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (api_url, server) = serve_once(http_response(
        "200 OK",
        &[],
        r#"{"model":"gpt-4-0613","usage":{"total_tokens":3}}"#,
    ));

    let output = aeh(tmp.path(), &api_url)
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");
    server.join().expect("server thread should join");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("response is not of expected shape"),
        "stderr:\n{stderr}"
    );
    assert!(!stderr.contains("panicked"), "stderr:\n{stderr}");
    assert!(!tmp.path().join("history.json").exists());
}

#[test]
fn silent_diagnostics_suppress_stderr_but_keep_exit_code() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = aeh(tmp.path(), "http://127.0.0.1:9/v1/chat/completions")
        .env("AEH_ERR", "false")
        .env_remove("OPENAI_API_KEY")
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");

    assert_eq!(output.status.code(), Some(1));
    assert!(
        output.stderr.is_empty(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn silent_diagnostics_keep_stderr_empty_on_failed_exchange() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (api_url, server) = serve_once(http_response(
        "401 Unauthorized",
        &[],
        r#"{"error":{"message":"Incorrect API key provided"}}"#,
    ));

    let output = aeh(tmp.path(), &api_url)
        .env("AEH_ERR", "false")
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");
    server.join().expect("server thread should join");

    assert_eq!(output.status.code(), Some(1));
    assert!(
        output.stderr.is_empty(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn plain_diagnostics_keep_log_lines_free_of_color() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (api_url, server) = serve_once(http_response(
        "401 Unauthorized",
        &[],
        r#"{"error":{"message":"Incorrect API key provided"}}"#,
    ));

    let output = aeh(tmp.path(), &api_url)
        .arg("hello")
        .output()
        .expect("failed to run aeh binary");
    server.join().expect("server thread should join");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr.contains("chat completion returned non-success status"),
        "stderr:\n{stderr}"
    );
    assert!(!stderr.contains('\u{1b}'), "stderr:\n{stderr:?}");
}

#[cfg(unix)]
#[test]
fn sigint_while_body_streams_exits_1_without_answer_or_history() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let api_url = format!(
        "http://{}/v1/chat/completions",
        listener.local_addr().expect("address should be available")
    );
    let (headers_sent, headers_received) = mpsc::channel();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept should succeed");
        let mut reader = BufReader::new(stream);
        read_request(&mut reader);
        let partial = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            WELL_SHAPED.len(),
            &WELL_SHAPED[..10]
        );
        let stream = reader.get_mut();
        stream
            .write_all(partial.as_bytes())
            .expect("write partial response");
        stream.flush().expect("flush partial response");
        headers_sent.send(()).expect("notify test");
        thread::sleep(Duration::from_millis(1500));
    });

    let child = aeh(tmp.path(), &api_url)
        .arg("hello")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn aeh binary");
    headers_received
        .recv_timeout(Duration::from_secs(10))
        .expect("server should send the response head");
    thread::sleep(Duration::from_millis(300));

    let kill = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("run kill");
    assert!(kill.success());

    let output = child.wait_with_output().expect("failed to wait for aeh");
    server.join().expect("server thread should join");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr:\n{stderr}");
    assert!(output.stdout.is_empty(), "stdout should stay empty");
    assert!(
        stderr.contains("received signal SIGINT"),
        "stderr:\n{stderr}"
    );
    assert!(!tmp.path().join("history.json").exists());
}

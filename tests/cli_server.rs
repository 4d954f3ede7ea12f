use assert_cmd::cargo::CommandCargoExt;
use httpmock::prelude::*;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

struct TestDaemon {
    base_url: String,
    child: Child,
}

impl TestDaemon {
    fn spawn(engine_url: &str) -> Self {
        // Bind an ephemeral port first so we know which port to pass
        // to `recordsearch serve`.
        let listener =
            TcpListener::bind("127.0.0.1:0").expect("bind ephemeral TCP listener for daemon");
        let port = listener
            .local_addr()
            .expect("local_addr for daemon listener")
            .port();
        drop(listener);

        let addr_arg = format!("127.0.0.1:{port}");
        let base_url = format!("http://{addr_arg}");

        let log_dir = std::env::temp_dir();
        let stdout_file = std::fs::File::create(
            log_dir.join(format!("recordsearch_daemon_{port}_stdout.log")),
        )
        .expect("create daemon stdout log file");
        let stderr_file = std::fs::File::create(
            log_dir.join(format!("recordsearch_daemon_{port}_stderr.log")),
        )
        .expect("create daemon stderr log file");

        let mut cmd = Command::cargo_bin("recordsearch").expect("locate recordsearch binary");
        cmd.env_remove("RECORDSEARCH_ENGINE_URL")
            .args(["serve", "--addr", &addr_arg, "--url", engine_url])
            .stdout(stdout_file)
            .stderr(stderr_file);
        let child = cmd.spawn().expect("spawn recordsearch serve");

        wait_for_health(&base_url);

        Self { base_url, child }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn wait_for_health(base_url: &str) {
    let client = Client::new();
    let url = format!("{base_url}/v1/health");

    let mut last_err = None;
    for _ in 0..150 {
        match client.get(&url).send() {
            Ok(resp) if resp.status().is_success() => return,
            Err(e) => {
                last_err = Some(format!("HTTP error: {e}"));
                thread::sleep(Duration::from_millis(100));
            }
            Ok(resp) => {
                last_err = Some(format!("unexpected status: {}", resp.status()));
                thread::sleep(Duration::from_millis(100));
            }
        }
    }

    panic!(
        "recordsearch HTTP daemon did not become healthy in time. Last error: {}",
        last_err.unwrap_or_else(|| "unknown".to_string())
    );
}

#[test]
fn cli_serve_health_endpoint_reports_ok_status() {
    let engine = MockServer::start();
    let daemon = TestDaemon::spawn(&engine.base_url());

    let value: Value = Client::new()
        .get(format!("{}/v1/health", daemon.base_url))
        .send()
        .expect("health response")
        .json()
        .expect("valid health JSON body");

    assert_eq!(value["status"], "ok");
    assert_eq!(value["engine"], "elasticsearch");
    assert_eq!(value["collection"], "data3");
}

#[test]
fn cli_serve_renders_form_and_results() {
    let engine = MockServer::start();
    let search = engine.mock(|when, then| {
        when.method(POST).path("/data3/_search");
        then.status(200).json_body(json!({
            "hits": {"hits": [
                {"_id": "1", "_score": 2.5, "_source": {"debtor_name": "JOHN & SONS"}}
            ]}
        }));
    });
    let daemon = TestDaemon::spawn(&engine.base_url());
    let client = Client::new();

    let form = client
        .get(format!("{}/", daemon.base_url))
        .send()
        .expect("form response")
        .text()
        .expect("form body");
    assert!(form.contains(r#"<form method="get" action="/search">"#));
    assert!(form.contains("Searching Elasticsearch collection <strong>data3</strong>"));

    let page = client
        .get(format!("{}/search", daemon.base_url))
        .query(&[("name", "JOHN"), ("address", ""), ("mode", "permutation")])
        .send()
        .expect("search response")
        .text()
        .expect("search body");

    search.assert();
    assert!(page.contains("Found 1 matching document(s)"));
    assert!(page.contains("<h3>Result 1</h3>"));
    assert!(page.contains("JOHN &amp; SONS"));
}

#[test]
fn cli_serve_json_api_reports_no_query_and_errors() {
    let engine = MockServer::start();
    engine.mock(|when, then| {
        when.method(POST).path("/data3/_search");
        then.status(503).json_body(json!({
            "error": {"type": "cluster_block_exception", "reason": "blocked"},
            "status": 503
        }));
    });
    let daemon = TestDaemon::spawn(&engine.base_url());
    let client = Client::new();
    let url = format!("{}/v1/search", daemon.base_url);

    let empty: Value = client
        .post(&url)
        .json(&json!({}))
        .send()
        .expect("response")
        .json()
        .expect("json");
    assert_eq!(empty["status"], "no_query");

    let failed: Value = client
        .post(&url)
        .json(&json!({"name": "JOHN"}))
        .send()
        .expect("response")
        .json()
        .expect("json");
    assert_eq!(failed["status"], "error");
    assert!(failed["message"]
        .as_str()
        .expect("message")
        .contains("cluster_block_exception"));
    assert_eq!(failed["details"]["status"], 503);
}

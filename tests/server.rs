//! HTTP end-to-end tests. The server runs in-process on a free port with
//! the in-memory index and the scripted chat model.

mod common;

use std::sync::Arc;

use common::{memory_index, minimal_pdf, test_config, ScriptedModel};
use policy_assistant::server::{router, AppState};
use policy_assistant_core::session::InMemorySessionStore;
use serde_json::Value;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server and return its base URL.
async fn start_server() -> String {
    let port = find_free_port();
    let config = test_config(port);
    let state = AppState::new(
        config,
        memory_index(),
        Arc::new(ScriptedModel::new()),
        Arc::new(InMemorySessionStore::unbounded()),
    )
    .unwrap();

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .unwrap();
        axum::serve(listener, router(state)).await.ok();
    });

    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn upload(
    client: &reqwest::Client,
    base: &str,
    filename: &str,
    bytes: Vec<u8>,
    policy_type: &str,
) -> reqwest::Response {
    let form = reqwest::multipart::Form::new()
        .part(
            "file",
            reqwest::multipart::Part::bytes(bytes)
                .file_name(filename.to_string())
                .mime_str("application/pdf")
                .unwrap(),
        )
        .text("policy_type", policy_type.to_string());
    client
        .post(format!("{}/upload-policy", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn upload_then_list_shows_one_policy() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = upload(
        &client,
        &base,
        "leave.pdf",
        minimal_pdf("Employees receive 20 days of annual leave"),
        "HR",
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "HR uploaded and indexed successfully.");
    assert!(body["chunks"].as_u64().unwrap() >= 1);

    let resp = client
        .get(format!("{}/policies", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let policies = body["policies"].as_array().unwrap();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0]["name"], "leave.pdf");
    assert_eq!(policies[0]["type"], "HR");
    assert!(policies[0]["uploaded_at"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &base, "notes.txt", b"plain text".to_vec(), "HR").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn corrupt_pdf_reports_load_stage() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &base, "broken.pdf", b"%PDF-1.4 junk".to_vec(), "HR").await;
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "load");
}

#[tokio::test]
async fn chat_returns_answer_and_history_pairs() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    upload(
        &client,
        &base,
        "leave.pdf",
        minimal_pdf("Employees receive 20 days of annual leave"),
        "HR",
    )
    .await;

    let resp = client
        .post(format!("{}/chat", base))
        .form(&[("query", "hello"), ("session_id", "web-1")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/chat", base))
        .form(&[("query", "What is the leave policy?"), ("session_id", "web-1")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["response"]
        .as_str()
        .unwrap()
        .contains("20 days of annual leave"));
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0][0], "hello");
    assert_eq!(history[1][0], "What is the leave policy?");
}

#[tokio::test]
async fn chat_without_session_id_gets_json_error() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/chat", base))
        .form(&[("query", "What is the leave policy?")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("session_id"));
}

#[tokio::test]
async fn delete_and_clear_report_counts() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    upload(&client, &base, "leave.pdf", minimal_pdf("Annual leave"), "HR").await;
    upload(&client, &base, "it.pdf", minimal_pdf("Password rules"), "IT").await;

    let resp = client
        .delete(format!("{}/policies/missing.pdf", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 0);
    assert_eq!(body["message"], "No documents found with filename: missing.pdf");

    let resp = client
        .delete(format!("{}/policies/leave.pdf", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["deleted"].as_u64().unwrap() >= 1);

    let resp = client
        .delete(format!("{}/policies/clear-all", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["deleted"].as_u64().unwrap() >= 1);

    let body: Value = client
        .get(format!("{}/policies", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["policies"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_reports_status_and_level() {
    let base = start_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["log_level"], "debug");
    assert!(body["version"].is_string());
}

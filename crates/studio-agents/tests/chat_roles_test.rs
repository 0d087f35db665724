//! Chat role client against a local fake completions server, plus one live
//! endpoint check.
//!
//! The live test is `#[ignore]`; run it with
//! `cargo test -p studio-agents -- --ignored` and `STUDIO_LLM_*` set.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline::taxonomy::*;
use pipeline::{
    DebateConfig, DebateOrchestrator, DebateRole, Provenance, RoleInvoker, RoleRequest,
    SettingsCandidate,
};
use studio_agents::{ChatRoleInvoker, LlmEndpoint};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Serves one canned response per connection, in order, and forwards each
/// request body.
async fn fake_server(replies: Vec<(u16, String)>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            tx.send(request).unwrap();
            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    (format!("http://{addr}/v1"), rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).into_owned();
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn completion(content: &str) -> (u16, String) {
    let body = serde_json::json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    });
    (200, body.to_string())
}

fn endpoint(url: String) -> LlmEndpoint {
    LlmEndpoint {
        url,
        model: "test-model".into(),
        api_key: Some("sk-test".into()),
        temperature: 0.7,
        max_tokens: 256,
        timeout: Duration::from_secs(5),
    }
}

fn hoodie() -> AttributeSet {
    let raw: RawAttributes = serde_json::from_value(serde_json::json!({
        "garment_type": "hoodie", "color": "black", "fit": "oversized", "gender": "unisex"
    }))
    .unwrap();
    raw.normalize("ART-7").unwrap()
}

fn candidate() -> SettingsCandidate {
    SettingsCandidate {
        settings: ImageSettings {
            style: Style::Streetwear,
            lighting: Lighting::Studio,
            background: Background::UrbanStreet,
            pose: Pose::Standing,
            expression: Expression::Confident,
            angle: Angle::Front,
        },
        predicted_score: 0.58,
        confidence: 0.66,
        model_version: "20260101T000000-n90".into(),
        generated_at: Utc::now(),
        reasoning: "best of the enumerated space".into(),
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_role_request_becomes_system_and_user_messages() {
    let (url, mut requests) = fake_server(vec![completion("Trust the model.")]).await;
    let invoker = ChatRoleInvoker::new(endpoint(url)).unwrap();

    let reply = invoker
        .invoke(
            DebateRole::PERFORMANCE,
            &RoleRequest {
                instructions: "You are terse.".into(),
                prompt: "Argue for the prediction.".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reply, "Trust the model.");

    let sent: serde_json::Value = serde_json::from_str(&requests.recv().await.unwrap()).unwrap();
    assert_eq!(sent["model"], "test-model");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][0]["content"], "You are terse.");
    assert_eq!(sent["messages"][1]["role"], "user");
    assert_eq!(sent["messages"][1]["content"], "Argue for the prediction.");
}

#[tokio::test]
async fn test_error_status_names_role() {
    let (url, _requests) = fake_server(vec![(503, r#"{"error": "overloaded"}"#.into())]).await;
    let invoker = ChatRoleInvoker::new(endpoint(url)).unwrap();

    let err = invoker
        .invoke(
            DebateRole::Moderator,
            &RoleRequest {
                instructions: String::new(),
                prompt: "decide".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.0.starts_with("moderator:"), "{}", err.0);
    assert!(err.0.contains("503"));
}

// ── Full debate over HTTP ───────────────────────────────────────────

#[tokio::test]
async fn test_debate_over_http_produces_hybrid_decision() {
    let (url, mut requests) = fake_server(vec![
        completion("The data favours studio light."),
        completion(r#"{"argument": "Daylight fits the label.", "proposed_settings": {"lighting": "natural"}}"#),
        completion(
            r#"{"choices": {"style": "performance", "lighting": "brand", "background": "performance",
                "pose": "performance", "expression": "performance", "angle": "performance"},
                "reasoning": "Softer light, same composition."}"#,
        ),
    ])
    .await;
    let invoker = Arc::new(ChatRoleInvoker::new(endpoint(url)).unwrap());
    let orchestrator = DebateOrchestrator::new(invoker, DebateConfig::default());

    let outcome = orchestrator
        .run(&candidate(), &hoodie(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.decision().provenance, Provenance::Hybrid);
    assert_eq!(outcome.decision().settings.lighting, Lighting::Natural);
    assert_eq!(outcome.decision().settings.background, Background::UrbanStreet);

    let mut systems = Vec::new();
    while let Ok(body) = requests.try_recv() {
        let sent: serde_json::Value = serde_json::from_str(&body).unwrap();
        systems.push(sent["messages"][0]["content"].as_str().unwrap().to_string());
    }
    assert_eq!(
        systems,
        vec![
            DebateRole::PERFORMANCE.instructions(),
            DebateRole::BRAND.instructions(),
            DebateRole::Moderator.instructions(),
        ]
    );
}

// ── Live endpoint ───────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_live_endpoint_answers_performance_role() {
    let invoker = ChatRoleInvoker::new(LlmEndpoint::default()).unwrap();
    let reply = invoker
        .invoke(
            DebateRole::PERFORMANCE,
            &pipeline::debate::roles::performance_request(&candidate()),
        )
        .await
        .unwrap();
    assert!(!reply.trim().is_empty());
}

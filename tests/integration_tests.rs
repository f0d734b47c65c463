use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use parkbot::config::AppConfig;
use parkbot::db::{self, queries};
use parkbot::handlers;
use parkbot::models::{ConversationContext, ConversationState};
use parkbot::services::conversation::{ConversationEngine, Settings};
use parkbot::services::dispatcher::{self, UserLocks};
use parkbot::services::keyboard::Keyboard;
use parkbot::services::transport::{Invoice, Transport};
use parkbot::state::AppState;

// ── Mock Transport ──

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Message { chat_id: i64, text: String },
    Photo { chat_id: i64, caption: String },
    Edit { message_id: i64, text: String },
    Callback { text: Option<String> },
    Invoice { payload: String, total: i64 },
    PreCheckout { ok: bool },
}

type Calls = Arc<Mutex<Vec<Call>>>;

struct MockTransport {
    calls: Calls,
    fail: bool,
}

impl MockTransport {
    fn record(&self, call: Call) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("transport unavailable");
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()> {
        self.record(Call::Message {
            chat_id,
            text: text.to_string(),
        })
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _photo: &str,
        caption: &str,
        _keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()> {
        self.record(Call::Photo {
            chat_id,
            caption: caption.to_string(),
        })
    }

    async fn edit_message(
        &self,
        _chat_id: i64,
        message_id: i64,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()> {
        self.record(Call::Edit {
            message_id,
            text: text.to_string(),
        })
    }

    async fn answer_callback(&self, _callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        self.record(Call::Callback {
            text: text.map(str::to_string),
        })
    }

    async fn send_invoice(&self, _chat_id: i64, invoice: &Invoice) -> anyhow::Result<()> {
        self.record(Call::Invoice {
            payload: invoice.payload.clone(),
            total: invoice.prices.iter().map(|p| p.amount).sum(),
        })
    }

    async fn answer_pre_checkout(
        &self,
        _query_id: &str,
        ok: bool,
        _error_message: Option<&str>,
    ) -> anyhow::Result<()> {
        self.record(Call::PreCheckout { ok })
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        telegram_api_url: "http://localhost:8081".to_string(),
        bot_token: "bot".to_string(),
        link_bot_token: "link".to_string(),
        webhook_secret: "".to_string(), // empty = skip secret validation
        payment_provider_token: "provider".to_string(),
        currency: "KZT".to_string(),
        hold_minutes: 15,
        grace_minutes: 10,
        sweep_interval_secs: 60,
        page_size: 6,
        support_text: "Call us".to_string(),
    }
}

struct Harness {
    state: Arc<AppState>,
    calls: Calls,
    link_calls: Calls,
}

fn harness_with(config: AppConfig, fail: bool) -> Harness {
    let conn = db::init_db(":memory:").unwrap();
    let calls: Calls = Arc::new(Mutex::new(vec![]));
    let link_calls: Calls = Arc::new(Mutex::new(vec![]));
    let engine = ConversationEngine::new(Settings::from(&config)).unwrap();
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        engine,
        transport: Box::new(MockTransport {
            calls: Arc::clone(&calls),
            fail,
        }),
        link_transport: Box::new(MockTransport {
            calls: Arc::clone(&link_calls),
            fail: false,
        }),
        user_locks: UserLocks::default(),
    });
    Harness {
        state,
        calls,
        link_calls,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), false)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/telegram", post(handlers::webhook::telegram_webhook))
        .route("/webhook/link", post(handlers::webhook::link_webhook))
        .route("/api/admin/status", get(handlers::admin::get_status))
        .route(
            "/api/accounts/:username/link-token",
            post(handlers::admin::issue_link_token),
        )
        .with_state(state)
}

fn from() -> serde_json::Value {
    json!({ "id": 42, "first_name": "Dana", "username": "dana" })
}

fn text_update(text: &str) -> serde_json::Value {
    json!({
        "update_id": 1,
        "message": { "message_id": 10, "from": from(), "chat": { "id": 42 }, "text": text }
    })
}

fn contact_update() -> serde_json::Value {
    json!({
        "update_id": 1,
        "message": {
            "message_id": 11, "from": from(), "chat": { "id": 42 },
            "contact": { "phone_number": "+77010000000", "first_name": "Dana" }
        }
    })
}

fn callback_update(data: &str) -> serde_json::Value {
    json!({
        "update_id": 1,
        "callback_query": {
            "id": "cb", "from": from(),
            "message": { "message_id": 20, "chat": { "id": 42 } },
            "data": data
        }
    })
}

fn pre_checkout_update(payload: &str, total: i64) -> serde_json::Value {
    json!({
        "update_id": 1,
        "pre_checkout_query": {
            "id": "pcq", "from": from(), "currency": "KZT",
            "total_amount": total, "invoice_payload": payload
        }
    })
}

fn payment_update(payload: &str, total: i64) -> serde_json::Value {
    json!({
        "update_id": 1,
        "message": {
            "message_id": 12, "from": from(), "chat": { "id": 42 },
            "successful_payment": { "currency": "KZT", "total_amount": total, "invoice_payload": payload }
        }
    })
}

fn webhook_request(uri: &str, update: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(update.to_string()))
        .unwrap()
}

async fn send(state: &Arc<AppState>, update: serde_json::Value) {
    let res = test_app(state.clone())
        .oneshot(webhook_request("/webhook/telegram", &update))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

fn conversation(state: &Arc<AppState>) -> ConversationContext {
    let conn = state.db.lock().unwrap();
    queries::get_conversation(&conn, "42").unwrap().unwrap()
}

// ── Health & Webhook Tests ──

#[tokio::test]
async fn test_health() {
    let h = harness();
    let res = test_app(h.state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_webhook_acknowledges_garbage() {
    let h = harness();
    let res = test_app(h.state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/telegram")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(h.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_secret_is_checked() {
    let mut config = test_config();
    config.webhook_secret = "s3cret".to_string();
    let h = harness_with(config, false);

    let res = test_app(h.state.clone())
        .oneshot(webhook_request("/webhook/telegram", &text_update("/start")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(h.calls.lock().unwrap().is_empty());

    let mut req = webhook_request("/webhook/telegram", &text_update("/start"));
    req.headers_mut()
        .insert("x-telegram-bot-api-secret-token", "s3cret".parse().unwrap());
    let res = test_app(h.state).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!h.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_creates_conversation() {
    let h = harness();
    send(&h.state, text_update("/start")).await;

    assert_eq!(conversation(&h.state).state, ConversationState::AwaitingCarNumber);
    let calls = h.calls.lock().unwrap();
    assert!(matches!(&calls[0], Call::Message { chat_id: 42, text } if text.contains("three digits")));
}

#[tokio::test]
async fn test_delivery_failure_is_reported_after_save() {
    let h = harness_with(test_config(), true);
    let raw = text_update("/start").to_string();

    let result = dispatcher::receive(&h.state, raw.as_bytes()).await;
    assert!(result.is_err());
    assert_eq!(conversation(&h.state).state, ConversationState::AwaitingCarNumber);
}

// ── Admin API Tests ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let h = harness();
    let res = test_app(h.state)
        .oneshot(
            Request::builder()
                .uri("/api/admin/status")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_status() {
    let h = harness();
    {
        let conn = h.state.db.lock().unwrap();
        let cat = queries::insert_category(&conn, "Zone A").unwrap();
        queries::insert_product(&conn, &cat.id, "A1", "", 500, None).unwrap();
    }

    let res = test_app(h.state)
        .oneshot(
            Request::builder()
                .uri("/api/admin/status")
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["free_places"], 1);
    assert_eq!(json["held_places"], 0);
    assert_eq!(json["open_purchases"], 0);
    assert_eq!(json["conversations"], 0);
}

#[tokio::test]
async fn test_link_token_flow() {
    let h = harness();

    let res = test_app(h.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/accounts/alice/link-token")
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let token = json["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 20);

    let update = json!({
        "update_id": 1,
        "message": { "message_id": 1, "from": from(), "chat": { "id": 777 }, "text": token }
    });
    let res = test_app(h.state.clone())
        .oneshot(webhook_request("/webhook/link", &update))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(
        h.link_calls.lock().unwrap().as_slice(),
        &[Call::Message {
            chat_id: 777,
            text: "Your account is now linked.".to_string()
        }]
    );
    let conn = h.state.db.lock().unwrap();
    let account = queries::get_or_create_account(&conn, "alice").unwrap();
    assert_eq!(account.chat_id.as_deref(), Some("777"));
    assert!(account.link_token.is_none());
}

// ── Dialogue Tests ──

#[tokio::test]
async fn test_full_reservation_dialogue() {
    let h = harness();
    let product = {
        let conn = h.state.db.lock().unwrap();
        let cat = queries::insert_category(&conn, "Zone A").unwrap();
        queries::insert_product(&conn, &cat.id, "A1", "Near the gate", 50_000, None).unwrap()
    };

    send(&h.state, text_update("/start")).await;
    for answer in ["123", "abc", "2"] {
        send(&h.state, text_update(answer)).await;
    }
    send(&h.state, contact_update()).await;
    assert_eq!(conversation(&h.state).state, ConversationState::MainMenu);

    send(&h.state, callback_update("catalog")).await;
    assert_eq!(conversation(&h.state).state, ConversationState::Categories);

    send(&h.state, callback_update(&product.category_id)).await;
    assert_eq!(conversation(&h.state).state, ConversationState::Products);

    send(&h.state, callback_update(&product.id)).await;
    send(&h.state, callback_update("2")).await;
    send(&h.state, callback_update("confirm")).await;
    let ctx = conversation(&h.state);
    assert_eq!(ctx.state, ConversationState::ShowingCart);
    assert_eq!(ctx.cart.total(), 100_000);

    send(&h.state, callback_update("payment")).await;
    let payload = h
        .calls
        .lock()
        .unwrap()
        .iter()
        .find_map(|c| match c {
            Call::Invoice { payload, total } => {
                assert_eq!(*total, 100_000);
                Some(payload.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(conversation(&h.state).state, ConversationState::AwaitingPayment);

    send(&h.state, pre_checkout_update(&payload, 100_000)).await;
    assert_eq!(h.calls.lock().unwrap().last(), Some(&Call::PreCheckout { ok: true }));

    send(&h.state, payment_update(&payload, 100_000)).await;
    let ctx = conversation(&h.state);
    assert_eq!(ctx.state, ConversationState::AwaitingOccupancy);
    assert!(ctx.cart.is_empty());

    let purchase_id: String = {
        let conn = h.state.db.lock().unwrap();
        assert!(!queries::get_product(&conn, &product.id).unwrap().unwrap().is_free);
        conn.query_row("SELECT id FROM purchases", [], |row| row.get(0))
            .unwrap()
    };

    send(&h.state, callback_update(&format!("took:{purchase_id}"))).await;
    assert_eq!(conversation(&h.state).state, ConversationState::MainMenu);
    let conn = h.state.db.lock().unwrap();
    assert!(queries::get_product(&conn, &product.id).unwrap().unwrap().is_took_place);
    assert!(queries::get_purchase(&conn, &purchase_id).unwrap().unwrap().is_completed);
}

#[tokio::test]
async fn test_stale_invoice_is_declined() {
    let h = harness();
    send(&h.state, pre_checkout_update("forged", 100)).await;
    // No conversation is waiting for a payment, so nothing routes.
    assert!(h.calls.lock().unwrap().is_empty());

    {
        let conn = h.state.db.lock().unwrap();
        let mut ctx = ConversationContext::new("42", 42, chrono::Utc::now().naive_utc());
        ctx.state = ConversationState::AwaitingPayment;
        ctx.user_data.invoice_payload = Some("real".to_string());
        queries::save_conversation(&conn, &ctx).unwrap();
    }
    send(&h.state, pre_checkout_update("forged", 100)).await;
    assert_eq!(h.calls.lock().unwrap().as_slice(), &[Call::PreCheckout { ok: false }]);
    assert_eq!(conversation(&h.state).state, ConversationState::AwaitingPayment);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_for_same_user_are_serialized() {
    let h = harness();
    {
        let conn = h.state.db.lock().unwrap();
        for i in 0..13 {
            queries::insert_category(&conn, &format!("Zone {i:02}")).unwrap();
        }
        let mut ctx = ConversationContext::new("42", 42, chrono::Utc::now().naive_utc());
        ctx.state = ConversationState::Categories;
        ctx.user_data.current_page = Some(1);
        queries::save_conversation(&conn, &ctx).unwrap();
    }

    let raw = callback_update("next").to_string();
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let state = h.state.clone();
            let raw = raw.clone();
            tokio::spawn(async move { dispatcher::receive(&state, raw.as_bytes()).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(conversation(&h.state).user_data.current_page, Some(3));
}

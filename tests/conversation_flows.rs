//! End-to-end conversation flows: dispatcher and gateway against a mock
//! SPL Shield backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spl_shield_bot::dispatcher::{Dispatcher, Event, NoopNotifier, OutgoingContent};
use spl_shield_bot::gateway::ApiGateway;
use spl_shield_bot::session::{ConversationState, SessionStore, Tier, UserId};

const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

struct Bot {
    server: MockServer,
    gateway: Arc<ApiGateway>,
    dispatcher: Arc<Dispatcher>,
}

impl Bot {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let gateway = Arc::new(ApiGateway::new(server.uri(), Duration::from_secs(5)));
        let admins: HashSet<UserId> = [UserId::from(1i64)].into_iter().collect();
        let dispatcher = Arc::new(Dispatcher::new(
            gateway.clone(),
            SessionStore::new(),
            admins,
        ));
        Self {
            server,
            gateway,
            dispatcher,
        }
    }

    async fn say(&self, user: &UserId, text: &str) -> OutgoingContent {
        self.send(user, Event::from_text(text)).await
    }

    async fn send(&self, user: &UserId, event: Event) -> OutgoingContent {
        self.dispatcher
            .dispatch(user, event, &NoopNotifier)
            .await
            .expect("reply")
    }

    async fn state(&self, user: &UserId) -> ConversationState {
        self.dispatcher.sessions().get(user).await.state
    }

    async fn mount_login(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "token_type": "bearer",
                "user": { "username": "neo", "email": "neo@zion.io" }
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": "neo",
                "email": "neo@zion.io",
                "created_at": "2025-01-04"
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/payment/credits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "premium_credits": 3, "mvp_credits": 0, "tdl_balance": "12.5" }
            })))
            .mount(&self.server)
            .await;
    }

    async fn login(&self, user: &UserId) -> OutgoingContent {
        self.say(user, "/login").await;
        self.say(user, "neo@zion.io").await;
        self.say(user, "secret1").await
    }
}

fn scan_payload(score: f64) -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "analysis": {
                "risk_score": score,
                "risk_level": "high",
                "risk_factors": ["Mint authority enabled", { "description": "Top 10 holders own 80%" }],
                "strengths": ["Verified metadata"],
                "ai_analysis": { "summary": "Concentrated supply." },
                "recommendations": ["Avoid large positions.", "Watch the mint."]
            }
        },
        "message": "Premium scan complete"
    })
}

#[tokio::test]
async fn register_login_and_scan() {
    let bot = Bot::start().await;
    let user = UserId::from(1001i64);

    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(body_string_contains("username=neo"))
        .and(body_string_contains("email=neo%40zion.io"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Verification email sent",
            "user_id": 7
        })))
        .expect(1)
        .mount(&bot.server)
        .await;
    bot.mount_login("tok-neo").await;
    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .and(header("authorization", "Bearer tok-neo"))
        .and(body_partial_json(json!({ "address": BONK, "tier": "premium" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(scan_payload(0.82)))
        .expect(1)
        .mount(&bot.server)
        .await;

    bot.say(&user, "/register").await;
    bot.say(&user, "neo@zion.io").await;
    bot.say(&user, "secret1").await;
    bot.say(&user, "secret1").await;
    let reply = bot.say(&user, "neo").await;
    assert!(reply.text.contains("Verification email sent"));
    assert_eq!(bot.state(&user).await, ConversationState::Idle);

    let reply = bot.login(&user).await;
    assert!(reply.text.contains("Welcome back, neo!"));
    assert!(reply.text.contains("Tier: PREMIUM"));

    bot.say(&user, "/scan").await;
    bot.say(&user, BONK).await;
    let reply = bot.send(&user, Event::TierSelected(Tier::Premium)).await;
    assert!(reply.text.contains("Premium scan complete"));
    assert!(reply.text.contains("0.82"));
    assert!(reply.text.contains("CRITICAL"));
    assert!(reply.text.contains("Top 10 holders own 80%"));
    assert!(reply.text.contains("Avoid large positions."));
    assert!(!reply.text.contains("Watch the mint."));
    assert_eq!(bot.state(&user).await, ConversationState::Idle);

    let reply = bot.say(&user, "/balance").await;
    assert!(reply.text.contains("12.5 TDL"));
}

#[tokio::test]
async fn insufficient_credits_and_rate_limit() {
    let bot = Bot::start().await;
    let user = UserId::from(1002i64);

    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .and(body_partial_json(json!({ "tier": "mvp" })))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({ "detail": "Payment required" })))
        .mount(&bot.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .and(body_partial_json(json!({ "tier": "free" })))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "detail": "Too many" })))
        .mount(&bot.server)
        .await;

    bot.say(&user, &format!("/scan {BONK}")).await;
    let reply = bot.send(&user, Event::TierSelected(Tier::Mvp)).await;
    assert!(reply.text.contains("insufficient credits for a mvp scan"));
    let session = bot.dispatcher.sessions().get(&user).await;
    assert_eq!(session.state, ConversationState::Idle);
    assert!(session.fields.is_empty());

    bot.say(&user, &format!("/scan {BONK}")).await;
    let reply = bot.send(&user, Event::TierSelected(Tier::Free)).await;
    assert!(reply.text.contains("daily limit reached"));
    assert!(reply.text.contains("/upgrade"));
}

#[tokio::test]
async fn expired_token_logs_the_user_out() {
    let bot = Bot::start().await;
    let user = UserId::from(1003i64);
    bot.mount_login("tok-old").await;
    bot.login(&user).await;
    assert!(bot.dispatcher.sessions().auth(&user).await.is_authenticated().await);

    Mock::given(method("GET"))
        .and(path("/api/scan/history"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })))
        .mount(&bot.server)
        .await;

    let reply = bot.say(&user, "/history").await;
    assert!(reply.text.contains("Token expired"));
    assert!(reply.text.contains("/login"));
    assert!(!bot.dispatcher.sessions().auth(&user).await.is_authenticated().await);

    let reply = bot.say(&user, "/history").await;
    assert!(reply.text.contains("Please login first"));
}

#[tokio::test]
async fn admin_dashboard_tolerates_wrapped_payloads() {
    let bot = Bot::start().await;
    let admin = UserId::from(1i64);
    bot.mount_login("tok-admin").await;
    Mock::given(method("GET"))
        .and(path("/api/admin/dashboard/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "users": [
                { "username": "neo", "email": "neo@zion.io", "tier": "mvp", "total_scans": 9 }
            ] }
        })))
        .mount(&bot.server)
        .await;

    assert!(bot.say(&UserId::from(2i64), "/users").await.text.contains("admins only"));

    bot.login(&admin).await;
    let reply = bot.say(&admin, "/users").await;
    assert!(reply.text.contains("neo (neo@zion.io)"));
    assert!(reply.text.contains("Scans: 9"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_users_scan_concurrently() {
    let bot = Bot::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(scan_payload(0.1))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(20)
        .mount(&bot.server)
        .await;

    let users: Vec<UserId> = (0..20i64).map(|i| UserId::from(5000 + i)).collect();
    for user in &users {
        bot.say(user, &format!("/scan {BONK}")).await;
    }

    let started = Instant::now();
    let mut tasks = Vec::new();
    for user in users.clone() {
        let dispatcher = Arc::clone(&bot.dispatcher);
        tasks.push(tokio::spawn(async move {
            dispatcher
                .dispatch(&user, Event::TierSelected(Tier::Free), &NoopNotifier)
                .await
        }));
    }
    for task in tasks {
        let reply = task.await.unwrap().expect("reply");
        assert!(reply.text.contains("LOW"));
    }
    // Twenty serial calls would take six seconds.
    assert!(started.elapsed() < Duration::from_secs(3));

    for user in &users {
        assert_eq!(bot.state(user).await, ConversationState::Idle);
    }
    bot.gateway.close().await;
    assert!(!bot.gateway.is_open().await);
}

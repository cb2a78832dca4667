use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use toloni_backend::{
    AppState, Backends,
    auth::{RecordingMailer, mailer::token_from_link},
    clock::{Clock, ManualClock},
    config::Config,
    models::ReportCandidate,
    routes,
    store::memory::{
        MemoryAttemptStore, MemoryReportStore, MemorySessionStore, MemoryTrophyStore,
        MemoryUserStore,
    },
    trophy::events::run_worker,
};

const PASSWORD: &str = "Tucunare2024";
const ADMIN: &str = "chefe@gmail.com";
const WEBHOOK_SECRET: &str = "hook-secret";

struct TestApp {
    router: Router,
    state: AppState,
    mailer: Arc<RecordingMailer>,
    reports: Arc<MemoryReportStore>,
}

fn app() -> TestApp {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 18, 15, 0, 0).unwrap());
    let clock: Arc<dyn Clock> = Arc::new(clock);
    let mailer = Arc::new(RecordingMailer::new());
    let reports = Arc::new(MemoryReportStore::new());
    let config = Config {
        bcrypt_cost: 4,
        admin_emails: vec![ADMIN.into()],
        trophy_webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..Config::default()
    };
    let backends = Backends {
        users: Arc::new(MemoryUserStore::new(clock.clone())),
        sessions: Arc::new(MemorySessionStore::new(clock.clone())),
        attempts: Arc::new(MemoryAttemptStore::new(clock.clone())),
        reports: reports.clone(),
        trophies: Arc::new(MemoryTrophyStore::new()),
        mailer: mailer.clone(),
        clock,
    };
    let (state, rx) = AppState::new(config, backends);
    tokio::spawn(run_worker(state.trophies.clone(), rx));
    TestApp {
        router: routes::router(state.clone()),
        state,
        mailer,
        reports,
    }
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            cookie,
            body,
        }
    }

    async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> Reply {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Reply {
        let mut req = Request::get(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn register(&self, name: &str, email: &str) -> Reply {
        self.post(
            "/api/auth/register",
            json!({ "name": name, "email": email, "password": PASSWORD }),
            None,
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> Reply {
        self.post(
            "/api/auth/login",
            json!({ "email": email, "password": password }),
            None,
        )
        .await
    }

    /// Register, confirm the email, and log in; returns the cookie.
    async fn verified_session(&self, email: &str) -> String {
        assert_eq!(self.register("Pescador", email).await.status, StatusCode::OK);
        let token = token_from_link(&self.mailer.last_to(email).unwrap().text).unwrap();
        let verify = self
            .get(&format!("/api/auth/verify-email?token={token}&format=json"), None)
            .await;
        assert_eq!(verify.status, StatusCode::OK);
        self.login(email, PASSWORD).await.cookie.unwrap()
    }

    async fn admin_session(&self) -> String {
        self.register("Chefe", ADMIN).await;
        self.login(ADMIN, PASSWORD).await.cookie.unwrap()
    }
}

fn report(id: i64, weight: Option<f64>, likes: i64) -> ReportCandidate {
    ReportCandidate {
        id,
        user_id: 1,
        fisherman_name: format!("Pescador {id}"),
        fish_species: Some("Tucunaré".into()),
        fish_weight: weight,
        location: Some("Represa de Três Marias".into()),
        image_url: Some(format!("/uploads/{id}.jpg")),
        is_public: true,
        likes_count: likes,
        created_at: Utc.with_ymd_and_hms(2024, 9, 2, 7, 0, 0).unwrap(),
    }
}

fn report_ids(trophies: &Value) -> Vec<i64> {
    trophies
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["report_id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn session_check_without_cookie_is_anonymous_success() {
    let app = app();
    let reply = app.get("/api/auth/session", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body,
        json!({ "success": true, "authenticated": false, "user": null })
    );
}

#[tokio::test]
async fn register_verify_login_logout_flow() {
    let app = app();
    let reply = app.register("Ana", "ana@gmail.com").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["emailSent"], true);

    let duplicate = app.register("Ana", "ANA@gmail.com").await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.body["error"], "email_taken");

    let early = app.login("ana@gmail.com", PASSWORD).await;
    assert_eq!(early.status, StatusCode::FORBIDDEN);
    assert_eq!(early.body["error"], "email_not_verified");
    assert!(early.cookie.is_none());

    let token = token_from_link(&app.mailer.last_to("ana@gmail.com").unwrap().text).unwrap();
    let page = app
        .get(&format!("/api/auth/verify-email?token={token}"), None)
        .await;
    assert_eq!(page.status, StatusCode::OK);
    let again = app
        .get(&format!("/api/auth/verify-email?token={token}&format=json"), None)
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.body["error"], "invalid_token");

    let login = app.login("ana@gmail.com", PASSWORD).await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["user"]["email"], "ana@gmail.com");
    assert_eq!(login.body["user"]["emailVerified"], true);
    assert!(login.body.get("token").is_none());
    let cookie = login.cookie.unwrap();
    assert!(cookie.starts_with("toloni_session="));

    let session = app.get("/api/auth/session", Some(&cookie)).await;
    assert_eq!(session.body["authenticated"], true);
    assert_eq!(session.body["user"]["name"], "Ana");

    let logout = app.post("/api/auth/logout", json!({}), Some(&cookie)).await;
    assert_eq!(logout.status, StatusCode::OK);
    assert_eq!(logout.cookie.as_deref(), Some("toloni_session="));

    let session = app.get("/api/auth/session", Some(&cookie)).await;
    assert_eq!(session.body["authenticated"], false);
}

#[tokio::test]
async fn bad_password_and_unknown_email_answer_the_same() {
    let app = app();
    app.verified_session("ana@gmail.com").await;
    let wrong = app.login("ana@gmail.com", "Errada1234").await;
    let unknown = app.login("ninguem@gmail.com", PASSWORD).await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status, unknown.status);
    assert_eq!(wrong.body, unknown.body);
}

#[tokio::test]
async fn rotating_forwarded_ips_does_not_reset_the_login_limit() {
    let app = app();
    let max = app.state.config.login_max_attempts as usize;
    let mut statuses = Vec::new();
    for i in 0..30 {
        let req = Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-real-ip", format!("10.0.0.{i}"))
            .header("x-forwarded-for", format!("10.1.0.{i}"))
            .body(Body::from(
                json!({ "email": "ana@gmail.com", "password": "Errada1234" }).to_string(),
            ))
            .unwrap();
        statuses.push(app.send(req).await.status);
    }
    let unauthorized = statuses.iter().filter(|s| **s == StatusCode::UNAUTHORIZED).count();
    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(unauthorized, max);
    assert_eq!(limited, 30 - max);
}

#[tokio::test]
async fn forgot_password_is_uniform_and_reset_logs_out_everywhere() {
    let app = app();
    let cookie = app.verified_session("ana@gmail.com").await;

    let known = app
        .post("/api/auth/forgot-password", json!({ "email": "ana@gmail.com" }), None)
        .await;
    let unknown = app
        .post("/api/auth/forgot-password", json!({ "email": "x@gmail.com" }), None)
        .await;
    assert_eq!(known.status, StatusCode::OK);
    assert_eq!(known.body, unknown.body);

    let mail = app.mailer.wait_for("ana@gmail.com", 2).await.unwrap();
    let token = token_from_link(&mail.text).unwrap();
    let reset = app
        .post(
            "/api/auth/reset-password",
            json!({ "token": token, "newPassword": "NovaSenha99" }),
            None,
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK);

    let session = app.get("/api/auth/session", Some(&cookie)).await;
    assert_eq!(session.body["authenticated"], false);

    let reuse = app
        .post(
            "/api/auth/reset-password",
            json!({ "token": token, "newPassword": "OutraSenha77" }),
            None,
        )
        .await;
    assert_eq!(reuse.status, StatusCode::BAD_REQUEST);
    assert_eq!(reuse.body["error"], "invalid_or_expired_token");
}

#[tokio::test]
async fn resend_verification_never_reveals_accounts() {
    let app = app();
    app.register("Ana", "ana@gmail.com").await;
    let pending = app
        .post("/api/auth/resend-verification", json!({ "email": "ana@gmail.com" }), None)
        .await;
    let unknown = app
        .post("/api/auth/resend-verification", json!({ "email": "x@gmail.com" }), None)
        .await;
    assert_eq!(pending.status, StatusCode::OK);
    assert_eq!(pending.body, unknown.body);
    assert_eq!(app.mailer.sent().len(), 2);
}

#[tokio::test]
async fn admin_trophy_endpoints_are_guarded() {
    let app = app();
    let anonymous = app.get("/api/admin/trophies?action=current", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["redirect"], "/login");

    let user = app.verified_session("ana@gmail.com").await;
    let forbidden = app.get("/api/admin/trophies?action=current", Some(&user)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_ranks_and_resets_trophies() {
    let app = app();
    app.reports.upsert(report(1, Some(5.0), 2)).await;
    app.reports.upsert(report(2, Some(5.0), 5)).await;
    app.reports.upsert(report(3, None, 100)).await;
    app.reports.upsert(report(4, Some(8.0), 0)).await;
    let admin = app.admin_session().await;

    let update = app
        .post("/api/admin/trophies?action=update-ranking", json!({}), Some(&admin))
        .await;
    assert_eq!(update.status, StatusCode::OK);
    assert_eq!(update.body["updated_entries"], 4);

    let current = app.get("/api/admin/trophies?action=current", Some(&admin)).await;
    assert_eq!(current.body["month"], "2024-09");
    assert_eq!(report_ids(&current.body["trophies"]), vec![4, 2, 1, 3]);

    let wrong_method = app.get("/api/admin/trophies?action=update-ranking", Some(&admin)).await;
    assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
    let unknown = app.get("/api/admin/trophies?action=explode", Some(&admin)).await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

    let taken = app
        .post(
            "/api/admin/trophies?action=add",
            json!({ "position": 1, "fishermanName": "Seu Zé", "fishType": "Pintado" }),
            Some(&admin),
        )
        .await;
    assert_eq!(taken.status, StatusCode::CONFLICT);
    let added = app
        .post(
            "/api/admin/trophies?action=add",
            json!({ "position": 7, "fishermanName": "Seu Zé", "fishType": "Pintado", "weight": 11.0 }),
            Some(&admin),
        )
        .await;
    assert_eq!(added.status, StatusCode::CREATED);
    assert_eq!(added.body["trophy"]["manual"], true);

    let reset = app
        .post("/api/admin/trophies?action=reset-monthly", json!({}), Some(&admin))
        .await;
    assert_eq!(reset.status, StatusCode::OK);
    assert_eq!(reset.body["archived_month"], "2024-08");
    assert_eq!(reset.body["new_count"], 5);

    let audit = app.get("/api/admin/trophies?action=audit&limit=1", Some(&admin)).await;
    assert_eq!(audit.body["entries"][0]["action"], "monthly_reset_manual");
    assert_eq!(audit.body["entries"][0]["actor"], ADMIN);
}

#[tokio::test]
async fn webhook_requires_secret_and_updates_ranking() {
    let app = app();
    let rejected = app
        .post("/api/webhooks/reports", json!({ "action": "create", "report_id": 1 }), None)
        .await;
    assert_eq!(rejected.status, StatusCode::FORBIDDEN);

    app.reports.upsert(report(1, Some(3.2), 0)).await;
    let req = Request::post("/api/webhooks/reports")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .body(Body::from(
            json!({
                "action": "create",
                "report_id": 1,
                "is_public": true,
                "fish_species": "Tucunaré",
                "created_at": "2024-09-02T07:00:00Z"
            })
            .to_string(),
        ))
        .unwrap();
    let accepted = app.send(req).await;
    assert_eq!(accepted.status, StatusCode::ACCEPTED);
    assert_eq!(accepted.body["queued"], true);

    let mut ranked = Vec::new();
    for _ in 0..200 {
        ranked = app.state.trophies.current().await.unwrap();
        if !ranked.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].report_id, Some(1));

    let public = app.get("/api/trophies", None).await;
    assert_eq!(report_ids(&public.body["trophies"]), vec![1]);
}

#[tokio::test]
async fn malformed_input_and_unknown_routes_get_json_errors() {
    let app = app();
    let req = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = app.send(req).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["error"], "invalid_input");

    let missing = app.get("/api/nowhere", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["error"], "not_found");

    let health = app.get("/api/health", None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["status"], "ok");
}

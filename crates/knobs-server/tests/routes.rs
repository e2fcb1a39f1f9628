//! End-to-end tests driving the router in-process.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use knobs_core::auth::{AuthGate, Credentials, SessionGate, SessionGateConfig};
use knobs_core::block::{Registry, SettingsBlock};
use knobs_core::field::Field;
use knobs_core::prefs::Preferences;
use knobs_core::value::Value;
use knobs_server::routes;
use knobs_server::schema::Schema;
use knobs_server::state::AppState;
use knobs_storage::{MemoryBackend, StorageBackend, StorageError};

const PASSWORD: &str = "secret";

struct Harness {
    app: Router,
    storage: Arc<dyn StorageBackend>,
}

async fn harness(gate_config: SessionGateConfig) -> Harness {
    harness_with(gate_config, Arc::new(MemoryBackend::new())).await
}

async fn harness_with(gate_config: SessionGateConfig, storage: Arc<dyn StorageBackend>) -> Harness {
    let gate = Arc::new(SessionGate::new(gate_config));
    let gate_dyn: Arc<dyn AuthGate> = Arc::clone(&gate) as Arc<dyn AuthGate>;

    let mut blocks: Vec<Arc<SettingsBlock>> = Schema::builtin()
        .unwrap()
        .build_blocks(&storage, &gate_dyn, Some(PASSWORD))
        .unwrap()
        .into_iter()
        .map(Arc::new)
        .collect();

    let strict = SettingsBlock::builder("strict", "/strict")
        .field(Field::integer("level", "Level", 1))
        .unwrap()
        .password(Some(PASSWORD.to_owned()))
        .gate(Arc::clone(&gate_dyn))
        .sanity_check(|r: &mut Registry| r.value("level").and_then(Value::as_i32).is_some_and(|l| l < 10))
        .build(Arc::clone(&storage))
        .unwrap();
    blocks.push(Arc::new(strict));

    for block in &blocks {
        block.load().await;
    }

    let state = Arc::new(AppState {
        blocks,
        gate,
        name: "test rig".to_owned(),
    });
    Harness {
        app: routes::app(state),
        storage,
    }
}

fn login_config() -> SessionGateConfig {
    SessionGateConfig {
        enabled: true,
        credentials: Some(Credentials {
            user: "admin".to_owned(),
            password: "hunter2".to_owned(),
        }),
        ..SessionGateConfig::default()
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    request
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn landing_page_shows_every_block_form() {
    let h = harness(SessionGateConfig::default()).await;
    let response = h.app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let body = body_text(response).await;
    assert!(body.contains("<a href='/hydro'>Hydroponics</a>"), "{body}");
    assert!(body.contains("<a href='/light'>Light</a>"), "{body}");
    assert!(body.contains("<h3>Hydroponics</h3>"), "{body}");
    assert!(body.contains("action='/hydro/update'"), "{body}");
    assert!(body.contains("action='/light/update'"), "{body}");
    assert!(body.contains("name='lvl_1' value='60'"), "{body}");
    assert!(!body.contains("Logout"));
}

#[tokio::test]
async fn settings_page_renders_form_with_password() {
    let h = harness(SessionGateConfig::default()).await;
    let response = h.app.oneshot(get("/light")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("<form method='POST' action='/light/update'>"));
    assert!(body.contains("name='lvl_0' value='20'"));
    assert!(body.contains("name='lvl_2' value='100'"));
    assert!(body.contains("<input type='password' name='pw'>"));
}

#[tokio::test]
async fn wrong_password_is_401_and_stores_nothing() {
    let h = harness(SessionGateConfig::default()).await;
    let response = h
        .app
        .oneshot(form_post("/light/update", "dayLength=20&pw=nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(response).await.contains("Wrong password"));
    assert!(h.storage.keys("light").await.unwrap().is_empty());
}

#[tokio::test]
async fn successful_update_redirects_home_and_persists() {
    let h = harness(SessionGateConfig::default()).await;
    let response = h
        .app
        .clone()
        .oneshot(form_post(
            "/hydro/update",
            "pumpA_relVol=2.5&mlPerDeltaEC=4&targetEC=1.45&pw=secret",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let prefs = Preferences::open(Arc::clone(&h.storage), "hydro");
    assert!((prefs.get_float("targetEC", 0.0).await - 1.45).abs() < 1e-6);
    // unchecked box submits nothing
    assert!(!prefs.get_bool("dryRun", true).await);

    let page = body_text(h.app.oneshot(get("/hydro")).await.unwrap()).await;
    assert!(page.contains("name='targetEC' value='1.45'"), "{page}");
}

#[tokio::test]
async fn out_of_range_values_are_clamped() {
    let h = harness(SessionGateConfig::default()).await;
    let response = h
        .app
        .oneshot(form_post("/light/update", "dayLength=99&lvl_1=250&pw=secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let prefs = Preferences::open(Arc::clone(&h.storage), "light");
    assert_eq!(prefs.get_int("dayLength", 0).await, 24);
    assert_eq!(prefs.get_int("lvl_1", 0).await, 100);
}

#[tokio::test]
async fn sanity_failure_is_422_and_flags_page() {
    let h = harness(SessionGateConfig::default()).await;
    let response = h
        .app
        .clone()
        .oneshot(form_post("/strict/update", "level=12&pw=secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(h.storage.keys("strict").await.unwrap().is_empty());

    let page = body_text(h.app.oneshot(get("/strict")).await.unwrap()).await;
    assert!(page.contains("not stored"), "{page}");
    assert!(page.contains("name='level' value='12'"));
}

struct BrokenBackend;

#[async_trait::async_trait]
impl StorageBackend for BrokenBackend {
    async fn get(&self, _: &str, _: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(None)
    }

    async fn put(&self, namespace: &str, key: &str, _: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Write {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
            reason: "disk full".to_owned(),
        })
    }

    async fn remove(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn keys(&self, _: &str) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn save_failure_is_500() {
    let h = harness_with(SessionGateConfig::default(), Arc::new(BrokenBackend)).await;
    let response = h
        .app
        .oneshot(form_post("/light/update", "dayLength=12&pw=secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("disk full"));
}

#[tokio::test]
async fn unknown_path_is_404() {
    let h = harness(SessionGateConfig::default()).await;
    let response = h.app.oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pages_and_writes_need_login_when_enabled() {
    let h = harness(login_config()).await;

    let response = h.app.clone().oneshot(get("/hydro")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login?next=%2Fhydro");

    let response = h
        .app
        .clone()
        .oneshot(form_post("/hydro/update", "targetEC=3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login?next=%2Fhydro%2Fupdate");
    assert!(h.storage.keys("hydro").await.unwrap().is_empty());

    let response = h.app.oneshot(get("/login?next=/hydro")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("name='next' value='/hydro'"));
}

#[tokio::test]
async fn login_session_and_logout() {
    let h = harness(login_config()).await;

    let response = h
        .app
        .clone()
        .oneshot(form_post("/login", "u=admin&p=hunter2&next=%2Fhydro"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/hydro");
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_owned();
    assert!(set_cookie.contains("HttpOnly; SameSite=Lax; Path=/"));
    let cookie = set_cookie.split(';').next().unwrap().to_owned();

    let page = h.app.clone().oneshot(with_cookie(get("/hydro"), &cookie)).await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let page = body_text(page).await;
    assert!(!page.contains("name='pw'"), "gate replaces the password field");

    let response = h
        .app
        .clone()
        .oneshot(with_cookie(form_post("/hydro/update", "targetEC=3&dryRun=1"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let prefs = Preferences::open(Arc::clone(&h.storage), "hydro");
    assert!((prefs.get_float("targetEC", 0.0).await - 3.0).abs() < 1e-6);

    // already logged in: /login bounces straight to next
    let response = h
        .app
        .clone()
        .oneshot(with_cookie(get("/login?next=/light"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/light");

    let response = h.app.clone().oneshot(get("/logout")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
    assert!(response.headers()[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));

    let response = h.app.oneshot(with_cookie(get("/hydro"), &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn quoted_cookie_is_accepted() {
    let h = harness(login_config()).await;
    let response = h
        .app
        .clone()
        .oneshot(form_post("/login", "u=admin&p=hunter2"))
        .await
        .unwrap();
    assert_eq!(location(&response), "/");
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_owned();
    let token = set_cookie
        .split(';')
        .next()
        .and_then(|c| c.strip_prefix("KNOBS_SESSION="))
        .unwrap()
        .to_owned();

    let quoted = format!("other=1; KNOBS_SESSION=\"{token}\"");
    let response = h.app.oneshot(with_cookie(get("/"), &quoted)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Logout"));
}

#[tokio::test]
async fn failed_login_is_401_and_not_cached() {
    let h = harness(login_config()).await;
    let response = h
        .app
        .oneshot(form_post("/login", "u=admin&p=wrong&next=%2Fhydro"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn post_only_lockdown_keeps_pages_public() {
    let h = harness(SessionGateConfig {
        post_only_lockdown: true,
        ..login_config()
    })
    .await;

    let response = h.app.clone().oneshot(get("/light")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .oneshot(form_post("/light/update", "dayLength=5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
}

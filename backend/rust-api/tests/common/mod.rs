#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use medquiz_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    services::AppState,
    store::MemoryContentStore,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: MemoryContentStore,
    pub state: Arc<AppState>,
    pub admin_token: String,
    pub student_token: String,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::default())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = MemoryContentStore::new();
    let admin_token = token(&config, "admin-1", "admin");
    let student_token = token(&config, "student-1", "student");
    let state = Arc::new(AppState::with_store(config, Arc::new(store.clone())));

    TestApp {
        router: create_router(state.clone()),
        store,
        state,
        admin_token,
        student_token,
    }
}

pub fn token(config: &Config, sub: &str, role: &str) -> String {
    let now = chrono::Utc::now().timestamp() as usize;
    JwtService::new(&config.jwt_secret)
        .generate_token(JwtClaims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: now + 3600,
            iat: now,
        })
        .unwrap()
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, Some(&self.admin_token), body).await
    }

    pub async fn public(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, None, body).await
    }

    pub async fn create(&self, kind: &str, body: Value) -> Value {
        let (status, json) = self.admin("POST", &format!("/admin/{}", kind), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "create {} failed: {}", kind, json);
        json
    }

    /// Y1 > M1 > {S1 > {L1, L2}, S2 > L3}, Y2 > M2 > S3 > L4
    pub async fn seed_hierarchy(&self) {
        self.create("years", json!({"id": "Y1", "name": "Year 1", "icon": "1"}))
            .await;
        self.create("years", json!({"id": "Y2", "name": "Year 2", "icon": "2"}))
            .await;
        self.create("modules", json!({"id": "M1", "yearId": "Y1", "name": "Cardiology"}))
            .await;
        self.create("modules", json!({"id": "M2", "yearId": "Y2", "name": "Neurology"}))
            .await;
        self.create("subjects", json!({"id": "S1", "moduleId": "M1", "name": "Anatomy"}))
            .await;
        self.create("subjects", json!({"id": "S2", "moduleId": "M1", "name": "Physiology"}))
            .await;
        self.create("subjects", json!({"id": "S3", "moduleId": "M2", "name": "Pathology"}))
            .await;
        for (lecture, subject) in [("L1", "S1"), ("L2", "S1"), ("L3", "S2"), ("L4", "S3")] {
            self.create("lectures", lecture_body(lecture, Some(subject)))
                .await;
        }
    }
}

pub fn question(id: &str) -> Value {
    json!({
        "id": id,
        "text": "Which chamber pumps blood into the aorta?",
        "options": ["Left ventricle", "Right atrium", "Right ventricle"],
        "correctAnswer": 0
    })
}

pub fn lecture_body(id: &str, subject_id: Option<&str>) -> Value {
    json!({
        "id": id,
        "subjectId": subject_id,
        "title": format!("Lecture {}", id),
        "questions": [question("q1"), question("q2")]
    })
}

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn missing_name_names_the_field() {
    let app = common::create_test_app();

    let (status, body) = app
        .admin("POST", "/admin/years", Some(json!({"id": "Y1", "name": "  "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
    assert_eq!(body["code"], "MissingField");
    assert_eq!(body["field"], "name");
    assert_eq!(body["id"], "Y1");
    assert_eq!(app.store.counts().await, (0, 0, 0, 0));
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let app = common::create_test_app();

    for id in ["", "has space", "../up", "-leading"] {
        let (status, body) = app
            .admin("POST", "/admin/years", Some(json!({"id": id, "name": "Year"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "id {:?}", id);
        assert_eq!(body["field"], "id");
    }
}

#[tokio::test]
async fn overlong_name_is_rejected_before_the_store() {
    let app = common::create_test_app();

    let (status, body) = app
        .admin(
            "POST",
            "/admin/years",
            Some(json!({"id": "Y1", "name": "x".repeat(201)})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "name");
}

#[tokio::test]
async fn unknown_parent_is_a_reference_error() {
    let app = common::create_test_app();

    let (status, body) = app
        .admin(
            "POST",
            "/admin/modules",
            Some(json!({"id": "M1", "yearId": "Y404", "name": "Cardiology"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "ReferenceError");
    assert_eq!(body["field"], "yearId");
    assert_eq!(body["id"], "Y404");
}

#[tokio::test]
async fn module_without_year_is_missing_a_field() {
    let app = common::create_test_app();

    let (status, body) = app
        .admin("POST", "/admin/modules", Some(json!({"id": "M1", "name": "Cardiology"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "yearId");
}

#[tokio::test]
async fn moving_a_subject_to_a_missing_module_is_refused() {
    let app = common::create_test_app();
    app.seed_hierarchy().await;

    let (status, _) = app
        .admin("PUT", "/admin/subjects/S1", Some(json!({"moduleId": "M404"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, subject) = app.admin("GET", "/admin/subjects/S1", None).await;
    assert_eq!(subject["moduleId"], "M1");
}

#[tokio::test]
async fn duplicate_id_is_a_conflict() {
    let app = common::create_test_app();
    app.create("years", json!({"id": "Y1", "name": "Year 1"})).await;

    let (status, body) = app
        .admin("POST", "/admin/years", Some(json!({"id": "Y1", "name": "Again"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "ConflictError");
    assert_eq!(body["id"], "Y1");
}

#[tokio::test]
async fn question_rules() {
    let app = common::create_test_app();
    app.create("lectures", json!({"id": "L1", "title": "Lecture", "questions": []}))
        .await;

    let bad: [(Value, &str); 4] = [
        (
            json!({"id": "q1", "text": "Pick", "options": ["A", "A"], "correctAnswer": 0}),
            "options",
        ),
        (
            json!({"id": "q1", "text": "Pick", "options": ["A", "B"], "correctAnswer": 2}),
            "correctAnswer",
        ),
        (
            json!({"id": "q1", "text": "Pick", "options": ["A"], "correctAnswer": 0}),
            "options",
        ),
        (
            json!({"id": "q1", "text": "Pick", "options": ["A", "B"], "correctAnswer": "1"}),
            "correctAnswer",
        ),
    ];
    for (question, field) in bad {
        let (status, body) = app
            .admin("POST", "/admin/lectures/L1/questions", Some(question))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidQuestion");
        assert_eq!(body["field"], field);
        assert_eq!(body["id"], "q1");
    }

    let (status, lecture) = app
        .admin(
            "POST",
            "/admin/lectures/L1/questions",
            Some(json!({"id": "q1", "text": "Pick", "options": ["A", "B"], "correctAnswer": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lecture["questions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn question_ids_are_unique_within_a_lecture() {
    let app = common::create_test_app();
    app.create("lectures", common::lecture_body("L1", None)).await;

    let (status, body) = app
        .admin("POST", "/admin/lectures/L1/questions", Some(common::question("q1")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["id"], "q1");

    let (status, _) = app
        .admin(
            "POST",
            "/admin/lectures",
            Some(json!({
                "id": "L2",
                "title": "Twice",
                "questions": [common::question("q1"), common::question("q1")]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn removing_questions() {
    let app = common::create_test_app();
    app.create("lectures", common::lecture_body("L1", None)).await;

    let (status, lecture) = app
        .admin("DELETE", "/admin/lectures/L1/questions/q1", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lecture["questions"][0]["id"], "q2");

    let (status, _) = app
        .admin("DELETE", "/admin/lectures/L1/questions/q1", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_json_gets_a_structured_error() {
    let app = common::create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/years")
                .header("authorization", format!("Bearer {}", app.admin_token))
                .header("content-type", "application/json")
                .body(Body::from("{\"id\": "))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "InvalidJson");
    assert_eq!(body["retryable"], false);
}

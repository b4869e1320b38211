use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

fn contains_key(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => map.contains_key(key) || map.values().any(|v| contains_key(v, key)),
        Value::Array(items) => items.iter().any(|v| contains_key(v, key)),
        _ => false,
    }
}

#[tokio::test]
async fn quiz_lecture_never_exposes_correct_answers() {
    let app = common::create_test_app();
    app.seed_hierarchy().await;
    app.create("lectures", common::lecture_body("L5", None)).await;

    for id in ["L1", "L2", "L3", "L4", "L5"] {
        let uri = format!("/api/v1/lectures/{}", id);

        let (status, anonymous) = app.public("GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(anonymous["questions"].as_array().unwrap().len(), 2);
        assert!(!contains_key(&anonymous, "correctAnswer"), "{} leaked answers", id);

        // Even an admin token does not turn the quiz route into the editing view
        let (_, as_admin) = app.admin("GET", &uri, None).await;
        assert!(!contains_key(&as_admin, "correctAnswer"));
    }
}

#[tokio::test]
async fn admin_lecture_view_keeps_correct_answers() {
    let app = common::create_test_app();
    app.seed_hierarchy().await;

    let (status, lecture) = app.admin("GET", "/admin/lectures/L1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lecture["questions"][0]["correctAnswer"], 0);
}

#[tokio::test]
async fn hierarchy_counts_lectures_without_bodies() {
    let app = common::create_test_app();
    app.seed_hierarchy().await;

    let (status, tree) = app.public("GET", "/api/v1/hierarchy", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!contains_key(&tree, "questions"));

    assert_eq!(
        tree,
        json!([
            {
                "id": "Y1", "name": "Year 1", "icon": "1",
                "modules": [{
                    "id": "M1", "name": "Cardiology",
                    "subjects": [
                        {"id": "S1", "name": "Anatomy", "lectureCount": 2},
                        {"id": "S2", "name": "Physiology", "lectureCount": 1}
                    ]
                }]
            },
            {
                "id": "Y2", "name": "Year 2", "icon": "2",
                "modules": [{
                    "id": "M2", "name": "Neurology",
                    "subjects": [{"id": "S3", "name": "Pathology", "lectureCount": 1}]
                }]
            }
        ])
    );
}

#[tokio::test]
async fn hierarchy_is_stable_between_reads() {
    let app = common::create_test_app();
    app.seed_hierarchy().await;

    let (_, first) = app.public("GET", "/api/v1/hierarchy", None).await;
    let (_, second) = app.public("GET", "/api/v1/hierarchy", None).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn subject_lectures_are_summaries() {
    let app = common::create_test_app();
    app.seed_hierarchy().await;

    let (status, lectures) = app.public("GET", "/api/v1/subjects/S1/lectures", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        lectures,
        json!([
            {"id": "L1", "title": "Lecture L1", "questionCount": 2},
            {"id": "L2", "title": "Lecture L2", "questionCount": 2}
        ])
    );
}

#[tokio::test]
async fn unknown_lecture_is_not_found() {
    let app = common::create_test_app();

    let (status, body) = app.public("GET", "/api/v1/lectures/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFoundError");
}

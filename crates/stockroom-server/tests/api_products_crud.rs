use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use stockroom_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use stockroom_server::hub::Hub;
use stockroom_server::{app, AppState};
use stockroom_types::Event;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn setup_app() -> (Router, DbPool, Hub) {
    let pool = create_pool(
        ":memory:",
        DbRuntimeSettings {
            pool_max_size: 1,
            ..DbRuntimeSettings::default()
        },
    )
    .unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }

    let hub = Hub::default();
    let state = AppState::new(pool.clone(), hub.clone(), vec![TOKEN.to_string()]);
    (app(state), pool, hub)
}

/// Same router over a file database with the default pool size.
fn setup_file_app() -> (Router, Hub, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stockroom.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();

    let hub = Hub::default();
    let state = AppState::new(pool, hub.clone(), vec![TOKEN.to_string()]);
    (app(state), hub, dir)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Authorization", format!("Bearer {}", TOKEN));
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_widget(app: &Router) -> i64 {
    let (status, body) = call(
        app,
        "POST",
        "/api/products",
        Some(json!({"name": "Widget", "price": 10.0, "stock": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _pool, _hub) = setup_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let (app, _pool, _hub) = setup_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/products").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/products")
                .header("Authorization", "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Query tokens are only honoured on the WebSocket route.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/products?token={}", TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_fetch_product() {
    let (app, _pool, hub) = setup_app();
    let (tx, mut rx) = hub.outbound_queue();
    hub.register(tx).await.unwrap();

    let id = create_widget(&app).await;

    let announced: Event = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(announced.data.id, id);
    assert_eq!(announced.data.name, "Widget");

    let (status, body) = call(&app, "GET", &format!("/api/products/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Widget");
    assert_eq!(body["stock"], 5);
    assert_eq!(body["categories"], json!([]));

    let (status, body) = call(&app, "GET", "/api/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_name_is_conflict_and_not_announced() {
    let (app, _pool, hub) = setup_app();
    create_widget(&app).await;

    let (tx, mut rx) = hub.outbound_queue();
    hub.register(tx).await.unwrap();

    let (status, body) = call(
        &app,
        "POST",
        "/api/products",
        Some(json!({"name": "Widget", "price": 1.0, "stock": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Widget"));
    assert!(rx.try_recv().is_err());

    let (_, body) = call(&app, "GET", "/api/products", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_update_archives_previous_state() {
    let (app, _pool, _hub) = setup_app();
    let id = create_widget(&app).await;

    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/products/{}", id),
        Some(json!({"price": 12.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 12.0);
    assert_eq!(body["stock"], 5);
    assert_eq!(body["name"], "Widget");

    // PUT behaves as a partial update too.
    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/products/{}", id),
        Some(json!({"stock": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 12.0);
    assert_eq!(body["stock"], 7);

    let (status, body) = call(&app, "GET", &format!("/api/products/{}/history", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let history = body.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["price"], 10.0);
    assert_eq!(history[0]["stock"], 5);
    assert_eq!(history[1]["price"], 12.0);
    assert_eq!(history[1]["stock"], 5);
}

#[tokio::test]
async fn test_category_links_keep_only_known_ids() {
    let (app, _pool, _hub) = setup_app();
    let (status, body) = call(&app, "POST", "/api/categories", Some(json!({"name": "Tools"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let tools = body["id"].as_i64().unwrap();
    let id = create_widget(&app).await;

    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/products/{}", id),
        Some(json!({"categories": [tools, 999]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"], json!([tools]));

    let (_, body) = call(&app, "GET", &format!("/api/categories/{}", tools), None).await;
    assert_eq!(body["products"], json!([id]));

    let (_, body) = call(
        &app,
        "PATCH",
        &format!("/api/products/{}", id),
        Some(json!({"categories": []})),
    )
    .await;
    assert_eq!(body["categories"], json!([]));
}

#[tokio::test]
async fn test_history_range_validation() {
    let (app, _pool, _hub) = setup_app();
    let id = create_widget(&app).await;

    let (status, _) = call(
        &app,
        "GET",
        &format!("/api/products/{}/history?start=2024-03-05&end=2024-03-01", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "GET",
        &format!("/api/products/{}/history?start=March", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/products/4040/history", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/products/{}/history?start=2024-01-01&end=2024-01-01", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_bad_input_is_bad_request() {
    let (app, _pool, _hub) = setup_app();
    let id = create_widget(&app).await;

    let (status, body) = call(&app, "GET", "/api/products/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/products/{}", id),
        Some(json!({"price": -1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/api/products",
        Some(json!({"name": "No price"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "PATCH",
        "/api/products/777",
        Some(json!({"price": 1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_product_then_history_survives() {
    let (app, _pool, hub) = setup_app();
    let id = create_widget(&app).await;
    call(
        &app,
        "PATCH",
        &format!("/api/products/{}", id),
        Some(json!({"stock": 0})),
    )
    .await;

    let (tx, mut rx) = hub.outbound_queue();
    hub.register(tx).await.unwrap();

    let (status, _) = call(&app, "DELETE", &format!("/api/products/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let announced: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(announced, json!({"type": "product_deleted", "data": {"id": id, "name": "Widget"}}));

    let (status, _) = call(&app, "GET", &format!("/api/products/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "DELETE", &format!("/api/products/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "GET", &format!("/api/products/{}/history", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_category_crud() {
    let (app, _pool, hub) = setup_app();
    let (tx, mut rx) = hub.outbound_queue();
    hub.register(tx).await.unwrap();

    let (status, body) = call(
        &app,
        "POST",
        "/api/categories",
        Some(json!({"name": "Garden", "description": "Outdoor"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_i64().unwrap();
    let created: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(created["type"], "category_created");

    let (status, _) = call(&app, "POST", "/api/categories", Some(json!({"name": "Garden"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/categories/{}", id),
        Some(json!({"name": "Yard"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Yard");
    assert_eq!(body["description"], "Outdoor");
    let updated: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(updated, json!({"type": "category_updated", "data": {"id": id, "name": "Yard"}}));

    let (status, body) = call(&app, "GET", "/api/categories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = call(&app, "DELETE", &format!("/api/categories/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let deleted: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(deleted["type"], "category_deleted");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_patches_on_file_database() {
    let (app, hub, _db) = setup_file_app();
    let (tx, mut rx) = hub.outbound_queue();
    hub.register(tx).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..8 {
        let (status, body) = call(
            &app,
            "POST",
            "/api/products",
            Some(json!({"name": format!("bin-{i}"), "price": 1.0, "stock": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["id"].as_i64().unwrap());
    }

    let mut tasks = Vec::new();
    for &id in &ids {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            let mut statuses = Vec::new();
            for stock in 1..=10 {
                let (status, _) = call(
                    &app,
                    "PATCH",
                    &format!("/api/products/{}", id),
                    Some(json!({"stock": stock})),
                )
                .await;
                statuses.push(status);
            }
            statuses
        }));
    }
    for task in tasks {
        let statuses = task.await.unwrap();
        assert!(statuses.iter().all(|s| *s == StatusCode::OK), "{:?}", statuses);
    }

    for id in ids {
        let (_, body) = call(&app, "GET", &format!("/api/products/{}/history", id), None).await;
        assert_eq!(body.as_array().unwrap().len(), 10);
    }
    let mut announced = 0;
    while rx.try_recv().is_ok() {
        announced += 1;
    }
    assert_eq!(announced, 8 + 8 * 10);
}

#[tokio::test]
async fn test_search_products_and_categories() {
    let (app, _hub, _db) = setup_file_app();
    for (name, price) in [("Blue Widget", 3.0), ("Red widget", 1.0), ("Gadget", 2.0)] {
        let (status, _) = call(
            &app,
            "POST",
            "/api/products",
            Some(json!({"name": name, "price": price, "stock": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    for name in ["Tools", "Toys", "Garden"] {
        call(&app, "POST", "/api/categories", Some(json!({"name": name}))).await;
    }

    let (status, body) = call(
        &app,
        "GET",
        "/api/search?type=product&name=widget&sort=price_asc",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Red widget", "Blue Widget"]);
    assert!(body[0]["price"].is_number());

    let (status, body) = call(&app, "GET", "/api/search?type=product&page=2&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "Gadget");

    let (status, body) = call(&app, "GET", "/api/search?type=category&name=to&sort=name_asc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Tools");
    assert_eq!(body[1]["name"], "Toys");
    assert_eq!(body[0]["products"], json!([]));
}

#[tokio::test]
async fn test_search_rejects_bad_parameters() {
    let (app, _pool, _hub) = setup_app();

    for uri in [
        "/api/search",
        "/api/search?type=order",
        "/api/search?type=product&sort=cheapest",
        "/api/search?type=category&sort=price_desc",
        "/api/search?type=product&page=two",
    ] {
        let (status, body) = call(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/search?type=product")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

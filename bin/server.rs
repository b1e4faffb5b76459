// Kennel - Web Server
// HTML pages plus the JSON dog API over the SQLite store

use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kennel::{
    count_dogs, find_dog_by_name, get_all_dogs, save_dog, setup_database, CreateDogInput, Dog,
};

/// Shared application state
///
/// `tracked` is the most recently created or searched dog. The original
/// design kept this as an unsynchronized process-wide mutable; here it is an
/// explicit lock owned by the state so concurrent requests see a consistent
/// value.
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    tracked: Arc<RwLock<Dog>>,
}

impl AppState {
    fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            tracked: Arc::new(RwLock::new(Dog::placeholder())),
        }
    }
}

/// Handler errors: missing input maps to 400 with a static message, any store
/// failure maps to 500 echoing the error
#[derive(Error, Debug)]
enum AppError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("{0}")]
    Store(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            AppError::Store(e) => {
                error!("store error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "err": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Deserialize)]
struct NameQuery {
    name: Option<String>,
}

// ============================================================================
// Page Rendering
// ============================================================================

/// Fill {{key}} placeholders in an embedded template
fn render(template: &str, vars: &[(&str, &str)]) -> Html<String> {
    let mut page = template.to_string();
    for (key, value) in vars {
        page = page.replace(&format!("{{{{{key}}}}}"), value);
    }

    Html(page)
}

fn dog_rows(dogs: &[Dog]) -> String {
    if dogs.is_empty() {
        return "<li>No dogs have been added yet</li>".to_string();
    }

    dogs.iter()
        .map(|dog| {
            format!(
                "<li>Name: {}, Breed: {}, Age: {}</li>",
                dog.name, dog.breed, dog.age
            )
        })
        .collect()
}

// ============================================================================
// Page Handlers
// ============================================================================

/// GET / - home page with the current tracked name
async fn host_index(State(state): State<AppState>) -> Html<String> {
    let current_name = state.tracked.read().unwrap().name.clone();

    render(
        include_str!("../web/index.html"),
        &[("current_name", &current_name)],
    )
}

/// GET /page1 - full dog listing
async fn host_page1(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let dogs = {
        let conn = state.db.lock().unwrap();
        get_all_dogs(&conn)?
    };

    Ok(render(
        include_str!("../web/page1.html"),
        &[("dogs", &dog_rows(&dogs))],
    ))
}

/// GET /page2 - static page
async fn host_page2() -> Html<&'static str> {
    Html(include_str!("../web/page2.html"))
}

/// GET /page3 - static page
async fn host_page3() -> Html<&'static str> {
    Html(include_str!("../web/page3.html"))
}

/// GET /page4 - full dog listing
async fn host_page4(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let dogs = {
        let conn = state.db.lock().unwrap();
        get_all_dogs(&conn)?
    };

    Ok(render(
        include_str!("../web/page4.html"),
        &[("dogs", &dog_rows(&dogs))],
    ))
}

/// Fallback - 404 page showing the requested path
async fn not_found(uri: Uri) -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        render(include_str!("../web/notfound.html"), &[("page", uri.path())]),
    )
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /name - name of the tracked dog
async fn get_name(State(state): State<AppState>) -> Json<serde_json::Value> {
    let name = state.tracked.read().unwrap().name.clone();

    Json(json!({ "name": name }))
}

/// GET /dog/name - look a dog up by name, returning the raw record (or null)
async fn read_dog(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<Option<Dog>>, AppError> {
    let name = query.name.unwrap_or_default();

    let dog = {
        let conn = state.db.lock().unwrap();
        find_dog_by_name(&conn, &name)?
    };

    Ok(Json(dog))
}

/// POST /dog - create a dog and make it the tracked record
async fn create_dog(
    State(state): State<AppState>,
    Form(input): Form<CreateDogInput>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut dog = input.validate().map_err(AppError::Validation)?.into_dog();

    {
        let conn = state.db.lock().unwrap();
        save_dog(&conn, &mut dog)?;
    }

    let body = json!({ "name": dog.name, "breed": dog.breed, "age": dog.age });
    *state.tracked.write().unwrap() = dog;

    Ok(Json(body))
}

/// POST /dog/update - increment the tracked dog's age and persist it
async fn update_searched(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut tracked = state.tracked.write().unwrap();
    tracked.age += 1;

    {
        let conn = state.db.lock().unwrap();
        save_dog(&conn, &mut tracked)?;
    }

    Ok(Json(json!({ "name": tracked.name, "age": tracked.age })))
}

/// GET /dog/search - find a dog by name and make it the tracked record
async fn search_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = query
        .name
        .filter(|name| !name.is_empty())
        .ok_or(AppError::Validation("Name is required to perform a search"))?;

    let dog = {
        let conn = state.db.lock().unwrap();
        find_dog_by_name(&conn, &name)?
    };

    match dog {
        Some(dog) => {
            let body = json!({ "name": dog.name, "age": dog.age });
            *state.tracked.write().unwrap() = dog;
            Ok(Json(body))
        }
        None => Ok(Json(json!({ "error": "No dogs found" }))),
    }
}

// ============================================================================
// Router & Configuration
// ============================================================================

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(host_index))
        .route("/page1", get(host_page1))
        .route("/page2", get(host_page2))
        .route("/page3", get(host_page3))
        .route("/page4", get(host_page4))
        .route("/name", get(get_name))
        .route("/dog", post(create_dog))
        .route("/dog/name", get(read_dog))
        .route("/dog/search", get(search_name))
        .route("/dog/update", post(update_searched))
        .nest_service("/static", ServeDir::new("web"))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

struct Config {
    port: u16,
    db_path: String,
}

impl Config {
    fn load() -> Self {
        Self {
            port: load_env("KENNEL_PORT", "3000"),
            db_path: load_env("KENNEL_DB", "kennel.db"),
        }
    }
}

fn load_env<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    std::env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load();

    let conn = Connection::open(&config.db_path).expect("Failed to open database");
    setup_database(&conn).expect("Failed to set up database");

    let count = count_dogs(&conn).expect("Failed to query database");
    info!("Database ready at {} ({count} dogs)", config.db_path);

    let state = AppState::new(conn);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("kennel-server {} running on http://localhost:{}", kennel::VERSION, config.port);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        app(AppState::new(conn))
    }

    fn get_request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn post_form(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const REX: &str = "firstname=Rex&lastname=Dog&breed=Lab&age=3";

    #[tokio::test]
    async fn test_create_returns_concatenated_name() {
        let app = test_app();

        let response = app.oneshot(post_form("/dog", REX)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body, json!({ "name": "Rex Dog", "breed": "Lab", "age": 3 }));
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post_form("/dog", "firstname=Rex&lastname=Dog&age=3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({ "error": "firstname, lastname, breed and age are all required" })
        );

        let response = app
            .oneshot(post_form("/dog", "firstname=Rex&lastname=Dog&breed=Lab&age=old"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_hits_and_misses() {
        let app = test_app();

        app.clone().oneshot(post_form("/dog", REX)).await.unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/dog/search?name=Rex%20Dog"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "name": "Rex Dog", "age": 3 })
        );

        let response = app
            .oneshot(get_request("/dog/search?name=Nobody"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "error": "No dogs found" }));
    }

    #[tokio::test]
    async fn test_search_without_name_is_rejected() {
        let app = test_app();

        let response = app.oneshot(get_request("/dog/search")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Name is required to perform a search" })
        );
    }

    #[tokio::test]
    async fn test_update_increments_age_and_persists() {
        let app = test_app();

        app.clone().oneshot(post_form("/dog", REX)).await.unwrap();

        let response = app
            .clone()
            .oneshot(post_form("/dog/update", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "name": "Rex Dog", "age": 4 })
        );

        // The increment must be visible through the store, not just in memory
        let response = app
            .oneshot(get_request("/dog/search?name=Rex%20Dog"))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({ "name": "Rex Dog", "age": 4 })
        );
    }

    #[tokio::test]
    async fn test_name_defaults_to_unknown() {
        let app = test_app();

        let response = app.oneshot(get_request("/name")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "name": "unknown" }));
    }

    #[tokio::test]
    async fn test_name_tracks_last_created_dog() {
        let app = test_app();

        app.clone().oneshot(post_form("/dog", REX)).await.unwrap();

        let response = app.oneshot(get_request("/name")).await.unwrap();
        assert_eq!(body_json(response).await, json!({ "name": "Rex Dog" }));
    }

    #[tokio::test]
    async fn test_read_dog_returns_null_without_match() {
        let app = test_app();

        let response = app.oneshot(get_request("/dog/name")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_read_dog_returns_record() {
        let app = test_app();

        app.clone().oneshot(post_form("/dog", REX)).await.unwrap();

        let response = app
            .oneshot(get_request("/dog/name?name=Rex%20Dog"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["name"], "Rex Dog");
        assert_eq!(body["breed"], "Lab");
        assert_eq!(body["age"], 3);
        assert!(body["id"].is_string());
    }

    #[tokio::test]
    async fn test_pages_render() {
        let app = test_app();

        let response = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("unknown"));

        app.clone().oneshot(post_form("/dog", REX)).await.unwrap();

        let response = app.clone().oneshot(get_request("/page1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Rex Dog"));

        let response = app.clone().oneshot(get_request("/page2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/page4")).await.unwrap();
        assert!(body_text(response).await.contains("Rex Dog"));
    }

    #[tokio::test]
    async fn test_unknown_path_renders_404() {
        let app = test_app();

        let response = app.oneshot(get_request("/no-such-page")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("/no-such-page"));
    }
}

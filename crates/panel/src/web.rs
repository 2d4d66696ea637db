use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde_json::json;
use std::env;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::commands::{self, AutomationForm, LightForm};
use crate::error::CommandError;
use crate::state::SharedStore;
use crate::view::Selection;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/greenhouses", get(api_greenhouses))
        .route("/api/greenhouses/{name}/devices", get(api_greenhouse_devices))
        .route("/api/view", get(api_view))
        .route("/api/devices/{id}", get(api_device))
        .route("/api/devices/{id}/water", post(api_water))
        .route("/api/devices/{id}/light", put(api_light))
        .route("/api/devices/{id}/automation", put(api_automation))
        .with_state(store)
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

async fn api_status(State(store): State<SharedStore>) -> impl IntoResponse {
    Json(store.to_status().await)
}

async fn api_greenhouses(State(store): State<SharedStore>) -> Response {
    let snap = store.snapshot().await;
    Json(snap.greenhouse_names()).into_response()
}

async fn api_greenhouse_devices(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
) -> Response {
    let snap = store.snapshot().await;
    Json(snap.devices_in_greenhouse(&name)).into_response()
}

async fn api_view(
    State(store): State<SharedStore>,
    Query(query): Query<Selection>,
) -> Response {
    let snap = store.snapshot().await;
    let mut selection = Selection::default();
    if let Some(name) = &query.greenhouse {
        selection.select_greenhouse(&snap, name);
    }
    if let Some(id) = &query.device {
        selection.select_device(&snap, id);
    }
    Json(selection.resolve(&snap)).into_response()
}

async fn api_device(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Response, CommandError> {
    let snap = store.snapshot().await;
    Ok(Json(snap.device(&id)?).into_response())
}

async fn api_water(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Response, CommandError> {
    let event = commands::manual_water(&store, &id).await?;
    Ok(Json(event).into_response())
}

async fn api_light(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(form): Json<LightForm>,
) -> Result<Response, CommandError> {
    let stored = commands::set_light_intensity(&store, &id, form.intensity.coerce_int()).await?;
    Ok(Json(json!({ "lightIntensity": stored })).into_response())
}

async fn api_automation(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(form): Json<AutomationForm>,
) -> Result<Response, CommandError> {
    let settings = form.into_settings();
    let changed = commands::update_automation(&store, &id, settings.clone()).await?;
    Ok(Json(json!({ "changed": changed, "automation": settings })).into_response())
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(
    store: SharedStore,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!(%addr, "panel api listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown)
        .await
        .context("web server error")?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::device;
    use crate::state::Store;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_store() -> SharedStore {
        let cfg = config::builtin().unwrap();
        Store::new(cfg.build_store(device::now()))
    }

    async fn send(store: &SharedStore, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router(store.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    // -- Queries ------------------------------------------------------------

    #[tokio::test]
    async fn greenhouses_lists_sorted_names() {
        let store = test_store();
        let (status, body) = send(&store, get_req("/api/greenhouses")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!(["Greenhouse A", "Greenhouse B", "Greenhouse C"])
        );
    }

    #[tokio::test]
    async fn greenhouse_devices_in_order() {
        let store = test_store();
        let (status, body) =
            send(&store, get_req("/api/greenhouses/Greenhouse%20B/devices")).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["gh-b-1", "gh-b-2", "gh-b-3", "gh-b-4"]);
    }

    #[tokio::test]
    async fn unknown_greenhouse_is_empty_list() {
        let store = test_store();
        let (status, body) = send(&store, get_req("/api/greenhouses/Nowhere/devices")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn device_returns_full_record() {
        let store = test_store();
        let (status, body) = send(&store, get_req("/api/devices/gh-a-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Greenhouse A - Plant 1");
        assert_eq!(body["controls"]["lightIntensity"], 70);
        assert_eq!(body["history"]["wateringLog"][0]["amount"], "150mL");
    }

    #[tokio::test]
    async fn unknown_device_is_404() {
        let store = test_store();
        let (status, body) = send(&store, get_req("/api/devices/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "device 'nope' not found");
    }

    #[tokio::test]
    async fn view_resolves_selection() {
        let store = test_store();
        let (status, body) = send(&store, get_req("/api/view?greenhouse=Greenhouse%20C")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["selectedGreenhouse"], "Greenhouse C");
        assert_eq!(body["selectedDevice"]["id"], "gh-c-1");
        assert_eq!(body["devices"].as_array().unwrap().len(), 3);

        let (_, body) = send(&store, get_req("/api/view")).await;
        assert_eq!(body["selectedDevice"]["id"], "gh-a-1");
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let store = test_store();
        let (status, body) = send(&store, get_req("/api/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["devicesOnline"], 9);
        assert_eq!(body["devicesOffline"], 1);
        assert_eq!(body["version"], 0);
    }

    // -- Commands -----------------------------------------------------------

    #[tokio::test]
    async fn water_appends_manual_event() {
        let store = test_store();
        let (status, body) = send(
            &store,
            json_req("POST", "/api/devices/gh-a-2/water", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "Manual");
        assert_eq!(body["amount"], "150mL");

        let snap = store.snapshot().await;
        assert_eq!(snap.device("gh-a-2").unwrap().sensors.humidity, 70.0);
    }

    #[tokio::test]
    async fn water_offline_device_is_409() {
        let store = test_store();
        let (status, body) = send(
            &store,
            json_req("POST", "/api/devices/gh-a-3/water", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "device 'gh-a-3' is offline");
    }

    #[tokio::test]
    async fn light_is_clamped_and_coerced() {
        let store = test_store();
        let (status, body) = send(
            &store,
            json_req("PUT", "/api/devices/gh-b-1/light", json!({ "intensity": 150 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lightIntensity"], 100);

        let (_, body) = send(
            &store,
            json_req("PUT", "/api/devices/gh-b-1/light", json!({ "intensity": "abc" })),
        )
        .await;
        assert_eq!(body["lightIntensity"], 0);

        let (_, body) = send(
            &store,
            json_req("PUT", "/api/devices/gh-b-1/light", json!({ "intensity": "45" })),
        )
        .await;
        assert_eq!(body["lightIntensity"], 45);

        let (_, body) = send(
            &store,
            json_req("PUT", "/api/devices/gh-b-1/light", json!({ "intensity": "72abc" })),
        )
        .await;
        assert_eq!(body["lightIntensity"], 72);
    }

    #[tokio::test]
    async fn automation_update_replaces_settings() {
        let store = test_store();
        let form = json!({
            "enabled": false,
            "minHumidity": 35,
            "baseWaterAmount": "bad",
            "lightStartTime": "06:00",
            "lightEndTime": "20:00"
        });
        let (status, body) = send(
            &store,
            json_req("PUT", "/api/devices/gh-c-2/automation", form.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert_eq!(body["automation"]["baseWaterAmount"], 0.0);

        let (_, body) = send(&store, get_req("/api/devices/gh-c-2")).await;
        assert_eq!(body["automation"]["enabled"], false);
        assert_eq!(body["automation"]["minHumidity"], 35.0);
        assert_eq!(body["automation"]["lightStartTime"], "06:00");

        // Submitting the same form again is not a change.
        let (_, body) = send(
            &store,
            json_req("PUT", "/api/devices/gh-c-2/automation", form),
        )
        .await;
        assert_eq!(body["changed"], false);
    }
}

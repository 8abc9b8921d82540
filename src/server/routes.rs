use crate::engine::alerts::{Alert, AlertCondition, NewAlert};
use crate::engine::history::PriceSample;
use crate::error::{Result, XrpWatchError};
use crate::server::http::{Request, Response};
use crate::state::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::http::Method;

const SERVICE_NAME: &str = "XRP Price Alert Bot";

#[derive(Debug, Deserialize)]
struct CreateAlert {
    symbol: Option<String>,
    threshold: f64,
    condition: String,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UpdateAlert {
    enabled: bool,
}

pub fn handle(state: &AppState, request: &Request) -> Response {
    match route(state, request) {
        Ok(response) => response,
        Err(e) => Response::error(&e),
    }
}

fn route(state: &AppState, request: &Request) -> Result<Response> {
    let path = request.path();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (&request.method, segments.as_slice()) {
        (&Method::GET, []) => Ok(root()),
        (&Method::GET, ["health"]) => Ok(health(state)),
        (&Method::GET, ["alerts"]) => Ok(list_alerts(state)),
        (&Method::POST, ["alerts"]) => create_alert(state, &request.body),
        (&Method::DELETE, ["alerts", "id", id]) => delete_alert_by_id(state, id),
        (&Method::PATCH, ["alerts", "id", id]) => update_alert(state, id, &request.body),
        (&Method::DELETE, ["alerts", index]) => delete_alert(state, index),
        (&Method::GET, ["price"]) => price(state),
        (&Method::POST, ["analyze"]) => analyze(state),
        (method, [] | ["health"] | ["alerts"] | ["alerts", _] | ["alerts", "id", _] | ["price"] | ["analyze"]) => {
            Ok(Response::method_not_allowed(method, path))
        }
        _ => Err(XrpWatchError::NotFound(format!("no route for {}", path))),
    }
}

fn root() -> Response {
    Response::ok(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": ["/alerts", "/price", "/analyze", "/health"],
    }))
}

fn health(state: &AppState) -> Response {
    let (current_price, samples, capacity) = {
        let history = state.history();
        (history.latest().map(|s| s.price), history.len(), history.capacity())
    };
    let alerts_active = state.alerts().active_count();
    let feed = state.feed().clone();

    Response::ok(json!({
        "status": "healthy",
        "symbol": state.symbol,
        "current_price": current_price,
        "alerts_active": alerts_active,
        "history": { "samples": samples, "capacity": capacity },
        "feed": feed,
    }))
}

fn alert_json(position: usize, alert: &Alert) -> Value {
    json!({
        "position": position,
        "id": alert.id,
        "symbol": alert.symbol,
        "threshold": alert.threshold,
        "condition": alert.condition,
        "enabled": alert.enabled,
    })
}

fn list_alerts(state: &AppState) -> Response {
    let registry = state.alerts();
    let alerts: Vec<Value> = registry
        .list()
        .iter()
        .enumerate()
        .map(|(position, alert)| alert_json(position, alert))
        .collect();

    Response::ok(json!({
        "alerts": alerts,
        "total": registry.len(),
    }))
}

fn create_alert(state: &AppState, body: &[u8]) -> Result<Response> {
    let request: CreateAlert = serde_json::from_slice(body)?;
    let condition: AlertCondition = request.condition.parse()?;

    let new = NewAlert {
        symbol: request.symbol.unwrap_or_else(|| state.symbol.clone()),
        threshold: request.threshold,
        condition,
        enabled: request.enabled.unwrap_or(true),
    };
    let (position, alert) = state.alerts().add(new)?;

    Ok(Response::created(json!({
        "success": true,
        "position": position,
        "alert": alert_json(position, &alert),
        "message": format!(
            "Alert configured: {} {} ${}",
            alert.symbol.to_uppercase(),
            alert.condition,
            alert.threshold
        ),
    })))
}

fn deleted(alert: &Alert) -> Response {
    Response::ok(json!({
        "success": true,
        "alert": alert,
        "message": format!(
            "Alert deleted: {} {} ${}",
            alert.symbol, alert.condition, alert.threshold
        ),
    }))
}

fn delete_alert(state: &AppState, index: &str) -> Result<Response> {
    let index: i64 = index
        .parse()
        .map_err(|_| XrpWatchError::Validation(format!("alert index '{}' is not a number", index)))?;
    let position = usize::try_from(index)
        .map_err(|_| XrpWatchError::NotFound(format!("no alert at index {}", index)))?;

    let removed = state.alerts().remove(position)?;
    Ok(deleted(&removed))
}

fn parse_id(id: &str) -> Result<u64> {
    id.parse()
        .map_err(|_| XrpWatchError::Validation(format!("alert id '{}' is not a number", id)))
}

fn delete_alert_by_id(state: &AppState, id: &str) -> Result<Response> {
    let removed = state.alerts().remove_by_id(parse_id(id)?)?;
    Ok(deleted(&removed))
}

fn update_alert(state: &AppState, id: &str, body: &[u8]) -> Result<Response> {
    let id = parse_id(id)?;
    let update: UpdateAlert = serde_json::from_slice(body)?;

    let mut registry = state.alerts();
    let alert = registry.set_enabled(id, update.enabled)?;
    let position = registry.position_of(id)?;

    Ok(Response::ok(json!({
        "success": true,
        "alert": alert_json(position, &alert),
    })))
}

fn price(state: &AppState) -> Result<Response> {
    let latest: Option<PriceSample> = state.history().latest().cloned();
    let sample = latest.ok_or_else(|| XrpWatchError::PriceUnavailable(state.symbol.clone()))?;
    Ok(Response::ok(serde_json::to_value(sample)?))
}

fn analyze(state: &AppState) -> Result<Response> {
    let window: Vec<PriceSample> = state
        .history()
        .window(state.analysis_window)
        .cloned()
        .collect();

    let result = state.analyzer.analyze(&window)?;
    Ok(Response::ok(serde_json::to_value(result)?))
}

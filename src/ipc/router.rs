use super::handlers;
use super::helpers::HandlerErr;
use super::types::{AppState, Request};
use tracing::warn;

type Family = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

/// Handler families in dispatch order; the first one claiming the method wins.
const FAMILIES: [(&str, Family); 9] = [
    ("core", handlers::core::try_handle),
    ("classes", handlers::classes::try_handle),
    ("students", handlers::students::try_handle),
    ("grades", handlers::grades::try_handle),
    ("bonuses", handlers::bonuses::try_handle),
    ("setup", handlers::setup::try_handle),
    ("calc", handlers::rankings::try_handle),
    ("reports", handlers::reports::try_handle),
    ("backup", handlers::backup::try_handle),
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for (_, family) in FAMILIES {
        if let Some(resp) = family(state, &req) {
            return resp;
        }
    }

    let known: Vec<&str> = FAMILIES.iter().map(|(name, _)| *name).collect();
    warn!(method = %req.method, "unknown method");
    HandlerErr::new("not_implemented", format!("unknown method: {}", req.method))
        .with_details(serde_json::json!({ "families": known }))
        .response(&req.id)
}

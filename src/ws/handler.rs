//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::Actor;
use crate::domain::policy::require;
use crate::error::LedgerError;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// The actor is resolved from the identity headers before the upgrade and
/// must be allowed to view loans, since every event carries loan data.
///
/// # Errors
///
/// Returns [`LedgerError::Unauthenticated`] without identity headers and
/// [`LedgerError::Forbidden`] when the policy denies loan visibility.
pub async fn ws_handler(
    State(state): State<AppState>,
    actor: Actor,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, LedgerError> {
    require(
        state.loan_service.context().policy.can_view_loans(&actor),
        "view loans",
    )?;
    tracing::debug!(actor = %actor.id, role = ?actor.role, "event stream subscribed");
    let event_rx = state.event_bus.subscribe();
    Ok(ws.on_upgrade(move |socket| run_connection(socket, event_rx)))
}

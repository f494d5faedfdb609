//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching subscription commands and forwarding filtered events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{LedgerEvent, LoanRef};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(socket: WebSocket, mut event_rx: broadcast::Receiver<LedgerEvent>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();
    tracing::debug!("ws connection opened");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(ledger_event) => {
                        if subs.matches(&ledger_event) {
                            let msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::to_value(&ledger_event).unwrap_or_default(),
                            );
                            let Some(json) = msg.to_json() else {
                                continue;
                            };
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON response.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error("", 400, "malformed JSON").to_json();
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "expected a command message").to_json();
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command").to_json();
    };

    let response = match command {
        WsCommand::Subscribe { loan_ids } => {
            let targets = Targets::parse(&loan_ids);
            subs.subscribe(&targets.loans, targets.wildcard);
            serde_json::json!({
                "subscribed": targets.names(),
                "rejected": targets.rejected,
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { loan_ids } => {
            let targets = Targets::parse(&loan_ids);
            subs.unsubscribe(&targets.loans, targets.wildcard);
            serde_json::json!({
                "unsubscribed": targets.names(),
                "rejected": targets.rejected,
                "remaining_count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
    };
    WsMessage::new(msg.id, WsMessageType::Response, response).to_json()
}

/// Loan references parsed from a command's `loan_ids`.
struct Targets {
    loans: Vec<LoanRef>,
    wildcard: bool,
    rejected: Vec<String>,
}

impl Targets {
    fn parse(raw: &[String]) -> Self {
        let mut targets = Self {
            loans: Vec::new(),
            wildcard: false,
            rejected: Vec::new(),
        };
        for value in raw {
            if value == "*" {
                targets.wildcard = true;
            } else if let Ok(loan) = value.parse::<LoanRef>() {
                targets.loans.push(loan);
            } else {
                targets.rejected.push(value.clone());
            }
        }
        targets
    }

    fn names(&self) -> Vec<String> {
        self.loans.iter().map(ToString::to_string).collect()
    }
}

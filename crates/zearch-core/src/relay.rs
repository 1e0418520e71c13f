//! Inter-context messaging
//!
//! The extension's contexts (background process, per-page content scripts,
//! UI surfaces) share no memory and talk through a small fixed vocabulary of
//! named actions. Delivery is at-most-once and best-effort: a send to a
//! receiver that is not listening is not an error, it is an explicit
//! [`Delivery::Unacknowledged`] outcome the caller opts into ignoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

// =============================================================================
// Message vocabulary
// =============================================================================

/// Wire format: a JSON object with an `action` field plus action-specific
/// payload fields. No versioning or schema negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "action", rename_all = "camelCase")]
#[ts(export)]
pub enum Message {
    /// UI flipped the master switch; page scanners react immediately.
    ToggleBlocking { enabled: bool },
    /// Background saw a search page finish loading.
    PageLoaded { url: String },
    /// Settings changed in some context; receivers re-read what they need.
    SettingsChanged { changes: Value },
    /// Request the current settings object (request/response).
    GetSettings,
    /// A result matched; the store should record it.
    UpdateStats { domain: String },
    /// Ask the background process to raise a notification.
    ShowNotification {
        domain: String,
        count: u32,
        message: String,
    },
}

// =============================================================================
// Delivery
// =============================================================================

/// Outcome of a best-effort send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an Unacknowledged delivery should be ignored deliberately"]
pub enum Delivery {
    Delivered,
    /// No receiver was present or listening. Not an error.
    Unacknowledged,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Identifies a receiver: a tab's content script or a UI surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(pub i32);

/// A message receiver. Returning `None` means fire-and-forget handling;
/// `Some` carries a response for request/response pairs like `getSettings`.
pub trait Endpoint {
    fn receive(&mut self, message: &Message) -> Option<Value>;
}

// =============================================================================
// Relay
// =============================================================================

/// Routes messages between registered endpoints.
#[derive(Default)]
pub struct Relay {
    endpoints: HashMap<EndpointId, Box<dyn Endpoint>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: EndpointId, endpoint: Box<dyn Endpoint>) {
        self.endpoints.insert(id, endpoint);
    }

    pub fn unregister(&mut self, id: EndpointId) -> bool {
        self.endpoints.remove(&id).is_some()
    }

    /// Deliver to one receiver. An absent receiver yields
    /// [`Delivery::Unacknowledged`], never an error.
    pub fn send(&mut self, to: EndpointId, message: &Message) -> Delivery {
        match self.endpoints.get_mut(&to) {
            Some(endpoint) => {
                endpoint.receive(message);
                Delivery::Delivered
            }
            None => {
                log::debug!("message to absent endpoint {to:?} dropped");
                Delivery::Unacknowledged
            }
        }
    }

    /// Deliver and wait for a response (e.g. `getSettings`). `None` when the
    /// receiver is absent or chose not to respond.
    pub fn request(&mut self, to: EndpointId, message: &Message) -> Option<Value> {
        self.endpoints.get_mut(&to)?.receive(message)
    }

    /// Deliver to every registered endpoint; returns how many received it.
    pub fn broadcast(&mut self, message: &Message) -> usize {
        for endpoint in self.endpoints.values_mut() {
            endpoint.receive(message);
        }
        self.endpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recording {
        seen: Rc<RefCell<Vec<Message>>>,
        response: Option<Value>,
    }

    impl Endpoint for Recording {
        fn receive(&mut self, message: &Message) -> Option<Value> {
            self.seen.borrow_mut().push(message.clone());
            self.response.clone()
        }
    }

    fn recording(response: Option<Value>) -> (Box<Recording>, Rc<RefCell<Vec<Message>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (
            Box::new(Recording {
                seen: seen.clone(),
                response,
            }),
            seen,
        )
    }

    #[test]
    fn test_wire_format() {
        let msg = Message::ToggleBlocking { enabled: false };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"action": "toggleBlocking", "enabled": false})
        );

        let msg = Message::ShowNotification {
            domain: "example.com".to_string(),
            count: 3,
            message: "Blocked 3 search results".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["action"], "showNotification");
        assert_eq!(value["count"], 3);

        let parsed: Message =
            serde_json::from_value(json!({"action": "getSettings"})).unwrap();
        assert_eq!(parsed, Message::GetSettings);

        let parsed: Message = serde_json::from_value(
            json!({"action": "updateStats", "domain": "(^|\\.)example\\.com$"}),
        )
        .unwrap();
        assert!(matches!(parsed, Message::UpdateStats { .. }));
    }

    #[test]
    fn test_send_to_absent_receiver_is_unacknowledged() {
        let mut relay = Relay::new();
        let outcome = relay.send(EndpointId(7), &Message::GetSettings);
        assert_eq!(outcome, Delivery::Unacknowledged);
    }

    #[test]
    fn test_send_and_unregister() {
        let mut relay = Relay::new();
        let (endpoint, seen) = recording(None);
        relay.register(EndpointId(1), endpoint);

        let outcome = relay.send(EndpointId(1), &Message::ToggleBlocking { enabled: true });
        assert!(outcome.is_delivered());
        assert_eq!(seen.borrow().len(), 1);

        assert!(relay.unregister(EndpointId(1)));
        let outcome = relay.send(EndpointId(1), &Message::ToggleBlocking { enabled: true });
        assert_eq!(outcome, Delivery::Unacknowledged);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_request_response() {
        let mut relay = Relay::new();
        let settings = json!({"isEnabled": true, "blockedSites": []});
        let (endpoint, _) = recording(Some(settings.clone()));
        relay.register(EndpointId(2), endpoint);

        assert_eq!(relay.request(EndpointId(2), &Message::GetSettings), Some(settings));
        assert_eq!(relay.request(EndpointId(3), &Message::GetSettings), None);
    }

    #[test]
    fn test_broadcast_reaches_every_endpoint() {
        let mut relay = Relay::new();
        let (a, seen_a) = recording(None);
        let (b, seen_b) = recording(None);
        relay.register(EndpointId(1), a);
        relay.register(EndpointId(2), b);

        let reached = relay.broadcast(&Message::SettingsChanged {
            changes: json!({"isEnabled": false}),
        });
        assert_eq!(reached, 2);
        assert_eq!(seen_a.borrow().len(), 1);
        assert_eq!(seen_b.borrow().len(), 1);
    }
}

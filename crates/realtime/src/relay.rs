//! Fan-out of stored messages to online recipients.

use tracing::{debug, warn};

use crate::events::{MessagePayload, ServerEvent};
use crate::registry::SessionRegistry;

/// Outcome of one fan-out pass, for logging and tests.
///
/// Counts are disjoint per member: `delivered` and `offline` partition the
/// members whose connections all accepted or who had none, while a member
/// whose every connection refused the events shows up only through
/// `dropped`.
#[derive(Debug, Default, PartialEq)]
pub struct DeliveryReport {
    /// Members with at least one live connection that accepted the events.
    pub delivered: usize,
    /// Members with no live connection at all; they catch up via history.
    pub offline: usize,
    /// Connections whose outbound queue was full or closed.
    pub dropped: usize,
}

/// Pushes a stored message to every chat member except its sender.
///
/// Delivery is keyed by user identity, not room subscription: a member who
/// is online receives the events even if they never joined the chat's room.
/// Events are best-effort; a slow or gone connection is skipped, never
/// awaited.
#[derive(Clone)]
pub struct RelayRouter {
    registry: SessionRegistry,
}

impl RelayRouter {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Deliver `payload` to every member in `member_ids` other than
    /// `sender_id`. Each recipient connection gets the full message first,
    /// then the notification.
    pub async fn deliver(
        &self,
        payload: &MessagePayload,
        member_ids: &[i64],
        sender_id: i64,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for &member_id in member_ids {
            if member_id == sender_id {
                continue;
            }

            let connections = self.registry.online_connections_for(member_id).await;
            if connections.is_empty() {
                report.offline += 1;
                continue;
            }

            let mut reached = false;
            for sender in connections {
                let message = ServerEvent::MessageReceived {
                    message: payload.clone(),
                };
                let notification = ServerEvent::NotificationReceived {
                    chat_id: payload.chat.id.clone(),
                    sender_name: payload.sender.display_name.clone(),
                };

                if sender.try_send(message).is_err() {
                    warn!(member_id, "dropping delivery, connection queue unavailable");
                    report.dropped += 1;
                    continue;
                }
                if sender.try_send(notification).is_err() {
                    warn!(member_id, "dropping notification, connection queue unavailable");
                    report.dropped += 1;
                    continue;
                }
                reached = true;
            }

            if reached {
                report.delivered += 1;
            }
        }

        debug!(
            delivered = report.delivered,
            offline = report.offline,
            dropped = report.dropped,
            chat_id = %payload.chat.id,
            "relayed message"
        );
        report
    }
}

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::account::AccountRole;
use crate::entities::otp::OtpPurpose;
use crate::services::notifications::{NotificationService, OutboundNotice};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Publishes after commit. A closed channel is logged, never surfaced to
/// the caller.
pub async fn emit(sender: &Option<Arc<EventSender>>, event: Event) {
    if let Some(event_sender) = sender {
        let name = event.name();
        if let Err(e) = event_sender.send(event).await {
            warn!(error = %e, event = name, "Failed to send event");
        }
    }
}

/// Lifecycle events that fan out into notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OtpIssued {
        account_id: Uuid,
        purpose: OtpPurpose,
        code: String,
        resent: bool,
    },
    AccountApproved {
        account_id: Uuid,
        role: AccountRole,
    },
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
        warehouse_ids: Vec<Uuid>,
    },
    DeliveryAssigned {
        delivery_id: Uuid,
        driver_id: Uuid,
        order_numbers: Vec<String>,
    },
    DeliveryOtpIssued {
        delivery_id: Uuid,
        customer_ids: Vec<Uuid>,
        code: String,
    },
    DeliveryCompleted {
        delivery_id: Uuid,
        customer_ids: Vec<Uuid>,
    },
    DeliveryCancelled {
        delivery_id: Uuid,
        customer_ids: Vec<Uuid>,
    },
    ProductBackInStock {
        product_id: Uuid,
        title: String,
        customer_ids: Vec<Uuid>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OtpIssued { .. } => "otp_issued",
            Event::AccountApproved { .. } => "account_approved",
            Event::OrderPlaced { .. } => "order_placed",
            Event::DeliveryAssigned { .. } => "delivery_assigned",
            Event::DeliveryOtpIssued { .. } => "delivery_otp_issued",
            Event::DeliveryCompleted { .. } => "delivery_completed",
            Event::DeliveryCancelled { .. } => "delivery_cancelled",
            Event::ProductBackInStock { .. } => "product_back_in_stock",
        }
    }

    /// One notice per recipient.
    pub fn notices(&self) -> Vec<OutboundNotice> {
        match self {
            Event::OtpIssued {
                account_id,
                purpose,
                code,
                resent,
            } => {
                let (title, message) = match (purpose, resent) {
                    (OtpPurpose::Registration, false) => (
                        "Verify your account",
                        format!("Your verification code is {code}. It is valid for a limited time."),
                    ),
                    (OtpPurpose::Registration, true) => (
                        "New verification code",
                        format!("Your new verification code is {code}."),
                    ),
                    (OtpPurpose::PasswordReset, _) => (
                        "Password reset",
                        format!("Use {code} to reset your password. Ignore this if it wasn't you."),
                    ),
                };
                vec![OutboundNotice::new(*account_id, title, message)]
            }
            Event::AccountApproved { account_id, role } => vec![OutboundNotice::new(
                *account_id,
                "Account approved",
                format!("Your {role} account has been approved. You can now log in."),
            )],
            Event::OrderPlaced {
                order_number,
                customer_id,
                warehouse_ids,
                ..
            } => {
                let mut notices = vec![OutboundNotice::new(
                    *customer_id,
                    "Order placed",
                    format!("Your order {order_number} has been placed."),
                )];
                notices.extend(warehouse_ids.iter().map(|warehouse_id| {
                    OutboundNotice::new(
                        *warehouse_id,
                        "New order",
                        format!("Order {order_number} contains items from your warehouse."),
                    )
                }));
                notices
            }
            Event::DeliveryAssigned {
                driver_id,
                order_numbers,
                ..
            } => vec![OutboundNotice::new(
                *driver_id,
                "New delivery assigned",
                format!("You have been assigned orders {}.", order_numbers.join(", ")),
            )],
            Event::DeliveryOtpIssued {
                customer_ids, code, ..
            } => customer_ids
                .iter()
                .map(|customer_id| {
                    OutboundNotice::new(
                        *customer_id,
                        "Your order is on the way",
                        format!("Share this code with the driver to receive your order: {code}"),
                    )
                })
                .collect(),
            Event::DeliveryCompleted { customer_ids, .. } => customer_ids
                .iter()
                .map(|customer_id| {
                    OutboundNotice::new(
                        *customer_id,
                        "Order delivered",
                        "Your order has been delivered.".to_string(),
                    )
                })
                .collect(),
            Event::DeliveryCancelled { customer_ids, .. } => customer_ids
                .iter()
                .map(|customer_id| {
                    OutboundNotice::new(
                        *customer_id,
                        "Delivery cancelled",
                        "Your delivery has been cancelled.".to_string(),
                    )
                })
                .collect(),
            Event::ProductBackInStock {
                title,
                customer_ids,
                ..
            } => customer_ids
                .iter()
                .map(|customer_id| {
                    OutboundNotice::new(
                        *customer_id,
                        "Back in stock",
                        format!("{title} is available again."),
                    )
                })
                .collect(),
        }
    }
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifications: Arc<NotificationService>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        let notices = event.notices();
        info!(event = name, recipients = notices.len(), "Received event");

        for notice in notices {
            let account_id = notice.account_id;
            if let Err(e) = notifications.deliver(notice).await {
                error!(
                    event = name,
                    account_id = %account_id,
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_placed_notifies_customer_and_each_warehouse() {
        let customer = Uuid::new_v4();
        let warehouses = vec![Uuid::new_v4(), Uuid::new_v4()];
        let event = Event::OrderPlaced {
            order_id: Uuid::new_v4(),
            order_number: "ORD000042".to_string(),
            customer_id: customer,
            warehouse_ids: warehouses.clone(),
        };

        let notices = event.notices();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices[0].account_id, customer);
        assert!(notices[0].message.contains("ORD000042"));
        assert_eq!(notices[1].account_id, warehouses[0]);
        assert_eq!(notices[2].account_id, warehouses[1]);
    }

    #[test]
    fn delivery_otp_is_sent_to_every_customer_on_the_run() {
        let customers = vec![Uuid::new_v4(), Uuid::new_v4()];
        let event = Event::DeliveryOtpIssued {
            delivery_id: Uuid::new_v4(),
            customer_ids: customers.clone(),
            code: "482913".to_string(),
        };

        let notices = event.notices();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.message.contains("482913")));
        assert!(notices
            .iter()
            .all(|n| n.message.starts_with("Share this code with the driver")));
    }

    #[test]
    fn password_reset_otp_wording_differs_from_registration() {
        let account_id = Uuid::new_v4();
        let reg = Event::OtpIssued {
            account_id,
            purpose: OtpPurpose::Registration,
            code: "111111".into(),
            resent: false,
        };
        let reset = Event::OtpIssued {
            account_id,
            purpose: OtpPurpose::PasswordReset,
            code: "111111".into(),
            resent: false,
        };
        assert_ne!(reg.notices()[0].title, reset.notices()[0].title);
    }

    #[tokio::test]
    async fn emit_without_sender_is_a_no_op() {
        emit(
            &None,
            Event::DeliveryCompleted {
                delivery_id: Uuid::new_v4(),
                customer_ids: vec![],
            },
        )
        .await;
    }

    #[tokio::test]
    async fn emit_on_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = Some(Arc::new(EventSender::new(tx)));
        emit(
            &sender,
            Event::AccountApproved {
                account_id: Uuid::new_v4(),
                role: AccountRole::Driver,
            },
        )
        .await;
    }
}

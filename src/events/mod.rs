use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events published by the services after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Identity events
    UserRegistered(Uuid),
    UserLoggedOut(Uuid),
    ProfileUpdated(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    VariantCreated { product_id: Uuid, variant_id: Uuid },
    LowStock {
        product_id: Uuid,
        stock_quantity: i32,
        threshold: i32,
    },

    // Social events
    LikeToggled {
        product_id: Uuid,
        user_id: Uuid,
        liked: bool,
    },
    CommentPosted {
        product_id: Uuid,
        comment_id: Uuid,
        parent_id: Option<Uuid>,
    },
    ProductShared {
        product_id: Uuid,
        user_id: Uuid,
        platform: String,
    },

    // Commerce events
    CartItemAdded { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderDeleted(Uuid),
    CheckoutCompleted {
        order_id: Uuid,
        total: Decimal,
        coupon: Option<String>,
    },
    CouponCreated(String),
}

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

    /// Sends an event, logging instead of failing when the processor is gone.
    ///
    /// Events are published after commit, so a closed channel must not turn a
    /// successful write into an error response.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Consumes events until every sender has been dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStock {
                product_id,
                stock_quantity,
                threshold,
            } => {
                warn!(
                    "Product {} is low on stock: {} left (threshold {})",
                    product_id, stock_quantity, threshold
                );
            }
            Event::CheckoutCompleted {
                order_id,
                total,
                coupon,
            } => {
                info!(
                    order_id = %order_id,
                    total = %total,
                    coupon = coupon.as_deref().unwrap_or("-"),
                    "Checkout completed"
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    "Order {} moved from {} to {}",
                    order_id, old_status, new_status
                );
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();
        sender.send(Event::ProductCreated(id)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::ProductCreated(id)));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::CartCleared(Uuid::new_v4())).await.is_err());
        // Must not panic or propagate.
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn processor_drains_and_stops() {
        let (tx, rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let handle = tokio::spawn(process_events(rx));
        sender.send_or_log(Event::UserRegistered(Uuid::new_v4())).await;
        sender
            .send_or_log(Event::LowStock {
                product_id: Uuid::new_v4(),
                stock_quantity: 2,
                threshold: 10,
            })
            .await;
        drop(sender);
        handle.await.unwrap();
    }
}

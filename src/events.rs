use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::affiliate::AffiliateService;

/// Events emitted by the storefront services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),

    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },

    // Checkout events
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
    },

    // Affiliate events
    AffiliateJoined(Uuid),
    ReferralConverted { affiliate_id: Uuid, order_id: Uuid },
    ReferralApproved(Uuid),
    ReferralPaid(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the channel is closed or full.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Used after a transaction has already committed, where the caller has
    /// nothing sensible to do with a channel error.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Consumes the event channel and dispatches events to interested
/// components. Affiliate commission accrual is wired here so the checkout
/// transaction never calls into the affiliate component directly.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, affiliates: Arc<AffiliateService>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderPlaced {
                order_id,
                user_id,
                total_amount,
            } => {
                match affiliates
                    .record_conversion(user_id, order_id, total_amount)
                    .await
                {
                    Ok(Some(referral)) => {
                        info!(
                            order_id = %order_id,
                            referral_id = %referral.id,
                            commission = %referral.commission_amount,
                            "Referral conversion recorded"
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(
                            order_id = %order_id,
                            error = %e,
                            "Failed to record referral conversion"
                        );
                    }
                }
            }
            Event::ReferralConverted {
                affiliate_id,
                order_id,
            } => {
                info!(affiliate_id = %affiliate_id, order_id = %order_id, "Referral converted");
            }
            other => {
                tracing::debug!(event = ?other, "Event observed");
            }
        }
    }

    info!("Event channel closed; processing loop stopped");
}

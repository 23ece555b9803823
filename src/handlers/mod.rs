pub mod affiliates;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod extract;
pub mod orders;
pub mod products;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        affiliate::AffiliateService, cart::CartService, catalog::CatalogService,
        checkout::CheckoutService, orders::OrderService,
    },
};
use std::sync::Arc;

/// Aggregated services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub affiliate: Arc<AffiliateService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, config: Arc<AppConfig>) -> Self {
        let affiliate = Arc::new(AffiliateService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        Self {
            catalog: Arc::new(CatalogService::new(db.clone(), event_sender.clone())),
            cart: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                config,
            )),
            orders: Arc::new(OrderService::new(db)),
            affiliate,
        }
    }

    /// The affiliate service, for wiring into the event processing loop.
    pub fn affiliate_service(&self) -> Arc<AffiliateService> {
        self.affiliate.clone()
    }
}

use crate::{
    config::AppConfig,
    entities::{
        cart, cart_item, order, order_item, Address, Cart, CartItem, Order, OrderStatus,
        PaymentMethod, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::round_money,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QuerySelect, Select, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Checkout service: converts a user's cart into an immutable order inside
/// a single database transaction.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Places an order from the user's cart.
    ///
    /// The whole conversion is one transaction: totals are computed from
    /// the captured line prices, the order and its item snapshots are
    /// inserted, stock is decremented for non-preorder lines, and the cart
    /// is destroyed. Any failure rolls everything back and leaves the cart
    /// untouched. Because the cart dies with the commit, a concurrent
    /// second `place_order` for the same cart resolves to no cart and
    /// fails with `EmptyCart` instead of producing a duplicate order.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<order::Model, ServiceError> {
        // All validation happens before any transaction is opened.
        input.shipping_address.validate()?;
        input.billing_address.validate()?;

        let existing = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::EmptyCart)?;
        let item_count = CartItem::find()
            .filter(cart_item::Column::CartId.eq(existing.id))
            .count(&*self.db)
            .await?;
        if item_count == 0 {
            return Err(ServiceError::EmptyCart);
        }

        let txn = self.db.begin().await?;
        let backend = txn.get_database_backend();

        // Re-resolve under the transaction: a checkout that committed in
        // between has deleted the cart, and this call must fail the same
        // way an empty cart does.
        let cart = lock_rows(
            Cart::find().filter(cart::Column::UserId.eq(user_id)),
            backend,
        )
        .one(&txn)
        .await?
        .ok_or(ServiceError::EmptyCart)?;

        let items = lock_rows(
            CartItem::find().filter(cart_item::Column::CartId.eq(cart.id)),
            backend,
        )
        .all(&txn)
        .await?;
        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let totals = compute_totals(
            &items,
            self.config.tax_rate_decimal(),
            self.config.shipping_amount_decimal(),
        );

        let order_number = self.generate_order_number(&txn).await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            order_number: Set(order_number),
            status: Set(OrderStatus::Pending),
            subtotal: Set(totals.subtotal),
            tax_amount: Set(totals.tax_amount),
            shipping_amount: Set(totals.shipping_amount),
            total_amount: Set(totals.total_amount),
            shipping_address: Set(input.shipping_address),
            billing_address: Set(input.billing_address),
            payment_method: Set(input.payment_method),
            payment_status: Set("pending".to_string()),
            payment_reference: Set(None),
            notes: Set(input.notes),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order.insert(&txn).await?;

        for item in &items {
            // The product row backs both the snapshot and the stock
            // decrement; it is read under an exclusive lock so concurrent
            // checkouts of the same product serialize here.
            let product = lock_rows(Product::find_by_id(item.product_id), backend)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Product {} is no longer available",
                        item.product_id
                    ))
                })?;

            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                product_sku: Set(product.sku.clone()),
                quantity: Set(item.quantity),
                price: Set(item.price),
                total: Set(item.price * Decimal::from(item.quantity)),
                is_preorder: Set(item.is_preorder),
                created_at: Set(now),
                updated_at: Set(now),
            };
            line.insert(&txn).await?;

            // Preorder lines sell against future availability and leave the
            // counter alone. No floor check: stock may go negative, exactly
            // as the storefront always behaved; the row lock only makes the
            // decrements serialize.
            if !item.is_preorder {
                let remaining = product.stock_quantity - item.quantity;
                let mut active: crate::entities::product::ActiveModel = product.into();
                active.stock_quantity = Set(remaining);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        cart.delete(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id,
                user_id,
                total_amount: order.total_amount,
            })
            .await;

        info!(
            "Placed order {} ({}) for user {}: total {}",
            order.order_number, order_id, user_id, order.total_amount
        );
        Ok(order)
    }

    /// Allocates an order number that is not yet taken. The unique
    /// constraint on the column remains the final arbiter; this loop keeps
    /// collisions from ever reaching it in practice.
    async fn generate_order_number(
        &self,
        txn: &DatabaseTransaction,
    ) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = order_number_candidate(Utc::now(), &random_suffix(6));
            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .count(txn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate a unique order number".to_string(),
        ))
    }
}

/// Monetary breakdown persisted on the order
#[derive(Debug, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
}

/// Computes the order totals from captured line prices. Rounding happens
/// once per persisted field, half away from zero.
fn compute_totals(items: &[cart_item::Model], tax_rate: Decimal, shipping: Decimal) -> OrderTotals {
    let subtotal: Decimal = items
        .iter()
        .map(|item| item.price * Decimal::from(item.quantity))
        .sum();
    let subtotal = round_money(subtotal);
    let tax_amount = round_money(subtotal * tax_rate);
    let shipping_amount = round_money(shipping);
    let total_amount = subtotal + tax_amount + shipping_amount;

    OrderTotals {
        subtotal,
        tax_amount,
        shipping_amount,
        total_amount,
    }
}

/// Applies an exclusive row lock where the backend supports one. SQLite
/// has a single writer and no `FOR UPDATE` syntax.
fn lock_rows<E: EntityTrait>(select: Select<E>, backend: DbBackend) -> Select<E> {
    match backend {
        DbBackend::Postgres | DbBackend::MySql => select.lock_exclusive(),
        _ => select,
    }
}

fn order_number_candidate(at: DateTime<Utc>, suffix: &str) -> String {
    format!("GM-{}-{}", at.format("%Y%m%d"), suffix)
}

fn random_suffix(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Input for placing an order
#[derive(Debug, Deserialize)]
pub struct PlaceOrderInput {
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, quantity: i32) -> cart_item::Model {
        cart_item::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity,
            price,
            is_preorder: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn totals_for_the_two_item_cart() {
        // 2,500,000 x2 plus 3,000,000 x1 at 11% tax and flat 50,000 shipping.
        let items = vec![line(dec!(2500000), 2), line(dec!(3000000), 1)];
        let totals = compute_totals(&items, dec!(0.11), dec!(50000));

        assert_eq!(totals.subtotal, dec!(8000000.00));
        assert_eq!(totals.tax_amount, dec!(880000.00));
        assert_eq!(totals.shipping_amount, dec!(50000.00));
        assert_eq!(totals.total_amount, dec!(8930000.00));
    }

    #[test]
    fn tax_rounds_half_up_once() {
        let items = vec![line(dec!(99.99), 1)];
        let totals = compute_totals(&items, dec!(0.11), dec!(10));

        // 99.99 * 0.11 = 10.9989 -> 11.00
        assert_eq!(totals.tax_amount, dec!(11.00));
        assert_eq!(totals.total_amount, dec!(120.99));
    }

    #[test]
    fn order_number_layout() {
        let at = DateTime::parse_from_rfc3339("2026-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = order_number_candidate(at, "A1B2C3");
        assert_eq!(number, "GM-20260305-A1B2C3");
    }

    #[test]
    fn suffix_is_uppercase_alphanumeric() {
        let suffix = random_suffix(6);
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

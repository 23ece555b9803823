use crate::{
    entities::{cart, cart_item, product, Cart, CartItem, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// The identity a cart belongs to. Always passed explicitly; cart
/// resolution never consults ambient session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

/// Shopping cart service: find-or-create carts per identity and manage
/// their line items. Prices are captured at add time; checkout is the only
/// place stock is enforced.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the cart for this identity, creating an empty one if none
    /// exists. Idempotent.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<cart::Model, ServiceError> {
        self.get_or_create_on(&*self.db, owner).await
    }

    /// Cart plus line items (with their products, for display).
    #[instrument(skip(self))]
    pub async fn get_cart_with_items(
        &self,
        owner: &CartOwner,
    ) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_cart(owner).await?;

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let items = rows
            .into_iter()
            .map(|(item, product)| CartLine { item, product })
            .collect();

        Ok(CartWithItems { cart, items })
    }

    /// Adds a product to the identity's cart.
    ///
    /// An existing line for the same product absorbs the quantity and keeps
    /// its originally captured price; otherwise a new line captures the
    /// product's current price and preorder flag at this moment.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        input: AddItemInput,
    ) -> Result<cart_item::Model, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if !product.is_in_stock() {
            return Err(ServiceError::OutOfStock(product.name));
        }

        let cart = self.get_or_create_on(&txn, owner).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        let item = if let Some(item) = existing {
            let merged_quantity = item.quantity + input.quantity;
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(merged_quantity);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?
        } else {
            let now = Utc::now();
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(input.quantity),
                price: Set(product.current_price()),
                is_preorder: Set(product.stock_quantity == 0 && product.allow_preorder),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added product {} x{} to cart {}",
            input.product_id, input.quantity, cart.id
        );
        Ok(item)
    }

    /// Overwrites a line item's quantity. The captured price stays as it
    /// was at add time.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let item = self.owned_item(owner, item_id).await?;
        let cart_id = item.cart_id;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { cart_id, item_id })
            .await;

        Ok(updated)
    }

    /// Removes a line item from the identity's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, owner: &CartOwner, item_id: Uuid) -> Result<(), ServiceError> {
        let item = self.owned_item(owner, item_id).await?;
        let cart_id = item.cart_id;

        item.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;

        Ok(())
    }

    /// Resolves a cart item and verifies it belongs to the cart of the
    /// given identity. A stale id and a foreign cart fail the same way.
    async fn owned_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        let cart = self
            .find_cart(&*self.db, owner)
            .await?
            .ok_or_else(|| ServiceError::NotOwned(item_id.to_string()))?;

        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotOwned(item_id.to_string()))?;

        if item.cart_id != cart.id {
            return Err(ServiceError::NotOwned(item_id.to_string()));
        }

        Ok(item)
    }

    async fn find_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        owner: &CartOwner,
    ) -> Result<Option<cart::Model>, ServiceError> {
        let query = match owner {
            CartOwner::User(user_id) => Cart::find().filter(cart::Column::UserId.eq(*user_id)),
            CartOwner::Session(session_id) => {
                Cart::find().filter(cart::Column::SessionId.eq(session_id.clone()))
            }
        };
        Ok(query.one(conn).await?)
    }

    async fn get_or_create_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        owner: &CartOwner,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = self.find_cart(conn, owner).await? {
            return Ok(cart);
        }

        let (user_id, session_id) = match owner {
            CartOwner::User(user_id) => (Some(*user_id), None),
            CartOwner::Session(session_id) => (None, Some(session_id.clone())),
        };

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_id: Set(session_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let cart = cart.insert(conn).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart.id))
            .await;

        info!("Created cart {} for {:?}", cart.id, owner);
        Ok(cart)
    }
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// One cart line joined with its product for display
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub item: cart_item::Model,
    pub product: Option<product::Model>,
}

/// Cart with its lines
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: cart::Model,
    pub items: Vec<CartLine>,
}

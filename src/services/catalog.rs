use crate::{
    entities::{category, product, Category, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Catalog service: product and category reads for the storefront plus
/// the admin-facing create/update maintenance operations.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Lists products matching the filter, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = Product::find();

        if !filter.include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        if filter.featured.unwrap_or(false) {
            query = query.filter(product::Column::IsFeatured.eq(true));
        }
        if filter.in_stock.unwrap_or(false) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::StockQuantity.gt(0))
                    .add(product::Column::AllowPreorder.eq(true)),
            );
        }
        if let Some(slug) = &filter.category {
            let cat = Category::find()
                .filter(category::Column::Slug.eq(slug.clone()))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", slug)))?;
            query = query.filter(product::Column::CategoryId.eq(cat.id));
        }
        if let Some(search) = &filter.search {
            query = query.filter(product::Column::Name.contains(search));
        }

        let paginator = query
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((products, total))
    }

    /// Fetches an active product by its slug.
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<product::Model, ServiceError> {
        Product::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", slug)))
    }

    /// Featured products for the storefront home page.
    pub async fn featured_products(&self, limit: u64) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::IsFeatured.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Active categories, alphabetical.
    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(Category::find()
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Creates a catalog product.
    #[instrument(skip(self, input), fields(slug = %input.slug, sku = %input.sku))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        validate_pricing(input.price, input.sale_price)?;

        Category::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Category {} not found", input.category_id))
            })?;

        let taken = Product::find()
            .filter(
                Condition::any()
                    .add(product::Column::Slug.eq(input.slug.clone()))
                    .add(product::Column::Sku.eq(input.sku.clone())),
            )
            .count(&*self.db)
            .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(
                "A product with this slug or SKU already exists".to_string(),
            ));
        }

        let product_id = Uuid::new_v4();
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(product_id),
            category_id: Set(input.category_id),
            name: Set(input.name),
            slug: Set(input.slug),
            description: Set(input.description),
            short_description: Set(input.short_description),
            price: Set(input.price),
            sale_price: Set(input.sale_price),
            stock_quantity: Set(input.stock_quantity),
            sku: Set(input.sku),
            breed: Set(input.breed),
            gender: Set(input.gender),
            age_range: Set(input.age_range),
            weight_range: Set(input.weight_range),
            health_info: Set(input.health_info),
            is_featured: Set(input.is_featured),
            is_active: Set(input.is_active),
            allow_preorder: Set(input.allow_preorder),
            expected_availability: Set(input.expected_availability),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = product.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!("Created product: {}", product_id);
        Ok(product)
    }

    /// Updates catalog fields on a product. Pricing changes are validated
    /// against the effective (post-update) price pair.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let existing = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let effective_price = input.price.unwrap_or(existing.price);
        let effective_sale = if input.clear_sale_price {
            None
        } else {
            input.sale_price.or(existing.sale_price)
        };
        validate_pricing(effective_price, effective_sale)?;

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(short_description) = input.short_description {
            active.short_description = Set(Some(short_description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if input.clear_sale_price {
            active.sale_price = Set(None);
        } else if let Some(sale_price) = input.sale_price {
            active.sale_price = Set(Some(sale_price));
        }
        if let Some(stock_quantity) = input.stock_quantity {
            active.stock_quantity = Set(stock_quantity);
        }
        if let Some(is_featured) = input.is_featured {
            active.is_featured = Set(is_featured);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(allow_preorder) = input.allow_preorder {
            active.allow_preorder = Set(allow_preorder);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        Ok(updated)
    }
}

/// A present sale price must undercut the regular price. The original
/// schema never enforced this; the service does.
fn validate_pricing(price: Decimal, sale_price: Option<Decimal>) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "price must not be negative".to_string(),
        ));
    }
    if let Some(sale) = sale_price {
        if sale < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "sale_price must not be negative".to_string(),
            ));
        }
        if sale >= price {
            return Err(ServiceError::ValidationError(
                "sale_price must be less than price".to_string(),
            ));
        }
    }
    Ok(())
}

/// Storefront listing filter
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    /// Category slug
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub in_stock: Option<bool>,
    /// Substring match on the product name
    pub search: Option<String>,
    /// Admin listings may include inactive products
    #[serde(default)]
    pub include_inactive: bool,
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub short_description: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub stock_quantity: i32,
    pub sku: String,
    pub breed: Option<String>,
    pub gender: product::Gender,
    pub age_range: Option<String>,
    pub weight_range: Option<Decimal>,
    pub health_info: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub allow_preorder: bool,
    pub expected_availability: Option<chrono::NaiveDate>,
}

fn default_true() -> bool {
    true
}

/// Input for updating a product; absent fields are left untouched.
/// Setting `clear_sale_price` removes an existing sale price.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub clear_sale_price: bool,
    pub stock_quantity: Option<i32>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
    pub allow_preorder: Option<bool>,
}

/// Product serialized for storefront responses, with the derived pricing
/// fields the frontend renders.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: product::Model,
    pub current_price: Decimal,
    pub is_on_sale: bool,
    pub is_in_stock: bool,
}

impl From<product::Model> for ProductView {
    fn from(product: product::Model) -> Self {
        let current_price = product.current_price();
        let is_on_sale = product.is_on_sale();
        let is_in_stock = product.is_in_stock();
        Self {
            product,
            current_price,
            is_on_sale,
            is_in_stock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sale_price_must_undercut_price() {
        assert!(validate_pricing(dec!(100), Some(dec!(80))).is_ok());
        assert!(validate_pricing(dec!(100), None).is_ok());
        assert!(validate_pricing(dec!(100), Some(dec!(100))).is_err());
        assert!(validate_pricing(dec!(100), Some(dec!(120))).is_err());
        assert!(validate_pricing(dec!(-1), None).is_err());
        assert!(validate_pricing(dec!(100), Some(dec!(-1))).is_err());
    }
}

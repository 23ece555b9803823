use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product entity for the livestock catalog
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub short_description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub sale_price: Option<Decimal>,
    pub stock_quantity: i32,
    #[sea_orm(unique)]
    pub sku: String,
    #[sea_orm(nullable)]
    pub breed: Option<String>,
    pub gender: Gender,
    #[sea_orm(nullable)]
    pub age_range: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))", nullable)]
    pub weight_range: Option<Decimal>,
    #[sea_orm(column_type = "Text", nullable)]
    pub health_info: Option<String>,
    pub is_featured: bool,
    pub is_active: bool,
    pub allow_preorder: bool,
    #[sea_orm(nullable)]
    pub expected_availability: Option<Date>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Effective selling price: the sale price when one is set, otherwise
    /// the regular price.
    pub fn current_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }

    pub fn is_on_sale(&self) -> bool {
        matches!(self.sale_price, Some(sale) if sale < self.price)
    }

    /// Purchasable: physical stock remains, or the product accepts preorders.
    pub fn is_in_stock(&self) -> bool {
        self.stock_quantity > 0 || self.allow_preorder
    }
}

/// Animal gender enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[sea_orm(string_value = "male")]
    Male,
    #[sea_orm(string_value = "female")]
    Female,
    #[sea_orm(string_value = "mixed")]
    Mixed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(price: Decimal, sale_price: Option<Decimal>, stock: i32, preorder: bool) -> Model {
        Model {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "Etawa Buck".to_string(),
            slug: "etawa-buck".to_string(),
            description: "Healthy breeding buck".to_string(),
            short_description: None,
            price,
            sale_price,
            stock_quantity: stock,
            sku: "GOAT-001".to_string(),
            breed: Some("Etawa".to_string()),
            gender: Gender::Male,
            age_range: None,
            weight_range: None,
            health_info: None,
            is_featured: false,
            is_active: true,
            allow_preorder: preorder,
            expected_availability: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn current_price_prefers_sale_price() {
        let product = sample(dec!(2500000), Some(dec!(2000000)), 3, false);
        assert_eq!(product.current_price(), dec!(2000000));

        let regular = sample(dec!(2500000), None, 3, false);
        assert_eq!(regular.current_price(), dec!(2500000));
    }

    #[test]
    fn on_sale_requires_lower_sale_price() {
        assert!(sample(dec!(100), Some(dec!(80)), 1, false).is_on_sale());
        assert!(!sample(dec!(100), Some(dec!(100)), 1, false).is_on_sale());
        assert!(!sample(dec!(100), None, 1, false).is_on_sale());
    }

    #[test]
    fn stock_or_preorder_counts_as_in_stock() {
        assert!(sample(dec!(100), None, 5, false).is_in_stock());
        assert!(sample(dec!(100), None, 0, true).is_in_stock());
        assert!(!sample(dec!(100), None, 0, false).is_in_stock());
    }
}

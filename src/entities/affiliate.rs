use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Affiliate profile, one per user.
///
/// The three earnings columns are running counters maintained by the
/// referral ledger: `pending_earnings` accrues at conversion time and moves
/// into `paid_earnings` on payout; `total_earnings` only ever grows.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "affiliates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    /// Commission percentage, e.g. 5.00 for 5%.
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub commission_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_earnings: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub pending_earnings: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub paid_earnings: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::affiliate_referral::Entity")]
    Referrals,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::affiliate_referral::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Referrals.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use crate::{
    config::AppConfig,
    entities::{affiliate, affiliate_referral, Affiliate, AffiliateReferral, ReferralStatus, User},
    errors::ServiceError,
    events::{Event, EventSender},
    services::round_money,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Fallback code stem for names with no usable characters.
const CODE_FALLBACK: &str = "AFF";

/// Affiliate program service: referral-code issuance and the commission
/// ledger. Conversion recording is driven by the event loop after an order
/// commits, never from inside the checkout transaction.
#[derive(Clone)]
pub struct AffiliateService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl AffiliateService {
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

    /// Enrolls a user in the affiliate program with a code derived from
    /// their display name.
    #[instrument(skip(self))]
    pub async fn join_program(&self, user_id: Uuid) -> Result<affiliate::Model, ServiceError> {
        let existing = Affiliate::find()
            .filter(affiliate::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::AlreadyAffiliate);
        }

        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        let code = self.generate_code(&*self.db, &user.name).await?;
        let now = Utc::now();
        let affiliate = affiliate::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            code: Set(code),
            commission_rate: Set(self.config.commission_rate_decimal()),
            total_earnings: Set(Decimal::ZERO),
            pending_earnings: Set(Decimal::ZERO),
            paid_earnings: Set(Decimal::ZERO),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let affiliate = affiliate.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::AffiliateJoined(affiliate.id))
            .await;

        info!("User {} joined affiliate program as {}", user_id, affiliate.code);
        Ok(affiliate)
    }

    /// Looks up an active affiliate by referral code, for attributing a new
    /// registration to its referrer.
    pub async fn resolve_code(&self, code: &str) -> Result<affiliate::Model, ServiceError> {
        Affiliate::find()
            .filter(affiliate::Column::Code.eq(code))
            .filter(affiliate::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Affiliate code {} not found", code)))
    }

    /// The affiliate's dashboard: profile, referral page, and stats.
    #[instrument(skip(self))]
    pub async fn dashboard(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<AffiliateDashboard, ServiceError> {
        let affiliate = Affiliate::find()
            .filter(affiliate::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("User is not enrolled in the affiliate program".to_string())
            })?;

        let paginator = AffiliateReferral::find()
            .filter(affiliate_referral::Column::AffiliateId.eq(affiliate.id))
            .order_by_desc(affiliate_referral::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total_referrals = paginator.num_items().await?;
        let referrals = paginator.fetch_page(page.saturating_sub(1)).await?;

        let total_conversions = AffiliateReferral::find()
            .filter(affiliate_referral::Column::AffiliateId.eq(affiliate.id))
            .filter(affiliate_referral::Column::OrderId.is_not_null())
            .count(&*self.db)
            .await?;

        let conversion_rate = if total_referrals > 0 {
            (Decimal::from(total_conversions) / Decimal::from(total_referrals)
                * Decimal::from(100))
            .round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok(AffiliateDashboard {
            affiliate,
            referrals,
            stats: AffiliateStats {
                total_referrals,
                total_conversions,
                conversion_rate,
            },
        })
    }

    /// Records a referral conversion for a completed order.
    ///
    /// If the purchasing user was referred by someone with an active
    /// affiliate profile and no conversion exists yet for that pair, one
    /// ledger row is created and the affiliate's pending and total earnings
    /// grow by the commission. Returns `None` when there is nothing to
    /// record; recording the same pair twice is a no-op.
    #[instrument(skip(self))]
    pub async fn record_conversion(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        total_amount: Decimal,
    ) -> Result<Option<affiliate_referral::Model>, ServiceError> {
        let buyer = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        let Some(referrer_id) = buyer.referred_by else {
            return Ok(None);
        };

        let txn = self.db.begin().await?;

        let Some(affiliate) = Affiliate::find()
            .filter(affiliate::Column::UserId.eq(referrer_id))
            .filter(affiliate::Column::IsActive.eq(true))
            .one(&txn)
            .await?
        else {
            return Ok(None);
        };

        let already_converted = AffiliateReferral::find()
            .filter(affiliate_referral::Column::AffiliateId.eq(affiliate.id))
            .filter(affiliate_referral::Column::ReferredUserId.eq(user_id))
            .count(&txn)
            .await?;
        if already_converted > 0 {
            return Ok(None);
        }

        let commission =
            round_money(total_amount * affiliate.commission_rate / Decimal::from(100));
        let now = Utc::now();

        let referral = affiliate_referral::ActiveModel {
            id: Set(Uuid::new_v4()),
            affiliate_id: Set(affiliate.id),
            referred_user_id: Set(user_id),
            order_id: Set(Some(order_id)),
            commission_amount: Set(commission),
            status: Set(ReferralStatus::Pending),
            converted_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let referral = referral.insert(&txn).await?;

        let affiliate_id = affiliate.id;
        let pending = affiliate.pending_earnings + commission;
        let total = affiliate.total_earnings + commission;
        let mut active: affiliate::ActiveModel = affiliate.into();
        active.pending_earnings = Set(pending);
        active.total_earnings = Set(total);
        active.updated_at = Set(now);
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReferralConverted {
                affiliate_id,
                order_id,
            })
            .await;

        Ok(Some(referral))
    }

    /// Approves a pending referral commission.
    #[instrument(skip(self))]
    pub async fn approve_referral(
        &self,
        referral_id: Uuid,
    ) -> Result<affiliate_referral::Model, ServiceError> {
        let referral = self.load_referral(&*self.db, referral_id).await?;
        if referral.status != ReferralStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "referral {} is not pending",
                referral_id
            )));
        }

        let mut active: affiliate_referral::ActiveModel = referral.into();
        active.status = Set(ReferralStatus::Approved);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ReferralApproved(referral_id))
            .await;

        Ok(updated)
    }

    /// Marks an approved referral as paid out, moving its commission from
    /// pending to paid earnings.
    #[instrument(skip(self))]
    pub async fn mark_referral_paid(
        &self,
        referral_id: Uuid,
    ) -> Result<affiliate_referral::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let referral = self.load_referral(&txn, referral_id).await?;
        if referral.status != ReferralStatus::Approved {
            return Err(ServiceError::InvalidStatus(format!(
                "referral {} is not approved",
                referral_id
            )));
        }

        let affiliate = Affiliate::find_by_id(referral.affiliate_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Affiliate {} not found", referral.affiliate_id))
            })?;

        let commission = referral.commission_amount;
        let mut referral_active: affiliate_referral::ActiveModel = referral.into();
        referral_active.status = Set(ReferralStatus::Paid);
        referral_active.updated_at = Set(Utc::now());
        let updated = referral_active.update(&txn).await?;

        let pending = affiliate.pending_earnings - commission;
        let paid = affiliate.paid_earnings + commission;
        let mut affiliate_active: affiliate::ActiveModel = affiliate.into();
        affiliate_active.pending_earnings = Set(pending);
        affiliate_active.paid_earnings = Set(paid);
        affiliate_active.updated_at = Set(Utc::now());
        affiliate_active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReferralPaid(referral_id))
            .await;

        Ok(updated)
    }

    async fn load_referral<C: ConnectionTrait>(
        &self,
        conn: &C,
        referral_id: Uuid,
    ) -> Result<affiliate_referral::Model, ServiceError> {
        AffiliateReferral::find_by_id(referral_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Referral {} not found", referral_id)))
    }

    /// Derives a unique referral code from a display name: the uppercased
    /// alphanumeric prefix (max 6 chars), with an incrementing integer
    /// suffix when taken.
    async fn generate_code<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<String, ServiceError> {
        let base = base_code(name);
        let mut candidate = base.clone();
        let mut counter = 1u32;

        while Affiliate::find()
            .filter(affiliate::Column::Code.eq(candidate.clone()))
            .count(conn)
            .await?
            > 0
        {
            candidate = format!("{}{}", base, counter);
            counter += 1;
        }

        Ok(candidate)
    }
}

fn base_code(name: &str) -> String {
    let base: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(6)
        .collect::<String>()
        .to_ascii_uppercase();

    if base.is_empty() {
        CODE_FALLBACK.to_string()
    } else {
        base
    }
}

/// Aggregate counters shown on the dashboard
#[derive(Debug, Serialize)]
pub struct AffiliateStats {
    pub total_referrals: u64,
    pub total_conversions: u64,
    /// Conversion percentage, rounded to 2 decimal places
    pub conversion_rate: Decimal,
}

/// Dashboard payload: profile, referral page, stats
#[derive(Debug, Serialize)]
pub struct AffiliateDashboard {
    pub affiliate: affiliate::Model,
    pub referrals: Vec<affiliate_referral::Model>,
    pub stats: AffiliateStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_code_keeps_alphanumeric_prefix() {
        assert_eq!(base_code("Ahmad Yusuf"), "AHMADY");
        assert_eq!(base_code("Budi"), "BUDI");
        assert_eq!(base_code("a-b c!d2efgh"), "ABCD2E");
    }

    #[test]
    fn base_code_falls_back_when_name_is_unusable() {
        assert_eq!(base_code("!!!"), "AFF");
        assert_eq!(base_code(""), "AFF");
    }
}

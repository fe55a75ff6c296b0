use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::package::Package;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    PendingPayment,
    Active,
    /// Confirmed-paid renewal whose start date has not yet arrived.
    Upcoming,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::PendingPayment => "pending_payment",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Upcoming => "upcoming",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(SubscriptionStatus::PendingPayment),
            "active" => Ok(SubscriptionStatus::Active),
            "upcoming" => Ok(SubscriptionStatus::Upcoming),
            "expired" => Ok(SubscriptionStatus::Expired),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(format!("unknown subscription status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Free,
    Vnpay,
    Momo,
    Manual,
}

/// One billing period for one landlord. Price, name and duration are
/// frozen from the package at creation time; the package reference is
/// never re-resolved for money or dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub landlord_id: Uuid,
    pub package_id: Uuid,
    pub package_name: String,
    /// VND snapshot of the package price, 0 for trials.
    pub amount: u64,
    pub duration_days: i64,
    pub payment_method: PaymentMethod,
    /// Gateway transaction number, set only after a confirmed payment.
    pub payment_id: Option<String>,
    /// Redirect URL while the record is pending, with its own TTL.
    pub payment_url: Option<String>,
    pub payment_url_expires_at: Option<DateTime<Utc>>,
    pub is_trial: bool,
    pub is_renewal: bool,
    pub renewed_from: Option<Uuid>,
    pub renewed_to: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    /// Unset until the first successful payment confirms the duration.
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Trial periods skip the gateway entirely and are born active.
    pub fn trial(landlord_id: Uuid, package: &Package, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            landlord_id,
            package_id: package.id,
            package_name: package.name.clone(),
            amount: 0,
            duration_days: package.duration_days,
            payment_method: PaymentMethod::Free,
            payment_id: None,
            payment_url: None,
            payment_url_expires_at: None,
            is_trial: true,
            is_renewal: false,
            renewed_from: None,
            renewed_to: None,
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: Some(now + Duration::days(package.duration_days)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn purchase(landlord_id: Uuid, package: &Package, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            landlord_id,
            package_id: package.id,
            package_name: package.name.clone(),
            amount: package.price,
            duration_days: package.duration_days,
            payment_method: PaymentMethod::Vnpay,
            payment_id: None,
            payment_url: None,
            payment_url_expires_at: None,
            is_trial: false,
            is_renewal: false,
            renewed_from: None,
            renewed_to: None,
            status: SubscriptionStatus::PendingPayment,
            start_date: now,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A renewal picks up the day after the current period ends.
    pub fn renewal(current: &Subscription, package: &Package, now: DateTime<Utc>) -> Self {
        let start = current
            .end_date
            .map(|end| end + Duration::days(1))
            .unwrap_or(now);
        Self {
            id: Uuid::new_v4(),
            landlord_id: current.landlord_id,
            package_id: package.id,
            package_name: package.name.clone(),
            amount: package.price,
            duration_days: package.duration_days,
            payment_method: PaymentMethod::Vnpay,
            payment_id: None,
            payment_url: None,
            payment_url_expires_at: None,
            is_trial: false,
            is_renewal: true,
            renewed_from: Some(current.id),
            renewed_to: None,
            status: SubscriptionStatus::PendingPayment,
            start_date: start,
            end_date: Some(start + Duration::days(package.duration_days)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.end_date.map_or(false, |end| end > now)
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.end_date
            .map(|end| (end - now).num_days().max(0))
            .unwrap_or(0)
    }

    pub fn payment_url_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.payment_url, self.payment_url_expires_at) {
            (Some(_), Some(expires)) => expires <= now,
            _ => true,
        }
    }

    pub fn usage_stats(&self, now: DateTime<Utc>) -> SubscriptionUsage {
        let total_days = self.duration_days.max(1);
        let elapsed = (now - self.start_date).num_days();
        let days_used = elapsed.clamp(0, total_days);
        let days_left = total_days - days_used;
        let percentage_used = (days_used as f64 / total_days as f64 * 100.0).round();
        let is_active = self.is_currently_active(now);
        let is_expired = self.status == SubscriptionStatus::Expired
            || self.end_date.map_or(false, |end| end <= now);
        let status_message = if is_active {
            format!("{} days remaining on {}", days_left, self.package_name)
        } else if is_expired {
            format!("{} has expired", self.package_name)
        } else {
            format!("subscription is {}", self.status)
        };
        SubscriptionUsage {
            subscription_id: self.id,
            package_name: self.package_name.clone(),
            days_used,
            days_left,
            total_days,
            percentage_used,
            percentage_left: 100.0 - percentage_used,
            is_active,
            is_expired,
            status_message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionUsage {
    pub subscription_id: Uuid,
    pub package_name: String,
    pub days_used: i64,
    pub days_left: i64,
    pub total_days: i64,
    pub percentage_used: f64,
    pub percentage_left: f64,
    pub is_active: bool,
    pub is_expired: bool,
    pub status_message: String,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub package_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub subscription_id: Uuid,
    pub payment_url: String,
    pub payment_url_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalCheckoutResponse {
    pub subscription_id: Uuid,
    pub renewed_from: Uuid,
    pub payment_url: String,
    pub payment_url_expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::package::{CreatePackageRequest, PackageKind};

    fn paid_package(duration_days: i64) -> Package {
        Package::new(CreatePackageRequest {
            name: "Pro".to_string(),
            price: 299_000,
            duration_days,
            room_limit: 50,
            kind: PackageKind::Paid,
            is_active: None,
        })
    }

    #[test]
    fn test_trial_is_born_active_and_free() {
        let now = Utc::now();
        let mut package = paid_package(14);
        package.kind = PackageKind::Trial;
        package.price = 0;

        let sub = Subscription::trial(Uuid::new_v4(), &package, now);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.amount, 0);
        assert!(sub.is_trial);
        assert_eq!(sub.payment_method, PaymentMethod::Free);
        assert_eq!(sub.end_date, Some(now + Duration::days(14)));
    }

    #[test]
    fn test_purchase_is_pending_with_snapshotted_amount() {
        let package = paid_package(30);
        let sub = Subscription::purchase(Uuid::new_v4(), &package, Utc::now());
        assert_eq!(sub.status, SubscriptionStatus::PendingPayment);
        assert_eq!(sub.amount, 299_000);
        assert_eq!(sub.duration_days, 30);
        assert!(sub.end_date.is_none());
        assert!(!sub.is_renewal);
    }

    #[test]
    fn test_renewal_starts_after_current_period() {
        let now = Utc::now();
        let package = paid_package(30);
        let mut current = Subscription::purchase(Uuid::new_v4(), &package, now);
        current.status = SubscriptionStatus::Active;
        current.end_date = Some(now + Duration::days(10));

        let renewal = Subscription::renewal(&current, &package, now);
        assert!(renewal.is_renewal);
        assert_eq!(renewal.renewed_from, Some(current.id));
        assert_eq!(renewal.start_date, now + Duration::days(11));
        assert_eq!(renewal.end_date, Some(now + Duration::days(41)));
    }

    #[test]
    fn test_payment_url_expiry_detection() {
        let now = Utc::now();
        let package = paid_package(30);
        let mut sub = Subscription::purchase(Uuid::new_v4(), &package, now);

        // No URL at all counts as expired so a retry always regenerates.
        assert!(sub.payment_url_expired(now));

        sub.payment_url = Some("https://pay.example/redirect".to_string());
        sub.payment_url_expires_at = Some(now + Duration::minutes(15));
        assert!(!sub.payment_url_expired(now));
        assert!(sub.payment_url_expired(now + Duration::minutes(16)));
    }

    #[test]
    fn test_usage_stats_math() {
        let now = Utc::now();
        let package = paid_package(30);
        let mut sub = Subscription::purchase(Uuid::new_v4(), &package, now - Duration::days(12));
        sub.status = SubscriptionStatus::Active;
        sub.start_date = now - Duration::days(12);
        sub.end_date = Some(now + Duration::days(18));

        let stats = sub.usage_stats(now);
        assert_eq!(stats.total_days, 30);
        assert_eq!(stats.days_used, 12);
        assert_eq!(stats.days_left, 18);
        assert_eq!(stats.percentage_used, 40.0);
        assert_eq!(stats.percentage_left, 60.0);
        assert!(stats.is_active);
        assert!(!stats.is_expired);
        assert!(stats.status_message.contains("18 days remaining"));
    }

    #[test]
    fn test_usage_stats_clamps_past_the_end() {
        let now = Utc::now();
        let package = paid_package(30);
        let mut sub = Subscription::purchase(Uuid::new_v4(), &package, now - Duration::days(45));
        sub.status = SubscriptionStatus::Expired;
        sub.start_date = now - Duration::days(45);
        sub.end_date = Some(now - Duration::days(15));

        let stats = sub.usage_stats(now);
        assert_eq!(stats.days_used, 30);
        assert_eq!(stats.days_left, 0);
        assert!(!stats.is_active);
        assert!(stats.is_expired);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SubscriptionStatus::PendingPayment,
            SubscriptionStatus::Active,
            SubscriptionStatus::Upcoming,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>(), Ok(status));
        }
        assert!("settled".parse::<SubscriptionStatus>().is_err());
    }
}

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::models::{
    common::PaginatedResponse,
    package::Package,
    subscription::{
        CheckoutResponse, PaymentMethod, RenewalCheckoutResponse, Subscription,
        SubscriptionStatus, SubscriptionUsage,
    },
};
use crate::services::{
    database::DatabaseService,
    mailer::{Mailer, PaymentSuccessMail, TrialWelcomeMail},
    vnpay::{OrderKind, VnpayService},
};

/// Serializes mutating ledger operations per landlord. The "at most one
/// active / one pending" invariants are enforced by check-then-insert,
/// which is only sound while no two requests for the same landlord can
/// interleave between the check and the write.
#[derive(Clone, Default)]
struct LandlordLocks {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl LandlordLocks {
    async fn acquire(&self, landlord_id: Uuid) -> OwnedMutexGuard<()> {
        let existing = {
            let map = self.inner.read().await;
            map.get(&landlord_id).cloned()
        };
        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut map = self.inner.write().await;
                map.entry(landlord_id)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };
        lock.lock_owned().await
    }

    /// Drops entries nobody is holding or waiting on. The map otherwise
    /// grows by one entry per landlord ever seen; the sweep calls this
    /// after each run.
    async fn prune(&self) {
        let mut map = self.inner.write().await;
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct SweepOutcome {
    pub expired: usize,
    pub promoted: usize,
}

/// The subscription ledger: every billing-period state transition goes
/// through here. Handlers stay thin; this service owns the state machine
/// and its invariants.
#[derive(Clone)]
pub struct SubscriptionService {
    db: DatabaseService,
    vnpay: VnpayService,
    mailer: Arc<dyn Mailer>,
    locks: LandlordLocks,
    renewal_window_days: i64,
}

impl SubscriptionService {
    pub fn new(
        db: DatabaseService,
        vnpay: VnpayService,
        mailer: Arc<dyn Mailer>,
        app: AppConfig,
    ) -> Self {
        Self {
            db,
            vnpay,
            mailer,
            locks: LandlordLocks::default(),
            renewal_window_days: app.renewal_window_days,
        }
    }

    /// One-time free trial. Born active, no gateway involved.
    pub async fn start_trial(&self, landlord_id: Uuid) -> Result<Subscription, ApiError> {
        let _guard = self.locks.acquire(landlord_id).await;
        let now = Utc::now();

        let history = self.db.subscriptions_by_landlord(&landlord_id).await?;
        if history.iter().any(|sub| sub.is_trial) {
            return Err(ApiError::Conflict(
                "the free trial has already been used on this account".to_string(),
            ));
        }
        if let Some(active) = history.iter().find(|sub| sub.is_currently_active(now)) {
            return Err(ApiError::Conflict(format!(
                "you already have an active plan with {} days remaining",
                active.days_remaining(now)
            )));
        }

        let package = self
            .db
            .find_active_trial_package()
            .await?
            .ok_or_else(|| anyhow::anyhow!("no active trial package is configured"))?;

        let subscription = Subscription::trial(landlord_id, &package, now);
        self.db.create_subscription(&subscription).await?;
        log::info!(
            "trial started for landlord {} until {:?}",
            landlord_id,
            subscription.end_date
        );

        self.notify_trial_started(&subscription, &package);
        Ok(subscription)
    }

    /// Creates (or reuses) a pending purchase and returns the gateway
    /// redirect. Retried purchases for the same package reuse the same
    /// pending row; only the redirect URL is refreshed once its TTL has
    /// passed.
    pub async fn buy_package(
        &self,
        landlord_id: Uuid,
        package_id: Uuid,
        client_ip: &str,
    ) -> Result<CheckoutResponse, ApiError> {
        let _guard = self.locks.acquire(landlord_id).await;
        let now = Utc::now();

        let package = self
            .db
            .get_package(&package_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("package not found".to_string()))?;
        if !package.is_active {
            return Err(ApiError::Validation(
                "this package is no longer available".to_string(),
            ));
        }
        if package.kind == crate::models::package::PackageKind::Trial {
            return Err(ApiError::Validation(
                "the trial package cannot be purchased".to_string(),
            ));
        }

        if package.room_limit >= 0 {
            let active_rooms = self.db.count_active_rooms(&landlord_id).await?;
            if !package.allows_room_count(active_rooms) {
                return Err(ApiError::Conflict(format!(
                    "this package allows at most {} active rooms but you currently have {}",
                    package.room_limit, active_rooms
                )));
            }
        }

        let history = self.db.subscriptions_by_landlord(&landlord_id).await?;
        // A running trial does not block a purchase; another paid plan does.
        if let Some(active) = history
            .iter()
            .find(|sub| !sub.is_trial && sub.is_currently_active(now))
        {
            return Err(ApiError::Conflict(format!(
                "you already have an active plan with {} days remaining",
                active.days_remaining(now)
            )));
        }

        if let Some(pending) = history.iter().find(|sub| {
            sub.status == SubscriptionStatus::PendingPayment
                && !sub.is_renewal
                && sub.package_id == package.id
        }) {
            let mut pending = pending.clone();
            if pending.payment_url_expired(now) {
                self.refresh_payment_url(&mut pending, OrderKind::Purchase, client_ip)
                    .await?;
            }
            return Ok(checkout_response(&pending)?);
        }

        let mut subscription = Subscription::purchase(landlord_id, &package, now);
        self.db.create_subscription(&subscription).await?;
        self.refresh_payment_url(&mut subscription, OrderKind::Purchase, client_ip)
            .await?;
        log::info!(
            "purchase {} created for landlord {} (package {})",
            subscription.id,
            landlord_id,
            package.name
        );
        Ok(checkout_response(&subscription)?)
    }

    /// Chains a renewal onto the current active subscription. The
    /// forward/backward link is established before payment confirmation
    /// so the UI can show a renewal in flight; cancellation and orphan
    /// cleanup unwind it.
    pub async fn renew_package(
        &self,
        landlord_id: Uuid,
        client_ip: &str,
    ) -> Result<RenewalCheckoutResponse, ApiError> {
        let _guard = self.locks.acquire(landlord_id).await;
        let now = Utc::now();

        let history = self.db.subscriptions_by_landlord(&landlord_id).await?;
        let current = history
            .iter()
            .find(|sub| sub.is_currently_active(now))
            .cloned()
            .ok_or_else(|| {
                ApiError::Conflict("there is no active subscription to renew".to_string())
            })?;
        if current.is_trial {
            return Err(ApiError::Conflict(
                "trial plans cannot be renewed; purchase a package instead".to_string(),
            ));
        }

        let package = self
            .db
            .get_package(&current.package_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("package {} vanished from catalog", current.package_id))?;
        if !package.is_active {
            return Err(ApiError::Conflict(
                "your current package is no longer offered and cannot be renewed".to_string(),
            ));
        }

        let days_left = current.days_remaining(now);
        if days_left > self.renewal_window_days {
            return Err(ApiError::Conflict(format!(
                "renewal opens within {} days of expiry, you still have {} days remaining",
                self.renewal_window_days, days_left
            )));
        }

        if let Some(existing) = history.iter().find(|sub| {
            sub.renewed_from == Some(current.id)
                && matches!(
                    sub.status,
                    SubscriptionStatus::PendingPayment | SubscriptionStatus::Upcoming
                )
        }) {
            if existing.status == SubscriptionStatus::Upcoming {
                return Err(ApiError::Conflict(
                    "a confirmed renewal is already scheduled for this subscription".to_string(),
                ));
            }
            let mut existing = existing.clone();
            if existing.payment_url_expired(now) {
                self.refresh_payment_url(&mut existing, OrderKind::Renewal, client_ip)
                    .await?;
            }
            return Ok(renewal_response(&existing)?);
        }

        let mut renewal = Subscription::renewal(&current, &package, now);
        self.db.create_subscription(&renewal).await?;

        let mut current = current;
        current.renewed_to = Some(renewal.id);
        current.updated_at = now;
        self.db.update_subscription(&current).await?;

        self.refresh_payment_url(&mut renewal, OrderKind::Renewal, client_ip)
            .await?;
        log::info!(
            "renewal {} chained from {} for landlord {}",
            renewal.id,
            current.id,
            landlord_id
        );
        Ok(renewal_response(&renewal)?)
    }

    /// Reconciles a gateway callback into the ledger. Duplicate callbacks
    /// for an already-settled record short-circuit to success; a record
    /// still pending is never mutated before its signature verifies.
    pub async fn payment_callback(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Subscription, ApiError> {
        let order_info = params
            .get("vnp_OrderInfo")
            .ok_or_else(|| ApiError::Validation("missing order reference".to_string()))?;
        let subscription_id = Uuid::parse_str(order_info)
            .map_err(|_| ApiError::Validation("invalid order reference".to_string()))?;

        let probe = self
            .db
            .get_subscription(&subscription_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("unknown order reference".to_string()))?;
        let _guard = self.locks.acquire(probe.landlord_id).await;
        let mut subscription = self
            .db
            .get_subscription(&subscription_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("unknown order reference".to_string()))?;

        match subscription.status {
            SubscriptionStatus::Active | SubscriptionStatus::Upcoming => {
                log::info!(
                    "duplicate callback for settled subscription {}, ignoring",
                    subscription.id
                );
                return Ok(subscription);
            }
            SubscriptionStatus::PendingPayment => {}
            other => {
                return Err(ApiError::Conflict(format!(
                    "subscription is {} and can no longer be settled",
                    other
                )));
            }
        }

        if !self.vnpay.verify_callback(params) {
            log::warn!(
                "signature verification failed for subscription {}",
                subscription.id
            );
            return Err(ApiError::Gateway("invalid payment signature".to_string()));
        }

        let response_code = params
            .get("vnp_ResponseCode")
            .map(String::as_str)
            .unwrap_or("");
        if response_code != "00" {
            log::warn!(
                "gateway declined subscription {} with code '{}'",
                subscription.id,
                response_code
            );
            return Err(ApiError::Gateway(format!(
                "payment was not completed, gateway code '{}'",
                response_code
            )));
        }

        let now = Utc::now();

        // The stored flag is authoritative; the txn-ref prefix is only a
        // cross-check against misrouted callbacks.
        let ref_says_renewal = params
            .get("vnp_TxnRef")
            .map(|txn_ref| txn_ref.starts_with(OrderKind::Renewal.txn_prefix()))
            .unwrap_or(false);
        if ref_says_renewal != subscription.is_renewal {
            log::warn!(
                "txn-ref prefix disagrees with renewal flag on subscription {}",
                subscription.id
            );
        }

        if subscription.end_date.is_none() {
            subscription.end_date =
                Some(subscription.start_date + Duration::days(subscription.duration_days));
        }

        if subscription.is_renewal {
            subscription.status = if subscription.start_date > now {
                SubscriptionStatus::Upcoming
            } else {
                SubscriptionStatus::Active
            };
        } else {
            subscription.status = SubscriptionStatus::Active;
            self.expire_active_trials(subscription.landlord_id).await?;
        }

        subscription.payment_id = params.get("vnp_TransactionNo").cloned();
        subscription.payment_url = None;
        subscription.payment_url_expires_at = None;
        subscription.updated_at = now;
        self.db.update_subscription(&subscription).await?;
        log::info!(
            "subscription {} settled as {} (txn {:?})",
            subscription.id,
            subscription.status,
            subscription.payment_id
        );

        self.cancel_orphaned_pending_renewals(subscription.landlord_id, subscription.id)
            .await?;

        self.notify_payment_success(&subscription);
        Ok(subscription)
    }

    /// Explicit cancellation of a non-trial active or upcoming record.
    /// Cancelling an upcoming renewal unwinds the chain so the parent can
    /// be renewed again.
    pub async fn cancel_subscription(
        &self,
        landlord_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<Subscription, ApiError> {
        let _guard = self.locks.acquire(landlord_id).await;
        let now = Utc::now();

        let mut subscription = self
            .db
            .get_subscription(&subscription_id)
            .await?
            .filter(|sub| sub.landlord_id == landlord_id)
            .ok_or_else(|| ApiError::NotFound("subscription not found".to_string()))?;

        if subscription.is_trial {
            return Err(ApiError::Conflict(
                "trial subscriptions cannot be cancelled".to_string(),
            ));
        }
        if !matches!(
            subscription.status,
            SubscriptionStatus::Active | SubscriptionStatus::Upcoming
        ) {
            return Err(ApiError::Conflict(format!(
                "cannot cancel a {} subscription",
                subscription.status
            )));
        }

        if subscription.status == SubscriptionStatus::Upcoming {
            if let Some(parent_id) = subscription.renewed_from {
                if let Some(mut parent) = self.db.get_subscription(&parent_id).await? {
                    if parent.renewed_to == Some(subscription.id) {
                        parent.renewed_to = None;
                        parent.updated_at = now;
                        self.db.update_subscription(&parent).await?;
                    }
                }
            }
        }

        subscription.status = SubscriptionStatus::Cancelled;
        subscription.updated_at = now;
        self.db.update_subscription(&subscription).await?;
        log::info!(
            "subscription {} cancelled by landlord {}",
            subscription.id,
            landlord_id
        );
        Ok(subscription)
    }

    /// Scheduled sweep: `active` past its end date becomes `expired`, and
    /// `upcoming` whose start date has arrived is promoted to `active`
    /// (or straight to `expired` when its whole window has passed).
    pub async fn run_expiry_sweep(&self) -> anyhow::Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();

        for candidate in self
            .db
            .subscriptions_by_status(SubscriptionStatus::Active)
            .await?
        {
            let _guard = self.locks.acquire(candidate.landlord_id).await;
            let now = Utc::now();
            if let Some(mut sub) = self.db.get_subscription(&candidate.id).await? {
                if sub.status == SubscriptionStatus::Active
                    && sub.end_date.map_or(false, |end| end < now)
                {
                    sub.status = SubscriptionStatus::Expired;
                    sub.updated_at = now;
                    self.db.update_subscription(&sub).await?;
                    outcome.expired += 1;
                }
            }
        }

        for candidate in self
            .db
            .subscriptions_by_status(SubscriptionStatus::Upcoming)
            .await?
        {
            let _guard = self.locks.acquire(candidate.landlord_id).await;
            let now = Utc::now();
            if let Some(mut sub) = self.db.get_subscription(&candidate.id).await? {
                if sub.status != SubscriptionStatus::Upcoming || sub.start_date > now {
                    continue;
                }
                if sub.end_date.map_or(false, |end| end < now) {
                    sub.status = SubscriptionStatus::Expired;
                    outcome.expired += 1;
                } else {
                    sub.status = SubscriptionStatus::Active;
                    outcome.promoted += 1;
                }
                sub.updated_at = now;
                self.db.update_subscription(&sub).await?;
            }
        }

        self.locks.prune().await;

        if outcome.expired > 0 || outcome.promoted > 0 {
            log::info!(
                "expiry sweep: {} expired, {} promoted",
                outcome.expired,
                outcome.promoted
            );
        }
        Ok(outcome)
    }

    // Entitlement gate

    pub async fn has_active_subscription(&self, landlord_id: Uuid) -> Result<bool, ApiError> {
        let now = Utc::now();
        let history = self.db.subscriptions_by_landlord(&landlord_id).await?;
        Ok(history.iter().any(|sub| sub.is_currently_active(now)))
    }

    /// Uniform guard for feature controllers that require a usable plan.
    pub async fn ensure_entitlement(&self, landlord_id: Uuid) -> Result<(), ApiError> {
        if self.has_active_subscription(landlord_id).await? {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "an active subscription is required for this feature".to_string(),
            ))
        }
    }

    // History / query API

    /// Paginated billing history, newest first. Pending records are
    /// internal bookkeeping and stay hidden unless asked for explicitly.
    pub async fn list_history(
        &self,
        landlord_id: Uuid,
        status: Option<SubscriptionStatus>,
        page: u32,
        limit: u32,
    ) -> Result<PaginatedResponse<Subscription>, ApiError> {
        let history = self.db.subscriptions_by_landlord(&landlord_id).await?;
        let filtered: Vec<Subscription> = history
            .into_iter()
            .filter(|sub| match status {
                Some(wanted) => sub.status == wanted,
                None => sub.status != SubscriptionStatus::PendingPayment,
            })
            .collect();
        Ok(PaginatedResponse::from_full_list(filtered, page, limit))
    }

    /// Detail lookup. An ownership mismatch reads as not-found so ids
    /// cannot be probed across tenants.
    pub async fn subscription_detail(
        &self,
        requester_id: Uuid,
        requester_is_admin: bool,
        subscription_id: Uuid,
    ) -> Result<Subscription, ApiError> {
        self.db
            .get_subscription(&subscription_id)
            .await?
            .filter(|sub| requester_is_admin || sub.landlord_id == requester_id)
            .ok_or_else(|| ApiError::NotFound("subscription not found".to_string()))
    }

    pub async fn current_stats(&self, landlord_id: Uuid) -> Result<SubscriptionUsage, ApiError> {
        let now = Utc::now();
        let history = self.db.subscriptions_by_landlord(&landlord_id).await?;
        let current = history
            .iter()
            .find(|sub| sub.is_currently_active(now))
            .or_else(|| {
                history
                    .iter()
                    .find(|sub| sub.status != SubscriptionStatus::PendingPayment)
            })
            .ok_or_else(|| ApiError::NotFound("you have no subscription yet".to_string()))?;
        Ok(current.usage_stats(now))
    }

    // Internals

    async fn refresh_payment_url(
        &self,
        subscription: &mut Subscription,
        kind: OrderKind,
        client_ip: &str,
    ) -> Result<(), ApiError> {
        let redirect = self
            .vnpay
            .build_redirect(&subscription.id, subscription.amount, kind, client_ip);
        subscription.payment_url = Some(redirect.url);
        subscription.payment_url_expires_at = Some(redirect.expires_at);
        subscription.payment_method = PaymentMethod::Vnpay;
        subscription.updated_at = Utc::now();
        self.db.update_subscription(subscription).await?;
        Ok(())
    }

    /// A paid purchase supersedes any running trial immediately.
    async fn expire_active_trials(&self, landlord_id: Uuid) -> Result<(), ApiError> {
        let now = Utc::now();
        for mut sub in self.db.subscriptions_by_landlord(&landlord_id).await? {
            if sub.is_trial && sub.status == SubscriptionStatus::Active {
                sub.status = SubscriptionStatus::Expired;
                sub.updated_at = now;
                self.db.update_subscription(&sub).await?;
                log::info!("trial {} superseded by paid purchase", sub.id);
            }
        }
        Ok(())
    }

    /// Only one renewal survives a confirmation cycle; stray pending
    /// renewals from retried attempts are cancelled and unchained.
    async fn cancel_orphaned_pending_renewals(
        &self,
        landlord_id: Uuid,
        settled_id: Uuid,
    ) -> Result<(), ApiError> {
        let now = Utc::now();
        for mut orphan in self.db.subscriptions_by_landlord(&landlord_id).await? {
            if orphan.id == settled_id
                || !orphan.is_renewal
                || orphan.status != SubscriptionStatus::PendingPayment
            {
                continue;
            }
            if let Some(parent_id) = orphan.renewed_from {
                if let Some(mut parent) = self.db.get_subscription(&parent_id).await? {
                    if parent.renewed_to == Some(orphan.id) {
                        parent.renewed_to = None;
                        parent.updated_at = now;
                        self.db.update_subscription(&parent).await?;
                    }
                }
            }
            orphan.status = SubscriptionStatus::Cancelled;
            orphan.updated_at = now;
            self.db.update_subscription(&orphan).await?;
            log::info!("orphaned pending renewal {} cancelled", orphan.id);
        }
        Ok(())
    }

    fn notify_trial_started(&self, subscription: &Subscription, package: &Package) {
        let db = self.db.clone();
        let mailer = self.mailer.clone();
        let subscription = subscription.clone();
        let max_rooms = package.room_limit;
        tokio::spawn(async move {
            let landlord = match db.get_landlord(&subscription.landlord_id).await {
                Ok(Some(landlord)) => landlord,
                Ok(None) => {
                    log::warn!(
                        "no landlord record {} for trial mail",
                        subscription.landlord_id
                    );
                    return;
                }
                Err(err) => {
                    log::warn!("landlord lookup failed for trial mail: {:#}", err);
                    return;
                }
            };
            let mail = TrialWelcomeMail {
                to: landlord.email,
                full_name: landlord.full_name,
                duration_days: subscription.duration_days,
                start_date: subscription.start_date,
                end_date: subscription
                    .end_date
                    .unwrap_or(subscription.start_date),
                max_rooms,
            };
            if let Err(err) = mailer.send_trial_welcome(mail).await {
                log::warn!("trial welcome mail failed: {}", err);
            }
        });
    }

    fn notify_payment_success(&self, subscription: &Subscription) {
        let db = self.db.clone();
        let mailer = self.mailer.clone();
        let subscription = subscription.clone();
        tokio::spawn(async move {
            let landlord = match db.get_landlord(&subscription.landlord_id).await {
                Ok(Some(landlord)) => landlord,
                Ok(None) => {
                    log::warn!(
                        "no landlord record {} for payment mail",
                        subscription.landlord_id
                    );
                    return;
                }
                Err(err) => {
                    log::warn!("landlord lookup failed for payment mail: {:#}", err);
                    return;
                }
            };
            let mail = PaymentSuccessMail {
                to: landlord.email,
                full_name: landlord.full_name,
                action: if subscription.is_renewal {
                    "renewal".to_string()
                } else {
                    "activation".to_string()
                },
                package_name: subscription.package_name.clone(),
                duration_days: subscription.duration_days,
                amount: subscription.amount,
                start_date: subscription.start_date,
                end_date: subscription
                    .end_date
                    .unwrap_or(subscription.start_date),
                transaction_no: subscription.payment_id.clone().unwrap_or_default(),
            };
            if let Err(err) = mailer.send_payment_success(mail).await {
                log::warn!("payment confirmation mail failed: {}", err);
            }
        });
    }
}

fn checkout_response(subscription: &Subscription) -> Result<CheckoutResponse, ApiError> {
    Ok(CheckoutResponse {
        subscription_id: subscription.id,
        payment_url: subscription
            .payment_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("pending subscription lost its payment url"))?,
        payment_url_expires_at: subscription
            .payment_url_expires_at
            .ok_or_else(|| anyhow::anyhow!("pending subscription lost its url expiry"))?,
    })
}

fn renewal_response(subscription: &Subscription) -> Result<RenewalCheckoutResponse, ApiError> {
    Ok(RenewalCheckoutResponse {
        subscription_id: subscription.id,
        renewed_from: subscription
            .renewed_from
            .ok_or_else(|| anyhow::anyhow!("renewal record missing its parent link"))?,
        payment_url: subscription
            .payment_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("pending renewal lost its payment url"))?,
        payment_url_expires_at: subscription
            .payment_url_expires_at
            .ok_or_else(|| anyhow::anyhow!("pending renewal lost its url expiry"))?,
    })
}

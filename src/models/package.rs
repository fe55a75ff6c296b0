use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Sentinel for packages without a room cap.
pub const UNLIMITED_ROOMS: i64 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    Trial,
    Paid,
}

/// Reference data consulted by the ledger. Price and duration are
/// snapshotted onto each subscription at creation time, so editing a
/// package never rewrites billing history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    /// VND, whole units. The gateway receives this scaled by 100.
    pub price: u64,
    pub duration_days: i64,
    /// Maximum active rooms allowed under this plan, -1 for unlimited.
    pub room_limit: i64,
    pub kind: PackageKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePackageRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    pub price: u64,
    #[validate(range(min = 1, message = "Duration must be at least one day"))]
    pub duration_days: i64,
    #[validate(range(min = -1, message = "Room limit must be -1 (unlimited) or a positive count"))]
    pub room_limit: i64,
    pub kind: PackageKind,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePackageRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    pub price: Option<u64>,
    #[validate(range(min = 1, message = "Duration must be at least one day"))]
    pub duration_days: Option<i64>,
    #[validate(range(min = -1, message = "Room limit must be -1 (unlimited) or a positive count"))]
    pub room_limit: Option<i64>,
    pub is_active: Option<bool>,
}

impl Package {
    pub fn new(request: CreatePackageRequest) -> Self {
        let now = Utc::now();
        // Trial plans are free no matter what price was submitted.
        let price = match request.kind {
            PackageKind::Trial => 0,
            PackageKind::Paid => request.price,
        };
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            price,
            duration_days: request.duration_days,
            room_limit: request.room_limit,
            kind: request.kind,
            is_active: request.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_update(&mut self, request: UpdatePackageRequest) {
        if let Some(name) = request.name {
            self.name = name;
        }
        if let Some(price) = request.price {
            self.price = price;
        }
        if let Some(duration_days) = request.duration_days {
            self.duration_days = duration_days;
        }
        if let Some(room_limit) = request.room_limit {
            self.room_limit = room_limit;
        }
        if let Some(is_active) = request.is_active {
            self.is_active = is_active;
        }
        if self.kind == PackageKind::Trial {
            self.price = 0;
        }
        self.updated_at = Utc::now();
    }

    pub fn allows_room_count(&self, active_rooms: u64) -> bool {
        self.room_limit == UNLIMITED_ROOMS || active_rooms as i64 <= self.room_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(kind: PackageKind, price: u64) -> CreatePackageRequest {
        CreatePackageRequest {
            name: "Starter".to_string(),
            price,
            duration_days: 30,
            room_limit: 10,
            kind,
            is_active: None,
        }
    }

    #[test]
    fn test_trial_price_pinned_to_zero_on_create() {
        let package = Package::new(create_request(PackageKind::Trial, 499_000));
        assert_eq!(package.price, 0);

        let package = Package::new(create_request(PackageKind::Paid, 499_000));
        assert_eq!(package.price, 499_000);
    }

    #[test]
    fn test_trial_price_pinned_to_zero_on_update() {
        let mut package = Package::new(create_request(PackageKind::Trial, 0));
        package.apply_update(UpdatePackageRequest {
            name: None,
            price: Some(120_000),
            duration_days: None,
            room_limit: None,
            is_active: None,
        });
        assert_eq!(package.price, 0);
    }

    #[test]
    fn test_room_limit_gate() {
        let mut package = Package::new(create_request(PackageKind::Paid, 100_000));
        assert!(package.allows_room_count(10));
        assert!(!package.allows_room_count(11));

        package.room_limit = UNLIMITED_ROOMS;
        assert!(package.allows_room_count(10_000));
    }
}

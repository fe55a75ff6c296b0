use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Landlord directory entry, owned by the wider platform. The billing
/// service only reads it to address confirmation emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landlord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Landlord {
    pub fn new(full_name: String, email: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name,
            email: email.to_lowercase(),
            created_at: Utc::now(),
        }
    }
}

/// Building/floor/room chain, also owned by the platform. The ledger
/// traverses it only to count a landlord's active rooms when gating a
/// capacity-limited purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: Uuid,
    pub landlord_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Floor {
    pub id: Uuid,
    pub building_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub floor_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub is_deleted: bool,
}

impl Building {
    pub fn new(landlord_id: Uuid, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            landlord_id,
            name,
            is_active: true,
            is_deleted: false,
        }
    }
}

impl Floor {
    pub fn new(building_id: Uuid, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            building_id,
            name,
            is_active: true,
            is_deleted: false,
        }
    }
}

impl Room {
    pub fn new(floor_id: Uuid, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            floor_id,
            name,
            is_active: true,
            is_deleted: false,
        }
    }
}

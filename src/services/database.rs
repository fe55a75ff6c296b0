use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;
use uuid::Uuid;

use crate::models::{
    package::Package,
    property::{Building, Floor, Landlord, Room},
    subscription::{Subscription, SubscriptionStatus},
};

/// Record ids are our own uuids; `record::id(id)` projects them back out
/// as plain strings so entities round-trip through serde unchanged.
const PROJECTION: &str = "*, record::id(id) AS id";

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Db>,
}

impl DatabaseService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = if database_url.starts_with("memory://") {
            Surreal::new::<Mem>(()).await?
        } else if let Some(path) = database_url.strip_prefix("file://") {
            Surreal::new::<RocksDb>(path).await?
        } else {
            return Err(anyhow!("Unsupported database URL: {}", database_url));
        };

        db.use_ns("rently").use_db("billing").await?;

        let service = Self { db };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db
            .query(
                "
                DEFINE INDEX IF NOT EXISTS sub_landlord ON subscriptions COLUMNS landlord_id;
                DEFINE INDEX IF NOT EXISTS sub_status ON subscriptions COLUMNS status;
                DEFINE INDEX IF NOT EXISTS pkg_kind ON packages COLUMNS kind;
                DEFINE INDEX IF NOT EXISTS building_landlord ON buildings COLUMNS landlord_id;
                DEFINE INDEX IF NOT EXISTS floor_building ON floors COLUMNS building_id;
                DEFINE INDEX IF NOT EXISTS room_floor ON rooms COLUMNS floor_id;
            ",
            )
            .await?
            .check()?;

        log::info!("database schema initialized");
        Ok(())
    }

    /// Create-or-replace a document under `table:<uuid>`. The struct's
    /// own `id` field is stripped from the content so it never collides
    /// with the record id.
    async fn put<T: Serialize>(&self, table: &str, id: &Uuid, value: &T) -> Result<()> {
        let mut data = serde_json::to_value(value)?;
        if let Some(object) = data.as_object_mut() {
            object.remove("id");
        }
        self.db
            .query("UPSERT type::thing($table, $id) CONTENT $data RETURN NONE")
            .bind(("table", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("data", data))
            .await?
            .check()?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, table: &str, id: &Uuid) -> Result<Option<T>> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM type::thing($table, $id)",
                PROJECTION
            ))
            .bind(("table", table.to_string()))
            .bind(("id", id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    // Package catalog

    pub async fn create_package(&self, package: &Package) -> Result<()> {
        self.put("packages", &package.id, package).await
    }

    pub async fn update_package(&self, package: &Package) -> Result<()> {
        self.put("packages", &package.id, package).await
    }

    pub async fn get_package(&self, id: &Uuid) -> Result<Option<Package>> {
        self.get("packages", id).await
    }

    pub async fn list_packages(&self, only_active: bool) -> Result<Vec<Package>> {
        let query = if only_active {
            format!(
                "SELECT {} FROM packages WHERE is_active = true ORDER BY created_at DESC",
                PROJECTION
            )
        } else {
            format!("SELECT {} FROM packages ORDER BY created_at DESC", PROJECTION)
        };
        let mut response = self.db.query(query).await?;
        Ok(response.take(0)?)
    }

    /// The single trial plan offered to new landlords. More than one
    /// active trial package is a configuration mistake; the first match
    /// wins and the ledger treats absence as a server error.
    pub async fn find_active_trial_package(&self) -> Result<Option<Package>> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM packages WHERE kind = 'trial' AND is_active = true LIMIT 1",
                PROJECTION
            ))
            .await?;
        Ok(response.take(0)?)
    }

    // Subscription ledger

    pub async fn create_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.put("subscriptions", &subscription.id, subscription).await
    }

    pub async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.put("subscriptions", &subscription.id, subscription).await
    }

    pub async fn get_subscription(&self, id: &Uuid) -> Result<Option<Subscription>> {
        self.get("subscriptions", id).await
    }

    pub async fn subscriptions_by_landlord(&self, landlord_id: &Uuid) -> Result<Vec<Subscription>> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM subscriptions WHERE landlord_id = $landlord ORDER BY created_at DESC",
                PROJECTION
            ))
            .bind(("landlord", landlord_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn subscriptions_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> Result<Vec<Subscription>> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM subscriptions WHERE status = $status",
                PROJECTION
            ))
            .bind(("status", status.as_str().to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    // Landlord directory (read side owned by the platform)

    pub async fn create_landlord(&self, landlord: &Landlord) -> Result<()> {
        self.put("landlords", &landlord.id, landlord).await
    }

    pub async fn get_landlord(&self, id: &Uuid) -> Result<Option<Landlord>> {
        self.get("landlords", id).await
    }

    // Room-usage counter

    pub async fn create_building(&self, building: &Building) -> Result<()> {
        self.put("buildings", &building.id, building).await
    }

    pub async fn create_floor(&self, floor: &Floor) -> Result<()> {
        self.put("floors", &floor.id, floor).await
    }

    pub async fn create_room(&self, room: &Room) -> Result<()> {
        self.put("rooms", &room.id, room).await
    }

    /// Active, non-deleted rooms under active, non-deleted floors and
    /// buildings. Freshness matters more than speed here: the count gates
    /// capacity-limited purchases, so it is always computed on demand.
    pub async fn count_active_rooms(&self, landlord_id: &Uuid) -> Result<u64> {
        #[derive(Deserialize)]
        struct IdRow {
            id: Uuid,
        }

        let mut response = self
            .db
            .query(
                "SELECT record::id(id) AS id FROM buildings \
                 WHERE landlord_id = $landlord AND is_active = true AND is_deleted = false",
            )
            .bind(("landlord", landlord_id.to_string()))
            .await?;
        let buildings: Vec<IdRow> = response.take(0)?;
        if buildings.is_empty() {
            return Ok(0);
        }
        let building_ids: Vec<String> =
            buildings.iter().map(|row| row.id.to_string()).collect();

        let mut response = self
            .db
            .query(
                "SELECT record::id(id) AS id FROM floors \
                 WHERE building_id IN $buildings AND is_active = true AND is_deleted = false",
            )
            .bind(("buildings", building_ids))
            .await?;
        let floors: Vec<IdRow> = response.take(0)?;
        if floors.is_empty() {
            return Ok(0);
        }
        let floor_ids: Vec<String> = floors.iter().map(|row| row.id.to_string()).collect();

        let mut response = self
            .db
            .query(
                "SELECT count() FROM rooms \
                 WHERE floor_id IN $floors AND is_active = true AND is_deleted = false \
                 GROUP ALL",
            )
            .bind(("floors", floor_ids))
            .await?;
        let counts: Vec<serde_json::Value> = response.take(0)?;
        Ok(extract_count(&counts))
    }

    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}

fn extract_count(result: &[serde_json::Value]) -> u64 {
    result
        .first()
        .and_then(|value| value.get("count"))
        .and_then(|value| value.as_u64())
        .unwrap_or(0)
}

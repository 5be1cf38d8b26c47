use chrono::{DateTime, Utc};

use rtls_domain::Device;

/// Device row for PostgreSQL storage with timestamp metadata
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub id: i64,
    pub serial: String,
    pub name: String,
    pub device_profile_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            serial: row.serial,
            name: row.name,
        }
    }
}

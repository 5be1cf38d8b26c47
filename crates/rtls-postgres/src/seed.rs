use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::client::PostgresClient;

const DEVICE_TYPES: [&str; 3] = ["GPS", "WEATHER", "CO2Meter"];

struct ProfileSeed {
    name: &'static str,
    description: &'static str,
    type_name: &'static str,
}

fn device_profiles() -> Vec<ProfileSeed> {
    vec![
        ProfileSeed {
            name: "GPS",
            description: "GPS",
            type_name: "GPS",
        },
        ProfileSeed {
            name: "WEATHER",
            description: "WEATHER",
            type_name: "WEATHER",
        },
        ProfileSeed {
            name: "CO2Meter",
            description: "CO2Meter",
            type_name: "CO2Meter",
        },
    ]
}

struct GroupSeed {
    name: &'static str,
    group_type: Option<&'static str>,
    attributes: Option<serde_json::Value>,
    sub_groups: Vec<GroupSeed>,
}

fn line(name: &'static str) -> GroupSeed {
    GroupSeed {
        name,
        group_type: Some("LINE"),
        attributes: Some(json!({ "polygon": [[1, 2], [3, 4], [5, 6]] })),
        sub_groups: Vec::new(),
    }
}

fn plant(name: &'static str, city: &'static str, sub_groups: Vec<GroupSeed>) -> GroupSeed {
    GroupSeed {
        name,
        group_type: Some("PLANT"),
        attributes: Some(json!({ "city": city })),
        sub_groups,
    }
}

fn country(name: &'static str, sub_groups: Vec<GroupSeed>) -> GroupSeed {
    GroupSeed {
        name,
        group_type: Some("COUNTRY"),
        attributes: None,
        sub_groups,
    }
}

fn region(name: &'static str, sub_groups: Vec<GroupSeed>) -> GroupSeed {
    GroupSeed {
        name,
        group_type: Some("REGION"),
        attributes: None,
        sub_groups,
    }
}

fn group_catalog() -> Vec<GroupSeed> {
    vec![
        region(
            "EMEA",
            vec![
                country(
                    "Morocco",
                    vec![
                        plant(
                            "M7",
                            "Tanger",
                            vec![line("IP LHD"), line("FRANK SP"), line("FRUNC GCL")],
                        ),
                        plant("M1", "Tanger", Vec::new()),
                        plant("M2", "Tanger", Vec::new()),
                        plant("M3", "Tanger", Vec::new()),
                        plant("M4", "Meknes", Vec::new()),
                        plant("M5", "Oujda", Vec::new()),
                    ],
                ),
                country("Tunisia", Vec::new()),
                country("Romania", Vec::new()),
            ],
        ),
        region("APAC", Vec::new()),
    ]
}

/// One-time catalog bootstrap: device types, device profiles, and the
/// organizational group hierarchy. Types and profiles are upserted by name;
/// the group tree is rebuilt from scratch on every run.
pub struct CatalogSeeder {
    client: PostgresClient,
}

impl CatalogSeeder {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    pub async fn run(&self) -> Result<()> {
        self.seed_device_types().await?;
        self.seed_device_profiles().await?;
        self.seed_groups().await?;
        info!("catalog seeding complete");
        Ok(())
    }

    async fn seed_device_types(&self) -> Result<()> {
        let conn = self.client.get_connection().await?;
        let now = Utc::now();

        for name in DEVICE_TYPES {
            conn.execute(
                "INSERT INTO device_types (name, created_at, updated_at)
                 VALUES ($1, $2, $2)
                 ON CONFLICT (name) DO UPDATE SET updated_at = EXCLUDED.updated_at",
                &[&name, &now],
            )
            .await
            .with_context(|| format!("failed to seed device type {}", name))?;
        }

        debug!(count = DEVICE_TYPES.len(), "seeded device types");
        Ok(())
    }

    async fn seed_device_profiles(&self) -> Result<()> {
        let conn = self.client.get_connection().await?;
        let now = Utc::now();

        for profile in device_profiles() {
            let type_id: i64 = conn
                .query_one(
                    "SELECT id FROM device_types WHERE name = $1",
                    &[&profile.type_name],
                )
                .await
                .with_context(|| format!("device type {} missing", profile.type_name))?
                .get(0);

            conn.execute(
                "INSERT INTO device_profiles (name, description, device_type_id, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $4)
                 ON CONFLICT (name) DO UPDATE
                 SET description = EXCLUDED.description,
                     device_type_id = EXCLUDED.device_type_id,
                     updated_at = EXCLUDED.updated_at",
                &[&profile.name, &profile.description, &type_id, &now],
            )
            .await
            .with_context(|| format!("failed to seed device profile {}", profile.name))?;
        }

        debug!("seeded device profiles");
        Ok(())
    }

    async fn seed_groups(&self) -> Result<()> {
        let conn = self.client.get_connection().await?;

        conn.execute("DELETE FROM groups", &[])
            .await
            .context("failed to clear groups")?;

        // Depth-first over the catalog; children are pushed with the id
        // their parent row just received.
        let mut stack: Vec<(GroupSeed, Option<i64>)> = group_catalog()
            .into_iter()
            .rev()
            .map(|group| (group, None))
            .collect();
        let now = Utc::now();

        while let Some((group, parent_id)) = stack.pop() {
            let row = conn
                .query_one(
                    "INSERT INTO groups (name, group_type, parent_id, attributes, created_at)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING id",
                    &[
                        &group.name,
                        &group.group_type,
                        &parent_id,
                        &group.attributes,
                        &now,
                    ],
                )
                .await
                .with_context(|| format!("failed to insert group {}", group.name))?;
            let id: i64 = row.get(0);

            for sub in group.sub_groups.into_iter().rev() {
                stack.push((sub, Some(id)));
            }
        }

        info!("seeded group hierarchy");
        Ok(())
    }
}

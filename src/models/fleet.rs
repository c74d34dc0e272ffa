use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Truck {
    pub id: i64,
    pub registration_num: String,
    pub model: Option<String>,
    pub capacity_tons: Option<i64>,
    pub owner_id: Option<i64>,
}

impl Truck {
    pub fn model_text(&self) -> &str {
        self.model.as_deref().unwrap_or("unknown model")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Driver {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub license_number: Option<String>,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: i64,
    pub client_name: String,
    pub billing_address: Option<String>,
    pub contact_person: Option<String>,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shipment {
    pub id: i64,
    pub trip_id: i64,
    pub goods_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Maintenance {
    pub id: i64,
    pub truck_id: i64,
    pub maintenance_date: NaiveDate,
    pub description: Option<String>,
}

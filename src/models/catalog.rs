use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Weapon type reference entry (Handgun, Rifle, ...).
#[derive(Debug, Clone, Serialize)]
pub struct WeaponType {
    pub id: i64,
    #[serde(rename = "type")]
    pub type_name: String,
    pub nickname: String,
    /// Higher popularity sorts earlier in dropdowns.
    pub popularity: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Caliber {
    pub id: i64,
    pub caliber: String,
    pub nickname: String,
    pub popularity: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manufacturer {
    pub id: i64,
    pub name: String,
    pub nickname: String,
    pub country: String,
    pub popularity: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

fn require_name(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationFailed(format!("{} is required", what)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateWeaponType {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub popularity: i32,
}

impl CreateWeaponType {
    pub fn validate(&self) -> Result<()> {
        require_name(&self.type_name, "Type")
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCaliber {
    pub caliber: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub popularity: i32,
}

impl CreateCaliber {
    pub fn validate(&self) -> Result<()> {
        require_name(&self.caliber, "Caliber")
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateManufacturer {
    pub name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub popularity: i32,
}

impl CreateManufacturer {
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name, "Name")
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A firearm record owned by a user.
#[derive(Debug, Clone, Serialize)]
pub struct Gun {
    pub id: i64,
    pub owner_id: i64,
    pub weapon_type_id: i64,
    pub caliber_id: i64,
    pub manufacturer_id: i64,
    pub name: String,
    /// Acquisition date as YYYY-MM-DD, if known.
    pub acquired: Option<String>,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A gun joined with its reference catalog display names.
#[derive(Debug, Clone, Serialize)]
pub struct GunWithRefs {
    #[serde(flatten)]
    pub gun: Gun,
    pub weapon_type: String,
    pub caliber: String,
    pub manufacturer: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGun {
    pub name: String,
    pub weapon_type_id: i64,
    pub caliber_id: i64,
    pub manufacturer_id: i64,
    pub acquired: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl CreateGun {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationFailed("Name is required".into()));
        }
        if let Some(date) = self.acquired.as_deref() {
            if !date.is_empty()
                && chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err()
            {
                return Err(AppError::ValidationFailed(
                    "Invalid acquired date format".into(),
                ));
            }
        }
        Ok(())
    }
}

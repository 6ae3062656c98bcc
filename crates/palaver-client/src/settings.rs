//! Typed application settings, persisted as a single JSON row.

use serde::{Deserialize, Serialize};

use palaver_store::Database;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub display_name: Option<String>,
    pub notifications_enabled: bool,
    /// Reconnect the relay automatically after sign-in.
    pub auto_connect_relay: bool,
    pub theme: String,
    pub api_base_url: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            display_name: None,
            notifications_enabled: true,
            auto_connect_relay: true,
            theme: "dark".into(),
            api_base_url: String::new(),
        }
    }
}

impl AppSettings {
    /// Load settings from the store, falling back to defaults when nothing
    /// has been saved yet.
    pub fn load(db: &Database) -> Result<Self> {
        match db.get_settings_json()? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| ClientError::InvalidInput(format!("corrupt settings JSON: {e}"))),
            None => Ok(Self::default()),
        }
    }

    /// Persist settings, replacing any previous value.
    pub fn save(&self, db: &Database) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| ClientError::InvalidInput(format!("failed to serialize settings: {e}")))?;
        db.put_settings_json(&json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_defaults_then_round_trip() {
        let db = Database::open_in_memory().unwrap();

        let settings = AppSettings::load(&db).unwrap();
        assert_eq!(settings, AppSettings::default());

        let mut changed = settings;
        changed.display_name = Some("Nadia".into());
        changed.theme = "light".into();
        changed.save(&db).unwrap();

        let reloaded = AppSettings::load(&db).unwrap();
        assert_eq!(reloaded.display_name.as_deref(), Some("Nadia"));
        assert_eq!(reloaded.theme, "light");
    }
}

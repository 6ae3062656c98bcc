//! Single-row JSON settings storage.
//!
//! The client keeps its typed settings struct; the store only round-trips
//! the serialized blob.

use rusqlite::params;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Load the stored settings JSON, if any has ever been saved.
    pub fn get_settings_json(&self) -> Result<Option<String>> {
        let result: std::result::Result<String, _> =
            self.conn()
                .query_row("SELECT json FROM app_settings WHERE id = 1", [], |row| {
                    row.get(0)
                });

        match result {
            Ok(json) => Ok(Some(json)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// Persist the settings JSON, replacing any previous value.
    pub fn put_settings_json(&self, json: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO app_settings (id, json) VALUES (1, ?1)",
            params![json],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_settings_json().unwrap(), None);

        db.put_settings_json(r#"{"theme":"dark"}"#).unwrap();
        db.put_settings_json(r#"{"theme":"light"}"#).unwrap();

        assert_eq!(
            db.get_settings_json().unwrap().as_deref(),
            Some(r#"{"theme":"light"}"#)
        );
    }
}

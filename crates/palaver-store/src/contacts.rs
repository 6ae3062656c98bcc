//! CRUD operations for [`Contact`] records.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;

use palaver_shared::types::{Presence, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Contact;

impl Database {
    /// Insert a contact, or refresh the display name and presence if the
    /// user is already known.
    pub fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn().execute(
            "INSERT INTO contacts (user_id, display_name, presence, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 presence     = excluded.presence",
            params![
                contact.user_id.as_str(),
                contact.display_name,
                contact.presence.as_str(),
                contact
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, user_id: &UserId) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT user_id, display_name, presence, created_at
                 FROM contacts WHERE user_id = ?1",
                params![user_id.as_str()],
                row_to_contact,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all contacts, ordered by display name.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, display_name, presence, created_at
             FROM contacts
             ORDER BY display_name ASC",
        )?;

        let rows = stmt.query_map([], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Update a contact's presence.  Returns `true` if the contact exists.
    pub fn set_presence(&self, user_id: &UserId, presence: Presence) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE contacts SET presence = ?2 WHERE user_id = ?1",
            params![user_id.as_str(), presence.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_contact(&self, user_id: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM contacts WHERE user_id = ?1",
            params![user_id.as_str()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let user_id: String = row.get(0)?;
    let display_name: String = row.get(1)?;
    let presence_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    let presence = Presence::parse(&presence_str).unwrap_or(Presence::Unknown);

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Contact {
        user_id: UserId(user_id),
        display_name,
        presence,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_presence_update() {
        let db = Database::open_in_memory().unwrap();

        let contact = Contact {
            user_id: UserId("user-1".into()),
            display_name: "Nadia".into(),
            presence: Presence::Unknown,
            created_at: Utc::now(),
        };
        db.upsert_contact(&contact).unwrap();
        db.upsert_contact(&contact).unwrap();

        assert_eq!(db.list_contacts().unwrap().len(), 1);

        assert!(db.set_presence(&contact.user_id, Presence::Online).unwrap());
        let stored = db.get_contact(&contact.user_id).unwrap();
        assert_eq!(stored.presence, Presence::Online);

        assert!(!db.set_presence(&UserId("absent".into()), Presence::Offline).unwrap());
    }
}

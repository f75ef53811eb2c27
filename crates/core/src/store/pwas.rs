//! Record CRUD operations.

use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::{PwaPage, PwaRecord, SortOrder, User};
use crate::Error;
use crate::db::Db;

const COLUMNS: &str = "id, manifest_url, manifest_json, name, short_name, description, start_url, icon_url,
    background_color, theme_color, user_id, user_name, user_email, lighthouse_score, created, updated";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PwaRecord> {
    let user_id: Option<String> = row.get(10)?;
    Ok(PwaRecord {
        id: row.get(0)?,
        manifest_url: row.get(1)?,
        manifest: row.get(2)?,
        name: row.get(3)?,
        short_name: row.get(4)?,
        description: row.get(5)?,
        start_url: row.get(6)?,
        icon_url: row.get(7)?,
        background_color: row.get(8)?,
        theme_color: row.get(9)?,
        user: match user_id {
            Some(id) => Some(User { id, name: row.get(11)?, email: row.get(12)? }),
            None => None,
        },
        lighthouse_score: row.get(13)?,
        created: row.get(14)?,
        updated: row.get(15)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation)
}

impl Db {
    pub async fn count_pwas(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM pwas", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Fetch `limit` records from `start`, plus one extra row to detect a next page.
    pub async fn list_pwas(&self, start: u64, limit: u64, sort: SortOrder) -> Result<PwaPage, Error> {
        let order = match sort {
            SortOrder::Newest => "created DESC, id ASC",
            SortOrder::Score => "lighthouse_score IS NULL, lighthouse_score DESC, created DESC, id ASC",
        };
        let sql = format!("SELECT {COLUMNS} FROM pwas ORDER BY {order} LIMIT ?1 OFFSET ?2");

        self.conn
            .call(move |conn| -> Result<PwaPage, Error> {
                let mut stmt = conn.prepare(&sql)?;
                let offset = i64::try_from(start).unwrap_or(i64::MAX);
                let rows = stmt.query_map(params![(limit + 1) as i64, offset], row_to_record)?;
                let mut pwas = rows.collect::<Result<Vec<_>, _>>()?;

                let has_more = pwas.len() as u64 > limit;
                pwas.truncate(limit as usize);

                Ok(PwaPage { pwas, has_more })
            })
            .await
            .map_err(Error::from)
    }

    pub async fn find_pwa(&self, id: &str) -> Result<PwaRecord, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<PwaRecord, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM pwas WHERE id = ?1"))?;

                let result = stmt.query_row(params![id], row_to_record);
                match result {
                    Ok(pwa) => Ok(pwa),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound(id)),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    pub async fn insert_pwa(&self, pwa: &PwaRecord) -> Result<(), Error> {
        let pwa = pwa.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let user = pwa.user.as_ref();
                let result = conn.execute(
                    &format!(
                        "INSERT INTO pwas ({COLUMNS})
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                    ),
                    params![
                        &pwa.id,
                        &pwa.manifest_url,
                        &pwa.manifest,
                        &pwa.name,
                        &pwa.short_name,
                        &pwa.description,
                        &pwa.start_url,
                        &pwa.icon_url,
                        &pwa.background_color,
                        &pwa.theme_color,
                        user.map(|u| &u.id),
                        user.and_then(|u| u.name.as_ref()),
                        user.and_then(|u| u.email.as_ref()),
                        &pwa.lighthouse_score,
                        &pwa.created,
                        &pwa.updated,
                    ],
                );

                match result {
                    Ok(_) => Ok(()),
                    Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists(pwa.id.clone())),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Replace every stored field except `id` and `created`.
    pub async fn update_pwa(&self, pwa: &PwaRecord) -> Result<(), Error> {
        let pwa = pwa.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let user = pwa.user.as_ref();
                let changed = conn.execute(
                    "UPDATE pwas SET
                        manifest_url = ?2,
                        manifest_json = ?3,
                        name = ?4,
                        short_name = ?5,
                        description = ?6,
                        start_url = ?7,
                        icon_url = ?8,
                        background_color = ?9,
                        theme_color = ?10,
                        user_id = ?11,
                        user_name = ?12,
                        user_email = ?13,
                        lighthouse_score = ?14,
                        updated = ?15
                    WHERE id = ?1",
                    params![
                        &pwa.id,
                        &pwa.manifest_url,
                        &pwa.manifest,
                        &pwa.name,
                        &pwa.short_name,
                        &pwa.description,
                        &pwa.start_url,
                        &pwa.icon_url,
                        &pwa.background_color,
                        &pwa.theme_color,
                        user.map(|u| &u.id),
                        user.and_then(|u| u.name.as_ref()),
                        user.and_then(|u| u.email.as_ref()),
                        &pwa.lighthouse_score,
                        &pwa.updated,
                    ],
                )?;

                if changed == 0 {
                    return Err(Error::NotFound(pwa.id.clone()));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn delete_pwa(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let deleted = conn.execute("DELETE FROM pwas WHERE id = ?1", params![&id])?;
                if deleted == 0 {
                    return Err(Error::NotFound(id));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

use anyhow::Result;
use campus_types::models::{ItemRef, ItemSummary, OwnerSummary};
use rusqlite::{OptionalExtension, Row, params};

use crate::Database;
use crate::queries::parse_col;

impl Database {
    /// Resolve a listing reference to its summary. `None` when the listing
    /// no longer exists (conversations outlive deleted listings).
    pub fn resolve_item(&self, item: &ItemRef) -> Result<Option<ItemSummary>> {
        self.with_conn(|conn| {
            let summary = match item {
                ItemRef::LostItem(id) | ItemRef::FoundItem(id) => {
                    let table = if matches!(item, ItemRef::LostItem(_)) { "lost_items" } else { "found_items" };
                    let sql = format!(
                        "SELECT i.id, i.title, i.category, i.status, u.id, u.name, u.email
                         FROM {table} i LEFT JOIN users u ON u.id = i.user_id
                         WHERE i.id = ?1"
                    );
                    conn.query_row(&sql, params![id], |row| {
                        let (id, title, category, status) =
                            (row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?);
                        let user = owner_from_row(row, 4)?;
                        Ok(match item {
                            ItemRef::LostItem(_) => ItemSummary::LostItem { id, title, category, status, user },
                            _ => ItemSummary::FoundItem { id, title, category, status, user },
                        })
                    })
                    .optional()?
                }
                ItemRef::Book(id) => conn
                    .query_row(
                        "SELECT b.id, b.title, b.author, b.type, b.available, u.id, u.name, u.email
                         FROM books b LEFT JOIN users u ON u.id = b.owner_id
                         WHERE b.id = ?1",
                        params![id],
                        |row| {
                            Ok(ItemSummary::Book {
                                id: row.get(0)?,
                                title: row.get(1)?,
                                author: row.get(2)?,
                                kind: row.get(3)?,
                                available: row.get(4)?,
                                owner: owner_from_row(row, 5)?,
                            })
                        },
                    )
                    .optional()?,
                ItemRef::Event(id) => conn
                    .query_row(
                        "SELECT e.id, e.title, e.date, e.venue, u.id, u.name, u.email
                         FROM events e LEFT JOIN users u ON u.id = e.posted_by
                         WHERE e.id = ?1",
                        params![id],
                        |row| {
                            Ok(ItemSummary::Event {
                                id: row.get(0)?,
                                title: row.get(1)?,
                                date: parse_col(row, 2)?,
                                venue: row.get(3)?,
                                posted_by: owner_from_row(row, 4)?,
                            })
                        },
                    )
                    .optional()?,
            };
            Ok(summary)
        })
    }
}

/// Reads (id, name, email) starting at `start`; the id is NULL when the
/// owner row is gone.
fn owner_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<OwnerSummary>> {
    if row.get::<_, Option<String>>(start)?.is_none() {
        return Ok(None);
    }
    Ok(Some(OwnerSummary {
        id: parse_col(row, start)?,
        name: row.get(start + 1)?,
        email: row.get(start + 2)?,
    }))
}

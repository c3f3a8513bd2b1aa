//! Generic, identity-keyed entity store.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{AttributeColumns, AttributeRow, group_by_row};
use exn::ResultExt;
use reel_codec::{Entity, Record, Value, entity_name, flatten, unflatten};
use sqlx::SqliteConnection;
use std::marker::PhantomData;
use time::UtcDateTime;
use tracing::instrument;

/// Persistent table of one entity type.
///
/// Rows are keyed by the entity's optional integer identity. Every write is
/// preceded by a lookup on that identity so there is at most one row per
/// identity: storing an entity whose identity is already known overwrites the
/// existing row field by field, anything else creates a new row. Entities
/// without an identity always create a new row.
///
/// Each operation runs in its own transaction and commits before returning.
/// A failed write leaves previously committed rows untouched.
pub struct EntityStore<E> {
    db: Database,
    entity: String,
    _marker: PhantomData<fn() -> E>,
}
impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            entity: self.entity.clone(),
            _marker: PhantomData,
        }
    }
}
impl<E> std::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore").field("entity", &self.entity).finish()
    }
}

impl<E: Entity> EntityStore<E> {
    /// Bind a store for `E` to the given database.
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            entity: entity_name::<E>(),
            _marker: PhantomData,
        }
    }

    /// Storage name of the bound entity type.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Insert or overwrite a single entity.
    ///
    /// Returns [`ErrorKind::Serialization`] (and writes nothing) if the entity
    /// cannot be flattened into a mapping.
    #[instrument(skip_all, fields(entity = %self.entity, id = ?entity.id()))]
    pub async fn store_data(&self, entity: &E) -> Result<()> {
        let record = flatten(entity).or_raise(|| ErrorKind::Serialization(self.entity.clone()))?;
        let _gate = self.db.write_gate().await;
        let mut tx = self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        self.write(&mut tx, entity.id(), &record).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Insert or overwrite several entities in a single transaction: either
    /// all of them are committed or none are.
    #[instrument(skip_all, fields(entity = %self.entity, count = entities.len()))]
    pub async fn store_all(&self, entities: &[E]) -> Result<()> {
        let records = entities
            .iter()
            .map(|entity| {
                flatten(entity)
                    .map(|record| (entity.id(), record))
                    .or_raise(|| ErrorKind::Serialization(self.entity.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let _gate = self.db.write_gate().await;
        let mut tx = self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for (id, record) in &records {
            self.write(&mut tx, *id, record).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn write(&self, conn: &mut SqliteConnection, id: Option<i64>, record: &Record) -> Result<i64> {
        let now = UtcDateTime::now().unix_timestamp();
        let existing = match id {
            Some(id) => self.find_row(&mut *conn, id).await?,
            None => None,
        };
        let row_id = match existing {
            Some(row_id) => {
                sqlx::query(include_str!("../queries/touch_record.sql"))
                    .bind(now)
                    .bind(row_id)
                    .execute(&mut *conn)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                row_id
            },
            None => sqlx::query_scalar::<_, i64>(include_str!("../queries/insert_record.sql"))
                .bind(&self.entity)
                .bind(id)
                .bind(now)
                .fetch_one(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?,
        };
        Self::write_attributes(&mut *conn, row_id, record.iter()).await?;
        tracing::trace!(row_id, updated = existing.is_some(), "Wrote record");
        Ok(row_id)
    }

    async fn write_attributes<'a>(
        conn: &mut SqliteConnection,
        row_id: i64,
        attributes: impl Iterator<Item = (&'a String, &'a Value)>,
    ) -> Result<()> {
        for (key, value) in attributes {
            let columns = AttributeColumns::from(value);
            sqlx::query(include_str!("../queries/upsert_attribute.sql"))
                .bind(row_id)
                .bind(key)
                .bind(columns.kind)
                .bind(columns.int_value)
                .bind(columns.real_value)
                .bind(columns.text_value)
                .bind(columns.blob_value)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(())
    }

    /// Overwrite only the named fields of the stored row with identity `id`,
    /// taking their values from `entity`. Every other field keeps its stored
    /// value.
    ///
    /// Never inserts: returns `false` (and writes nothing) when no row has
    /// that identity. Names that are not declared fields are ignored.
    #[instrument(skip(self, entity), fields(entity = %self.entity))]
    pub async fn patch_data(&self, id: i64, entity: &E, fields: &[&str]) -> Result<bool> {
        let record = flatten(entity).or_raise(|| ErrorKind::Serialization(self.entity.clone()))?;
        let _gate = self.db.write_gate().await;
        let mut tx = self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        let Some(row_id) = self.find_row(&mut tx, id).await? else {
            return Ok(false);
        };
        sqlx::query(include_str!("../queries/touch_record.sql"))
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(row_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let patched = record.iter().filter(|(key, _)| fields.contains(&key.as_str()));
        Self::write_attributes(&mut tx, row_id, patched).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(true)
    }

    // =========================================================================
    // Read
    // =========================================================================

    async fn find_row(&self, conn: &mut SqliteConnection, id: i64) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(include_str!("../queries/find_row_by_identity.sql"))
            .bind(&self.entity)
            .bind(id)
            .fetch_optional(conn)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Find the entity with the given identity.
    ///
    /// Should the one-row-per-identity invariant ever be violated, the oldest
    /// row wins.
    #[instrument(skip(self), fields(entity = %self.entity))]
    pub async fn find_data(&self, id: i64) -> Result<Option<E>> {
        let mut conn = self.db.pool().acquire().await.or_raise(|| ErrorKind::Database)?;
        let Some(row_id) = self.find_row(&mut conn, id).await? else {
            return Ok(None);
        };
        let rows: Vec<AttributeRow> = sqlx::query_as(include_str!("../queries/list_attributes_for_row.sql"))
            .bind(row_id)
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some((_, record)) = group_by_row(rows)?.into_iter().next() else {
            return Ok(None);
        };
        unflatten::<E>(&record).map(Some).or_raise(|| ErrorKind::InvalidData("entity"))
    }

    /// Every stored entity of this type, in insertion order.
    ///
    /// If any single row fails to decode the whole call fails; no partial
    /// results are returned.
    #[instrument(skip(self), fields(entity = %self.entity))]
    pub async fn fetch_all_data(&self) -> Result<Vec<E>> {
        let rows: Vec<AttributeRow> = sqlx::query_as(include_str!("../queries/list_attributes_for_entity.sql"))
            .bind(&self.entity)
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        group_by_row(rows)?
            .into_iter()
            .map(|(_, record)| unflatten::<E>(&record).or_raise(|| ErrorKind::InvalidData("entity")))
            .collect()
    }

    /// Number of stored rows of this type.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_for_entity.sql"))
            .bind(&self.entity)
            .fetch_one(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete the row matching the entity's identity.
    ///
    /// An entity without an identity, or whose identity is not stored, has
    /// nothing to delete; that is not an error. Returns whether a row was
    /// removed.
    #[instrument(skip_all, fields(entity = %self.entity, id = ?entity.id()))]
    pub async fn delete(&self, entity: &E) -> Result<bool> {
        let Some(id) = entity.id() else {
            return Ok(false);
        };
        let _gate = self.db.write_gate().await;
        let mut tx = self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        let Some(row_id) = self.find_row(&mut tx, id).await? else {
            return Ok(false);
        };
        sqlx::query(include_str!("../queries/delete_record.sql"))
            .bind(row_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(true)
    }

    /// Delete every row of this type. Returns the number of rows removed.
    #[instrument(skip(self), fields(entity = %self.entity))]
    pub async fn delete_all_data(&self) -> Result<u64> {
        let _gate = self.db.write_gate().await;
        let result = sqlx::query(include_str!("../queries/delete_all_for_entity.sql"))
            .bind(&self.entity)
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}

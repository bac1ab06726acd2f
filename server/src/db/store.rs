//! PostgreSQL implementation of the engine's document store.
//!
//! Documents live in one `documents` table keyed by database, collection
//! and the hex form of their ObjectId. The engine is synchronous, so every
//! call blocks the current thread on the runtime handle. Callers must be on
//! a blocking thread (see [`crate::error::run_blocking`]).

use docsync_engine::{
    path, store, Document, DocumentCursor, DocumentStore, Error, FieldSet, Filter, FindOptions,
    Namespace, ObjectId, Result, SortOrder,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::VecDeque;
use tokio::runtime::Handle;

/// Blocking document store over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    handle: Handle,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }
}

/// Check if a SQL error is a unique constraint violation.
fn is_unique_violation(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        // PostgreSQL unique violation code is "23505"
        db_err.code().map(|c| c == "23505").unwrap_or(false)
    } else {
        false
    }
}

fn store_error(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

fn insert_error(e: sqlx::Error, id: &ObjectId) -> Error {
    if is_unique_violation(&e) {
        Error::DuplicateKey(id.to_string())
    } else {
        store_error(e)
    }
}

fn order_clause(sort: Option<SortOrder>) -> &'static str {
    match sort {
        Some(SortOrder::IdAscending) => "ORDER BY id ASC",
        Some(SortOrder::IdDescending) => "ORDER BY id DESC",
        None => "ORDER BY seq ASC",
    }
}

/// Rows fetched per round trip while a cursor is drained.
const PAGE_SIZE: usize = 500;

fn find_sql(sort: Option<SortOrder>) -> String {
    format!(
        r#"
        SELECT doc::text FROM documents
        WHERE database = $1 AND collection = $2 AND doc::jsonb @> $3::jsonb
        {}
        LIMIT $4 OFFSET $5
        "#,
        order_clause(sort)
    )
}

/// Rows to request for the next page, or `None` once the limit is spent.
fn next_page_size(remaining: Option<usize>) -> Option<usize> {
    match remaining {
        Some(0) => None,
        Some(n) => Some(n.min(PAGE_SIZE)),
        None => Some(PAGE_SIZE),
    }
}

/// Cursor that fetches matching rows one page at a time.
struct PagedFind<'a> {
    store: &'a PgDocumentStore,
    sql: String,
    database: String,
    collection: String,
    containment: String,
    remaining: Option<usize>,
    offset: usize,
    page: VecDeque<String>,
    exhausted: bool,
}

impl PagedFind<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let Some(size) = next_page_size(self.remaining) else {
            self.exhausted = true;
            return Ok(());
        };

        let rows: Vec<String> = self
            .store
            .handle
            .block_on(
                sqlx::query_scalar(&self.sql)
                    .bind(&self.database)
                    .bind(&self.collection)
                    .bind(&self.containment)
                    .bind(size as i64)
                    .bind(self.offset as i64)
                    .fetch_all(&self.store.pool),
            )
            .map_err(store_error)?;

        if rows.len() < size {
            self.exhausted = true;
        }
        self.offset += rows.len();
        if let Some(n) = self.remaining.as_mut() {
            *n -= rows.len();
        }
        self.page.extend(rows);
        Ok(())
    }
}

impl Iterator for PagedFind<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.page.pop_front().map(|text| decode_document(&text))
    }
}

fn decode_document(text: &str) -> Result<Document> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedDocument(format!("stored document is not JSON: {}", e)))?;
    Document::from_json(json)
        .ok_or_else(|| Error::MalformedDocument("stored document is not an object".to_string()))
}

async fn insert_document(
    tx: &mut Transaction<'_, Postgres>,
    namespace: &Namespace,
    id: &ObjectId,
    document: &Document,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO documents (database, collection, id, doc)
        VALUES ($1, $2, $3, $4::json)
        "#,
    )
    .bind(&namespace.database)
    .bind(&namespace.collection)
    .bind(id.to_string())
    .bind(document.to_json().to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl PgDocumentStore {
    async fn insert_all(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<ObjectId>> {
        let stamped = documents
            .into_iter()
            .map(store::stamp_identifier)
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for (id, document) in &stamped {
            insert_document(&mut tx, namespace, id, document)
                .await
                .map_err(|e| insert_error(e, id))?;
        }
        tx.commit().await.map_err(store_error)?;

        Ok(stamped.into_iter().map(|(id, _)| id).collect())
    }

    async fn update(&self, namespace: &Namespace, id: &ObjectId, sets: &[FieldSet]) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let stored: Option<String> = sqlx::query_scalar(
            r#"
            SELECT doc::text FROM documents
            WHERE database = $1 AND collection = $2 AND id = $3
            FOR UPDATE
            "#,
        )
        .bind(&namespace.database)
        .bind(&namespace.collection)
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        let Some(text) = stored else {
            return Ok(0);
        };

        let mut document = decode_document(&text)?;
        for set in sets {
            path::assign(&mut document, set.path.as_str(), set.value.clone())
                .map_err(|e| Error::Store(e.to_string()))?;
        }

        sqlx::query(
            r#"
            UPDATE documents SET doc = $4::json
            WHERE database = $1 AND collection = $2 AND id = $3
            "#,
        )
        .bind(&namespace.database)
        .bind(&namespace.collection)
        .bind(id.to_string())
        .bind(document.to_json().to_string())
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(1)
    }

    async fn delete(&self, namespace: &Namespace, ids: &[ObjectId]) -> Result<u64> {
        let ids: Vec<String> = ids.iter().map(ObjectId::to_string).collect();
        let result = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE database = $1 AND collection = $2 AND id = ANY($3)
            "#,
        )
        .bind(&namespace.database)
        .bind(&namespace.collection)
        .bind(&ids)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected())
    }
}

impl DocumentStore for PgDocumentStore {
    fn list_databases(&self) -> Result<Vec<String>> {
        self.handle
            .block_on(
                sqlx::query_scalar::<_, String>("SELECT DISTINCT database FROM documents ORDER BY database")
                    .fetch_all(&self.pool),
            )
            .map_err(store_error)
    }

    fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        self.handle
            .block_on(
                sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT DISTINCT collection FROM documents
                    WHERE database = $1
                    ORDER BY collection
                    "#,
                )
                .bind(database)
                .fetch_all(&self.pool),
            )
            .map_err(store_error)
    }

    fn find(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<DocumentCursor<'_>> {
        Ok(Box::new(PagedFind {
            store: self,
            sql: find_sql(options.sort),
            database: namespace.database.clone(),
            collection: namespace.collection.clone(),
            containment: filter.to_containment_json().to_string(),
            remaining: options.limit,
            offset: 0,
            page: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn insert_one(&mut self, namespace: &Namespace, document: Document) -> Result<ObjectId> {
        let ids = self
            .handle
            .block_on(self.insert_all(namespace, vec![document]))?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::Store("insert returned no identifier".to_string()))
    }

    fn insert_many(
        &mut self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<ObjectId>> {
        self.handle.block_on(self.insert_all(namespace, documents))
    }

    fn update_one(
        &mut self,
        namespace: &Namespace,
        id: &ObjectId,
        sets: &[FieldSet],
    ) -> Result<u64> {
        self.handle.block_on(self.update(namespace, id, sets))
    }

    fn delete_one(&mut self, namespace: &Namespace, id: &ObjectId) -> Result<u64> {
        self.handle
            .block_on(self.delete(namespace, std::slice::from_ref(id)))
    }

    fn delete_many(&mut self, namespace: &Namespace, ids: &[ObjectId]) -> Result<u64> {
        self.handle.block_on(self.delete(namespace, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_follows_insertion() {
        assert_eq!(order_clause(None), "ORDER BY seq ASC");
        assert_eq!(
            order_clause(Some(SortOrder::IdDescending)),
            "ORDER BY id DESC"
        );
    }

    #[test]
    fn pages_respect_the_limit() {
        assert_eq!(next_page_size(None), Some(PAGE_SIZE));
        assert_eq!(next_page_size(Some(3)), Some(3));
        assert_eq!(next_page_size(Some(PAGE_SIZE + 7)), Some(PAGE_SIZE));
        assert_eq!(next_page_size(Some(0)), None);
    }

    #[test]
    fn find_query_pages_by_offset() {
        let sql = find_sql(Some(SortOrder::IdAscending));
        assert!(sql.contains("ORDER BY id ASC"));
        assert!(sql.contains("LIMIT $4 OFFSET $5"));
    }

    #[test]
    fn stored_text_decodes_in_field_order() {
        let document =
            decode_document(r#"{"_id":{"$oid":"65f1c0a2e4b0a1b2c3d4e5f6"},"zeta":1,"alpha":2}"#)
                .unwrap();
        let keys: Vec<_> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "zeta", "alpha"]);
    }

    #[test]
    fn non_object_documents_are_malformed() {
        assert!(matches!(
            decode_document("[1, 2]"),
            Err(Error::MalformedDocument(_))
        ));
        assert!(matches!(
            decode_document("not json"),
            Err(Error::MalformedDocument(_))
        ));
    }
}

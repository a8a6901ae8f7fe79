//! SQLite-backed repositories.
//!
//! [`SqliteStore`] implements all four repository traits of
//! `contract_harness_core::store` over the schema created by
//! [`migrate::apply_schema`](crate::migrate::apply_schema). Cascading
//! deletes are enforced by foreign keys, so the connection must have
//! `foreign_keys` enabled (see [`db::connect`](crate::db::connect)).

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use contract_harness_core::embedding::vec_to_blob;
use contract_harness_core::models::{
    ClauseReference, ContractDocument, DocumentChunk, DocumentGroup, DocumentOverride,
    DocumentStatus, META_LAST_ERROR,
};
use contract_harness_core::store::{
    ChunkRepository, DocumentRepository, OverrideRepository, ReferenceRepository,
};

/// SQLite implementation of the contract repositories.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(&s, DATE_FORMAT)
                .with_context(|| format!("Invalid date in database: {}", s))
        })
        .transpose()
}

fn parse_metadata(json: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(json).with_context(|| "Invalid metadata_json in database")
}

fn document_from_row(row: &SqliteRow) -> Result<ContractDocument> {
    let group: String = row.get("document_group");
    let status: String = row.get("status");
    let metadata_json: String = row.get("metadata_json");
    let file_size: Option<i64> = row.get("file_size_bytes");
    Ok(ContractDocument {
        id: row.get("id"),
        contract_id: row.get("contract_id"),
        group: group.parse()?,
        name: row.get("name"),
        file_name: row.get("file_name"),
        sequence_number: row.get("sequence_number"),
        effective_date: parse_date(row.get("effective_date"))?,
        supersedes_document_id: row.get("supersedes_document_id"),
        status: status.parse()?,
        file_size_bytes: file_size.map(|n| n.max(0) as u64),
        created_at: row.get("created_at"),
        metadata: parse_metadata(&metadata_json)?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<DocumentChunk> {
    let content_type: String = row.get("content_type");
    let token_count: i64 = row.get("token_count");
    let metadata_json: String = row.get("metadata_json");
    Ok(DocumentChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        contract_id: row.get("contract_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        content_type: content_type.parse()?,
        clause_number: row.get("clause_number"),
        clause_title: row.get("clause_title"),
        token_count: token_count.max(0) as usize,
        extraction_confidence: row.get("extraction_confidence"),
        metadata: parse_metadata(&metadata_json)?,
    })
}

fn reference_from_row(row: &SqliteRow) -> Result<ClauseReference> {
    let source_clause: String = row.get("source_clause_number");
    let reference_type: String = row.get("reference_type");
    let resolved: i64 = row.get("is_resolved");
    Ok(ClauseReference {
        id: row.get("id"),
        contract_id: row.get("contract_id"),
        source_clause_number: (!source_clause.is_empty()).then_some(source_clause),
        source_document_id: row.get("source_document_id"),
        source_chunk_id: row.get("source_chunk_id"),
        target_clause_number: row.get("target_clause_number"),
        reference_type: reference_type.parse()?,
        reference_text: row.get("reference_text"),
        confidence: row.get("confidence"),
        is_resolved: resolved != 0,
    })
}

fn override_from_row(row: &SqliteRow) -> Result<DocumentOverride> {
    let override_type: String = row.get("override_type");
    let affected: Option<String> = row.get("affected_clauses_json");
    Ok(DocumentOverride {
        contract_id: row.get("contract_id"),
        overriding_document_id: row.get("overriding_document_id"),
        overridden_document_id: row.get("overridden_document_id"),
        override_scope: row.get("override_scope"),
        override_type: override_type.parse()?,
        affected_clauses: affected
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .with_context(|| "Invalid affected_clauses_json in database")?,
        reason: row.get("reason"),
        effective_date: parse_date(row.get("effective_date"))?,
    })
}

#[async_trait]
impl DocumentRepository for SqliteStore {
    async fn register_document(&self, mut document: ContractDocument) -> Result<ContractDocument> {
        let mut tx = self.pool.begin().await?;

        let high_water: Option<u32> = sqlx::query_scalar(
            "SELECT high_water FROM document_sequences WHERE contract_id = ? AND document_group = ?",
        )
        .bind(&document.contract_id)
        .bind(document.group.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        document.sequence_number = high_water.unwrap_or(0) + 1;

        sqlx::query(
            r#"
            INSERT INTO document_sequences (contract_id, document_group, high_water)
            VALUES (?, ?, ?)
            ON CONFLICT(contract_id, document_group) DO UPDATE SET high_water = excluded.high_water
            "#,
        )
        .bind(&document.contract_id)
        .bind(document.group.as_str())
        .bind(document.sequence_number)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO contract_documents (id, contract_id, document_group, name, file_name,
                                            sequence_number, effective_date, supersedes_document_id,
                                            status, file_size_bytes, created_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.contract_id)
        .bind(document.group.as_str())
        .bind(&document.name)
        .bind(&document.file_name)
        .bind(document.sequence_number)
        .bind(
            document
                .effective_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
        )
        .bind(&document.supersedes_document_id)
        .bind(document.status.as_str())
        .bind(document.file_size_bytes.map(|n| n as i64))
        .bind(document.created_at)
        .bind(serde_json::to_string(&document.metadata)?)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert document {}", document.id))?;

        tx.commit().await?;
        Ok(document)
    }

    async fn get_document(&self, id: &str) -> Result<Option<ContractDocument>> {
        sqlx::query("SELECT * FROM contract_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(document_from_row)
            .transpose()
    }

    async fn list_documents(&self, contract_id: &str) -> Result<Vec<ContractDocument>> {
        let rows = sqlx::query("SELECT * FROM contract_documents WHERE contract_id = ?")
            .bind(contract_id)
            .fetch_all(&self.pool)
            .await?;
        let mut docs = rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>>>()?;
        docs.sort_by(|a, b| {
            a.group
                .cmp(&b.group)
                .then(a.sequence_number.cmp(&b.sequence_number))
        });
        Ok(docs)
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut doc = self
            .get_document(id)
            .await?
            .ok_or_else(|| anyhow!("document not found: {}", id))?;
        match error {
            Some(message) => {
                doc.metadata
                    .insert(META_LAST_ERROR.to_string(), message.to_string());
            }
            None => {
                doc.metadata.remove(META_LAST_ERROR);
            }
        }
        sqlx::query("UPDATE contract_documents SET status = ?, metadata_json = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(serde_json::to_string(&doc.metadata)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contract_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn sequence_high_water(&self, contract_id: &str, group: DocumentGroup) -> Result<u32> {
        let high_water: Option<u32> = sqlx::query_scalar(
            "SELECT high_water FROM document_sequences WHERE contract_id = ? AND document_group = ?",
        )
        .bind(contract_id)
        .bind(group.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(high_water.unwrap_or(0))
    }
}

#[async_trait]
impl ChunkRepository for SqliteStore {
    async fn replace_chunks(&self, document_id: &str, chunks: &[DocumentChunk]) -> Result<()> {
        if let Some(stray) = chunks.iter().find(|c| c.document_id != document_id) {
            bail!("chunk {} belongs to another document", stray.id);
        }

        let mut tx = self.pool.begin().await?;

        // Embeddings go with their chunks via ON DELETE CASCADE.
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (id, document_id, contract_id, chunk_index, content,
                                             content_hash, content_type, clause_number,
                                             clause_title, token_count, extraction_confidence,
                                             metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.contract_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.content_hash)
            .bind(chunk.content_type.as_str())
            .bind(&chunk.clause_number)
            .bind(&chunk.clause_title)
            .bind(chunk.token_count as i64)
            .bind(chunk.extraction_confidence)
            .bind(serde_json::to_string(&chunk.metadata)?)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert chunk {}", chunk.chunk_index))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows =
            sqlx::query("SELECT * FROM document_chunks WHERE document_id = ? ORDER BY chunk_index")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn list_chunks(&self, contract_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            "SELECT * FROM document_chunks WHERE contract_id = ? ORDER BY document_id, chunk_index",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn upsert_embedding(
        &self,
        chunk: &DocumentChunk,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunk_embeddings (chunk_id, document_id, model, dims, content_hash,
                                          embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                content_hash = excluded.content_hash,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(&chunk.content_hash)
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn chunks_needing_embedding(
        &self,
        contract_id: &str,
        model: &str,
    ) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM document_chunks c
            LEFT JOIN chunk_embeddings e
                ON e.chunk_id = c.id AND e.model = ? AND e.content_hash = c.content_hash
            WHERE c.contract_id = ? AND e.chunk_id IS NULL
            ORDER BY c.document_id, c.chunk_index
            "#,
        )
        .bind(model)
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }
}

#[async_trait]
impl ReferenceRepository for SqliteStore {
    async fn upsert_references(&self, references: &[ClauseReference]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for r in references {
            sqlx::query(
                r#"
                INSERT INTO clause_references (id, contract_id, source_clause_number,
                                               source_document_id, source_chunk_id,
                                               target_clause_number, reference_type,
                                               reference_text, confidence, is_resolved)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(contract_id, source_clause_number, target_clause_number, source_document_id)
                DO UPDATE SET
                    source_chunk_id = excluded.source_chunk_id,
                    reference_type = excluded.reference_type,
                    reference_text = excluded.reference_text,
                    confidence = excluded.confidence,
                    is_resolved = excluded.is_resolved
                "#,
            )
            .bind(&r.id)
            .bind(&r.contract_id)
            .bind(r.source_clause_number.as_deref().unwrap_or(""))
            .bind(&r.source_document_id)
            .bind(&r.source_chunk_id)
            .bind(&r.target_clause_number)
            .bind(r.reference_type.as_str())
            .bind(&r.reference_text)
            .bind(r.confidence)
            .bind(r.is_resolved as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_references(&self, contract_id: &str) -> Result<Vec<ClauseReference>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM clause_references WHERE contract_id = ?
            ORDER BY source_document_id, source_clause_number, target_clause_number
            "#,
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reference_from_row).collect()
    }

    async fn clear_references(&self, contract_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM clause_references WHERE contract_id = ?")
            .bind(contract_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OverrideRepository for SqliteStore {
    async fn insert_overrides(&self, overrides: &[DocumentOverride]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for o in overrides {
            sqlx::query(
                r#"
                INSERT INTO document_overrides (contract_id, overriding_document_id,
                                                overridden_document_id, override_scope,
                                                override_type, affected_clauses_json, reason,
                                                effective_date)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&o.contract_id)
            .bind(&o.overriding_document_id)
            .bind(&o.overridden_document_id)
            .bind(&o.override_scope)
            .bind(o.override_type.as_str())
            .bind(
                o.affected_clauses
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            )
            .bind(&o.reason)
            .bind(o.effective_date.map(|d| d.format(DATE_FORMAT).to_string()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_overrides(&self, contract_id: &str) -> Result<Vec<DocumentOverride>> {
        let rows = sqlx::query("SELECT * FROM document_overrides WHERE contract_id = ? ORDER BY id")
            .bind(contract_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(override_from_row).collect()
    }

    async fn clear_overrides(&self, contract_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_overrides WHERE contract_id = ?")
            .bind(contract_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::migrate::apply_schema;
    use contract_harness_core::models::{ContentType, OverrideType, ReferenceType};

    async fn store() -> SqliteStore {
        let pool = connect_in_memory().await.unwrap();
        apply_schema(&pool).await.unwrap();
        // Schema creation is idempotent.
        apply_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn chunk(doc: &ContractDocument, index: i64, clause: &str) -> DocumentChunk {
        DocumentChunk {
            id: format!("{}-{}", doc.id, index),
            document_id: doc.id.clone(),
            contract_id: doc.contract_id.clone(),
            chunk_index: index,
            content: format!("Clause {} text", clause),
            content_hash: format!("hash-{}", index),
            content_type: ContentType::Text,
            clause_number: Some(clause.to_string()),
            clause_title: Some("Title".into()),
            token_count: 4,
            extraction_confidence: Some(0.93),
            metadata: BTreeMap::from([("clause_part".to_string(), "1".to_string())]),
        }
    }

    fn reference(doc: &ContractDocument, source: Option<&str>, target: &str) -> ClauseReference {
        ClauseReference {
            id: format!("ref-{}-{}", doc.id, target),
            contract_id: doc.contract_id.clone(),
            source_clause_number: source.map(str::to_string),
            source_document_id: doc.id.clone(),
            source_chunk_id: format!("{}-0", doc.id),
            target_clause_number: target.into(),
            reference_type: ReferenceType::Overrides,
            reference_text: format!("Clause {}", target),
            confidence: 0.95,
            is_resolved: false,
        }
    }

    #[tokio::test]
    async fn test_document_roundtrip_and_sequences() {
        let store = store().await;
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let a = store
            .register_document(
                ContractDocument::new("c1", DocumentGroup::Addendum, "Addendum 1", 0)
                    .with_effective_date(date)
                    .with_file_name("ADD1_Addendum.pdf")
                    .with_file_size(2048),
            )
            .await
            .unwrap();
        assert_eq!(a.sequence_number, 1);

        let loaded = store.get_document(&a.id).await.unwrap().unwrap();
        assert_eq!(loaded, a);

        store.delete_document(&a.id).await.unwrap();
        let b = store
            .register_document(ContractDocument::new("c1", DocumentGroup::Addendum, "Addendum 2", 0))
            .await
            .unwrap();
        assert_eq!(b.sequence_number, 2);
        assert_eq!(
            store
                .sequence_high_water("c1", DocumentGroup::Addendum)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_chunks_replaced_wholesale() {
        let store = store().await;
        let doc = store
            .register_document(ContractDocument::new("c1", DocumentGroup::Agreement, "A", 0))
            .await
            .unwrap();
        store
            .replace_chunks(&doc.id, &[chunk(&doc, 0, "1"), chunk(&doc, 1, "2")])
            .await
            .unwrap();
        store
            .upsert_embedding(&chunk(&doc, 0, "1"), &[0.5, 0.25], "m")
            .await
            .unwrap();
        assert_eq!(store.chunks_needing_embedding("c1", "m").await.unwrap().len(), 1);

        store.replace_chunks(&doc.id, &[chunk(&doc, 0, "9")]).await.unwrap();
        let chunks = store.chunks_for_document(&doc.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].clause_number.as_deref(), Some("9"));
        assert_eq!(chunks[0], chunk(&doc, 0, "9"));
        // The old embedding went with the old chunk.
        assert_eq!(store.chunks_needing_embedding("c1", "m").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reference_upsert_dedups_without_source_clause() {
        let store = store().await;
        let doc = store
            .register_document(ContractDocument::new("c1", DocumentGroup::Agreement, "A", 0))
            .await
            .unwrap();
        let mut first = reference(&doc, None, "4.1");
        store.upsert_references(&[first.clone()]).await.unwrap();
        first.id = "other".into();
        first.is_resolved = true;
        store
            .upsert_references(&[first, reference(&doc, Some("2"), "4.1")])
            .await
            .unwrap();

        let refs = store.list_references("c1").await.unwrap();
        assert_eq!(refs.len(), 2);
        let sourceless = refs.iter().find(|r| r.source_clause_number.is_none()).unwrap();
        assert!(sourceless.is_resolved);
        assert_eq!(store.clear_references("c1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_cascades_through_foreign_keys() {
        let store = store().await;
        let a = store
            .register_document(ContractDocument::new("c1", DocumentGroup::Agreement, "A", 0))
            .await
            .unwrap();
        let b = store
            .register_document(ContractDocument::new("c1", DocumentGroup::AcceptanceLetter, "B", 0))
            .await
            .unwrap();
        store.replace_chunks(&a.id, &[chunk(&a, 0, "1")]).await.unwrap();
        store
            .upsert_embedding(&chunk(&a, 0, "1"), &[1.0], "m")
            .await
            .unwrap();
        store.upsert_references(&[reference(&a, Some("1"), "2")]).await.unwrap();
        store
            .insert_overrides(&[DocumentOverride {
                contract_id: "c1".into(),
                overriding_document_id: b.id.clone(),
                overridden_document_id: a.id.clone(),
                override_scope: "agreement".into(),
                override_type: OverrideType::ClauseSpecific,
                affected_clauses: Some(vec!["1".into()]),
                reason: "test".into(),
                effective_date: None,
            }])
            .await
            .unwrap();
        let overrides = store.list_overrides("c1").await.unwrap();
        assert_eq!(overrides[0].affected_clauses, Some(vec!["1".to_string()]));

        assert!(store.delete_document(&a.id).await.unwrap());
        assert!(store.list_chunks("c1").await.unwrap().is_empty());
        assert!(store.list_references("c1").await.unwrap().is_empty());
        assert!(store.list_overrides("c1").await.unwrap().is_empty());
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_embeddings")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(embeddings, 0);
        assert!(!store.delete_document(&a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_update_records_error() {
        let store = store().await;
        let a = store
            .register_document(ContractDocument::new("c1", DocumentGroup::Boq, "BOQ", 0))
            .await
            .unwrap();
        store
            .update_status(&a.id, DocumentStatus::Failed, Some("unreadable"))
            .await
            .unwrap();
        let doc = store.get_document(&a.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(
            doc.metadata.get(META_LAST_ERROR).map(String::as_str),
            Some("unreadable")
        );
        assert!(store
            .update_status("missing", DocumentStatus::Processed, None)
            .await
            .is_err());
    }
}

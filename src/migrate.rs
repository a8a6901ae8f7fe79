use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contract_documents (
            id TEXT PRIMARY KEY,
            contract_id TEXT NOT NULL,
            document_group TEXT NOT NULL,
            name TEXT NOT NULL,
            file_name TEXT,
            sequence_number INTEGER NOT NULL,
            effective_date TEXT,
            supersedes_document_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            file_size_bytes INTEGER,
            created_at INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            UNIQUE(contract_id, document_group, sequence_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Sequence numbers are never reused, so the high-water mark outlives
    // the documents that reached it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_sequences (
            contract_id TEXT NOT NULL,
            document_group TEXT NOT NULL,
            high_water INTEGER NOT NULL,
            PRIMARY KEY (contract_id, document_group)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            contract_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text',
            clause_number TEXT,
            clause_title TEXT,
            token_count INTEGER NOT NULL,
            extraction_confidence REAL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES contract_documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // source_clause_number is '' rather than NULL so the unique key
    // also deduplicates references without a source clause.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clause_references (
            id TEXT PRIMARY KEY,
            contract_id TEXT NOT NULL,
            source_clause_number TEXT NOT NULL DEFAULT '',
            source_document_id TEXT NOT NULL,
            source_chunk_id TEXT NOT NULL,
            target_clause_number TEXT NOT NULL,
            reference_type TEXT NOT NULL,
            reference_text TEXT NOT NULL,
            confidence REAL NOT NULL,
            is_resolved INTEGER NOT NULL DEFAULT 0,
            UNIQUE(contract_id, source_clause_number, target_clause_number, source_document_id),
            FOREIGN KEY (source_document_id) REFERENCES contract_documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_overrides (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contract_id TEXT NOT NULL,
            overriding_document_id TEXT NOT NULL,
            overridden_document_id TEXT NOT NULL,
            override_scope TEXT NOT NULL,
            override_type TEXT NOT NULL,
            affected_clauses_json TEXT,
            reason TEXT NOT NULL,
            effective_date TEXT,
            FOREIGN KEY (overriding_document_id) REFERENCES contract_documents(id) ON DELETE CASCADE,
            FOREIGN KEY (overridden_document_id) REFERENCES contract_documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_embeddings (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES document_chunks(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_documents_contract ON contract_documents(contract_id)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON document_chunks(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_contract_clause ON document_chunks(contract_id, clause_number)",
        "CREATE INDEX IF NOT EXISTS idx_references_contract ON clause_references(contract_id)",
        "CREATE INDEX IF NOT EXISTS idx_overrides_contract ON document_overrides(contract_id)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

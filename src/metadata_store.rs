//! Durable relational store for files, chunks, symbols, and build metadata
//! (SPEC_FULL.md §4.5, §6 schema), backed by a bundled `rusqlite` connection
//! the way this codebase's own embedding store wraps its SQLite handle.

use crate::error::EngineResult;
use crate::types::{Chunk, ChunkType, FileRecord, FileType, Symbol, SymbolKind};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                relative_path TEXT NOT NULL,
                file_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                modified_at INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                indexed_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_type ON files(file_type);
            CREATE INDEX IF NOT EXISTS idx_files_relpath ON files(relative_path);
            CREATE INDEX IF NOT EXISTS idx_files_modified ON files(modified_at);

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                chunk_type TEXT NOT NULL,
                name TEXT,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                preview TEXT NOT NULL,
                vector_id INTEGER UNIQUE
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);

            CREATE TABLE IF NOT EXISTS symbols (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                symbol_type TEXT NOT NULL,
                line_number INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
            CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn file_count(&self) -> EngineResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn chunk_count(&self) -> EngineResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn total_size_bytes(&self) -> EngineResult<u64> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM files", [], |row| row.get(0))?;
        Ok(total as u64)
    }

    pub fn file_type_histogram(&self) -> EngineResult<std::collections::BTreeMap<String, usize>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT file_type, COUNT(*) FROM files GROUP BY file_type")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?;
        let mut out = std::collections::BTreeMap::new();
        for row in rows {
            let (file_type, count) = row?;
            out.insert(file_type, count);
        }
        Ok(out)
    }

    /// Flushes the WAL into the main database file. Run before renaming the
    /// underlying file into place so the renamed copy is complete on disk
    /// (§4.10, §5 atomic build-then-swap).
    pub fn checkpoint(&self) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value", params![key, value])?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> EngineResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Inserts a file record and returns the assigned id.
    pub fn upsert_file(&self, file: &FileRecord, indexed_at: i64) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO files (path, relative_path, file_type, size_bytes, modified_at, content_hash, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(path) DO UPDATE SET
                relative_path = excluded.relative_path,
                file_type = excluded.file_type,
                size_bytes = excluded.size_bytes,
                modified_at = excluded.modified_at,
                content_hash = excluded.content_hash,
                indexed_at = excluded.indexed_at",
            params![
                file.path.to_string_lossy(),
                file.relative_path,
                file.file_type.as_str(),
                file.size_bytes as i64,
                file.modified_at,
                file.content_hash,
                indexed_at,
            ],
        )?;
        let id: i64 = conn.query_row("SELECT id FROM files WHERE path = ?1", params![file.path.to_string_lossy()], |row| row.get(0))?;
        Ok(id)
    }

    pub fn file_id_by_relative_path(&self, relative_path: &str) -> EngineResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row("SELECT id FROM files WHERE relative_path = ?1", params![relative_path], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Deletes a file and cascades to its chunks and symbols.
    pub fn delete_file_by_relative_path(&self, relative_path: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM files WHERE relative_path = ?1", params![relative_path])?;
        Ok(())
    }

    /// Replaces a file's chunks: deletes existing rows, then inserts `chunks`,
    /// assigning each a `vector_id` from `vector_ids` in order.
    pub fn replace_chunks(&self, file_id: i64, chunks: &[Chunk], vector_ids: &[u64]) -> EngineResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        for (chunk, vector_id) in chunks.iter().zip(vector_ids.iter()) {
            tx.execute(
                "INSERT INTO chunks (file_id, chunk_type, name, line_start, line_end, preview, vector_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    file_id,
                    chunk.chunk_type.as_str(),
                    chunk.name,
                    chunk.line_start as i64,
                    chunk.line_end as i64,
                    chunk.preview,
                    *vector_id as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn replace_symbols(&self, file_id: i64, symbols: &[Symbol]) -> EngineResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])?;
        for symbol in symbols {
            tx.execute(
                "INSERT INTO symbols (file_id, name, symbol_type, line_number) VALUES (?1, ?2, ?3, ?4)",
                params![file_id, symbol.name, symbol.kind.as_str(), symbol.line_number as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetches a chunk plus its owning file by vector-id, for the query
    /// executor's ANN-candidate join (§4.8 step 3).
    pub fn chunk_with_file_by_vector_id(&self, vector_id: u64) -> EngineResult<Option<(ChunkRow, FileRow)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT c.id, c.file_id, c.chunk_type, c.name, c.line_start, c.line_end, c.preview,
                        f.path, f.relative_path, f.file_type, f.modified_at
                 FROM chunks c JOIN files f ON f.id = c.file_id
                 WHERE c.vector_id = ?1",
                params![vector_id as i64],
                |row| {
                    Ok((
                        ChunkRow {
                            id: row.get(0)?,
                            file_id: row.get(1)?,
                            chunk_type: row.get::<_, String>(2)?,
                            name: row.get(3)?,
                            line_start: row.get::<_, i64>(4)? as usize,
                            line_end: row.get::<_, i64>(5)? as usize,
                            preview: row.get(6)?,
                        },
                        FileRow {
                            path: row.get(7)?,
                            relative_path: row.get(8)?,
                            file_type: row.get::<_, String>(9)?,
                            modified_at: row.get(10)?,
                        },
                    ))
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn search_symbols(&self, term: &str, limit: usize) -> EngineResult<Vec<(Symbol, FileRow)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.name, s.symbol_type, s.line_number, f.path, f.relative_path, f.file_type, f.modified_at
             FROM symbols s JOIN files f ON f.id = s.file_id
             WHERE s.name LIKE ?1 ESCAPE '\\'
             LIMIT ?2",
        )?;
        let pattern = format!("%{}%", term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok((
                Symbol {
                    file_id: 0,
                    name: row.get(0)?,
                    kind: SymbolKind::parse(&row.get::<_, String>(1)?),
                    line_number: row.get::<_, i64>(2)? as usize,
                },
                FileRow {
                    path: row.get(3)?,
                    relative_path: row.get(4)?,
                    file_type: row.get(5)?,
                    modified_at: row.get(6)?,
                },
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Lists the vector-ids owned by a file's chunks, for cascade-deleting
    /// them from the Vector Index before the SQL row cascade removes the
    /// chunk rows that recorded the mapping.
    pub fn vector_ids_for_relative_path(&self, relative_path: &str) -> EngineResult<Vec<u64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.vector_id FROM chunks c
             JOIN files f ON f.id = c.file_id
             WHERE f.relative_path = ?1 AND c.vector_id IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![relative_path], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row? as u64);
        }
        Ok(out)
    }

    /// Lists every symbol recorded for a file, for rebuilding the Quick
    /// Index from persisted state on startup.
    pub fn symbols_for_relative_path(&self, relative_path: &str) -> EngineResult<Vec<Symbol>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.name, s.symbol_type, s.line_number FROM symbols s
             JOIN files f ON f.id = s.file_id
             WHERE f.relative_path = ?1",
        )?;
        let rows = stmt.query_map(params![relative_path], |row| {
            Ok(Symbol {
                file_id: 0,
                name: row.get(0)?,
                kind: SymbolKind::parse(&row.get::<_, String>(1)?),
                line_number: row.get::<_, i64>(2)? as usize,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Current chunk count per file, keyed by relative path — feeds the
    /// Merkle leaf formula's `chunk_count` term (§4.4).
    pub fn chunk_counts_by_relative_path(&self) -> EngineResult<std::collections::BTreeMap<String, usize>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT f.relative_path, COUNT(c.id) FROM files f
             LEFT JOIN chunks c ON c.file_id = f.id
             GROUP BY f.id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?;
        let mut out = std::collections::BTreeMap::new();
        for row in rows {
            let (relative_path, count) = row?;
            out.insert(relative_path, count);
        }
        Ok(out)
    }

    pub fn all_files(&self) -> EngineResult<Vec<FileRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT path, relative_path, file_type, modified_at FROM files")?;
        let rows = stmt.query_map([], |row| {
            Ok(FileRow {
                path: row.get(0)?,
                relative_path: row.get(1)?,
                file_type: row.get(2)?,
                modified_at: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub id: i64,
    pub file_id: i64,
    pub chunk_type: String,
    pub name: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub preview: String,
}

#[derive(Debug, Clone)]
pub struct FileRow {
    pub path: String,
    pub relative_path: String,
    pub file_type: String,
    pub modified_at: i64,
}

impl SymbolKind {
    fn parse(s: &str) -> Self {
        match s {
            "function" => SymbolKind::Function,
            "class" => SymbolKind::Class,
            "method" => SymbolKind::Method,
            _ => SymbolKind::Other,
        }
    }
}

impl FileRow {
    pub fn parsed_file_type(&self) -> FileType {
        FileType::parse(&self.file_type).unwrap_or(FileType::Other)
    }
}

impl ChunkRow {
    pub fn parsed_chunk_type(&self) -> ChunkType {
        match self.chunk_type.as_str() {
            "function" => ChunkType::Function,
            "class" => ChunkType::Class,
            "module" => ChunkType::Module,
            "section" => ChunkType::Section,
            "window" => ChunkType::Window,
            _ => ChunkType::WholeFile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileType;

    fn sample_file(path: &str) -> FileRecord {
        FileRecord {
            id: 0,
            path: path.into(),
            relative_path: path.to_string(),
            file_type: FileType::Python,
            size_bytes: 10,
            modified_at: 0,
            content_hash: "abc".to_string(),
        }
    }

    #[test]
    fn upsert_and_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(&dir.path().join("files.db")).unwrap();
        let id = store.upsert_file(&sample_file("a.py"), 0).unwrap();
        assert_eq!(store.file_id_by_relative_path("a.py").unwrap(), Some(id));
    }

    #[test]
    fn delete_cascades_to_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(&dir.path().join("files.db")).unwrap();
        let id = store.upsert_file(&sample_file("a.py"), 0).unwrap();

        let chunk = Chunk {
            file_id: id,
            chunk_type: ChunkType::WholeFile,
            name: None,
            line_start: 1,
            line_end: 1,
            content: "x".to_string(),
            preview: "x".to_string(),
            vector_id: Some(1),
        };
        store.replace_chunks(id, &[chunk], &[1]).unwrap();
        assert_eq!(store.chunk_count().unwrap(), 1);

        store.delete_file_by_relative_path("a.py").unwrap();
        assert_eq!(store.chunk_count().unwrap(), 0);
    }

    #[test]
    fn deleting_one_file_leaves_others_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(&dir.path().join("files.db")).unwrap();
        let a = store.upsert_file(&sample_file("a.py"), 0).unwrap();
        let b = store.upsert_file(&sample_file("b.py"), 0).unwrap();

        let chunk_a = Chunk { file_id: a, chunk_type: ChunkType::WholeFile, name: None, line_start: 1, line_end: 1, content: "a".into(), preview: "a".into(), vector_id: Some(1) };
        let chunk_b = Chunk { file_id: b, chunk_type: ChunkType::WholeFile, name: None, line_start: 1, line_end: 1, content: "b".into(), preview: "b".into(), vector_id: Some(2) };
        store.replace_chunks(a, &[chunk_a], &[1]).unwrap();
        store.replace_chunks(b, &[chunk_b], &[2]).unwrap();

        store.delete_file_by_relative_path("a.py").unwrap();
        assert_eq!(store.chunk_count().unwrap(), 1);
        assert_eq!(store.file_id_by_relative_path("b.py").unwrap(), Some(b));
    }
}

//! Term store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist terms, cluster roots, preferred designations and blocked keys.
//! - Load everything needed to rebuild the registry without link history.
//!
//! # Invariants
//! - `save_cluster` rewrites one cluster atomically and is safe to replay.
//! - Read paths reject rows whose keys are not in normalized form.
//! - Every write runs in an immediate transaction.

use crate::canon::normalize::is_normalized;
use crate::canon::registry::{ClusterRecord, ClusterSnapshot, RegistrySnapshot, TermRecord};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::term::NormalizedKey;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use uuid::Uuid;

const REQUIRED_TABLES: &[&str] = &["terms", "term_spellings", "clusters", "blocked_terms"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Term store error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted term data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::MissingRequiredTable(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Everything the store holds, ready for `SynonymRegistry::restore`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    pub registry: RegistrySnapshot,
    pub blocked: Vec<NormalizedKey>,
}

/// Persistence contract for canonicalization state.
pub trait TermRepository {
    /// Loads the full persisted state.
    fn load_state(&self) -> RepoResult<StoredState>;
    /// Upserts one cluster: its members, root pointers and preferred term.
    fn save_cluster(&mut self, snapshot: &ClusterSnapshot) -> RepoResult<()>;
    /// Marks keys as blocked. Already blocked keys are left untouched.
    fn save_blocked(&mut self, keys: &[NormalizedKey]) -> RepoResult<()>;
    /// Removes keys from the blocked set.
    fn delete_blocked(&mut self, keys: &[NormalizedKey]) -> RepoResult<()>;
}

/// SQLite-backed term store owning its connection.
pub struct SqliteTermRepository {
    conn: Connection,
}

impl SqliteTermRepository {
    /// Wraps a migrated connection, checking that the term tables exist.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        for &table in REQUIRED_TABLES {
            if !table_exists(&conn, table)? {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }
        Ok(Self { conn })
    }

    /// Opens a file store, applying migrations first.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens an empty in-memory store.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TermRepository for SqliteTermRepository {
    fn load_state(&self) -> RepoResult<StoredState> {
        let spellings = load_spellings(&self.conn)?;

        let mut stmt = self
            .conn
            .prepare("SELECT key, term_id, root_key, ordinal FROM terms ORDER BY ordinal ASC;")?;
        let mut rows = stmt.query([])?;
        let mut terms = Vec::new();
        while let Some(row) = rows.next()? {
            let key = parse_key(row.get("key")?, "terms.key")?;
            let id_text: String = row.get("term_id")?;
            let id = Uuid::parse_str(&id_text).map_err(|_| {
                RepoError::InvalidData(format!("invalid uuid `{id_text}` in terms.term_id"))
            })?;
            let ordinal: i64 = row.get("ordinal")?;
            let ordinal = u64::try_from(ordinal).map_err(|_| {
                RepoError::InvalidData(format!("negative ordinal `{ordinal}` in terms.ordinal"))
            })?;
            terms.push(TermRecord {
                id,
                spellings: spellings.get(key.as_str()).cloned().unwrap_or_default(),
                key,
                root_key: parse_key(row.get("root_key")?, "terms.root_key")?,
                ordinal,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT root_key, preferred_key, preferred_seq FROM clusters ORDER BY root_key ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut clusters = Vec::new();
        while let Some(row) = rows.next()? {
            let preferred_key = match row.get::<_, Option<String>>("preferred_key")? {
                Some(value) => Some(parse_key(value, "clusters.preferred_key")?),
                None => None,
            };
            let preferred_seq = match row.get::<_, Option<i64>>("preferred_seq")? {
                Some(value) => Some(u64::try_from(value).map_err(|_| {
                    RepoError::InvalidData(format!(
                        "negative sequence `{value}` in clusters.preferred_seq"
                    ))
                })?),
                None => None,
            };
            clusters.push(ClusterRecord {
                root_key: parse_key(row.get("root_key")?, "clusters.root_key")?,
                preferred_key,
                preferred_seq,
            });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT key FROM blocked_terms ORDER BY key ASC;")?;
        let mut rows = stmt.query([])?;
        let mut blocked = Vec::new();
        while let Some(row) = rows.next()? {
            blocked.push(parse_key(row.get("key")?, "blocked_terms.key")?);
        }

        debug!(
            "event=load_state module=repo status=ok terms={} clusters={} blocked={}",
            terms.len(),
            clusters.len(),
            blocked.len()
        );
        Ok(StoredState {
            registry: RegistrySnapshot { terms, clusters },
            blocked,
        })
    }

    fn save_cluster(&mut self, snapshot: &ClusterSnapshot) -> RepoResult<()> {
        let root_key = snapshot.cluster.root_key.as_str();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        for member in &snapshot.members {
            let ordinal = i64::try_from(member.ordinal).map_err(|_| {
                RepoError::InvalidData(format!("ordinal {} out of range", member.ordinal))
            })?;
            tx.execute(
                "INSERT INTO terms (key, term_id, root_key, ordinal)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    root_key = excluded.root_key,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![
                    member.key.as_str(),
                    member.id.to_string(),
                    member.root_key.as_str(),
                    ordinal,
                ],
            )?;
            tx.execute(
                "DELETE FROM term_spellings WHERE key = ?1;",
                [member.key.as_str()],
            )?;
            for (position, spelling) in member.spellings.iter().enumerate() {
                tx.execute(
                    "INSERT INTO term_spellings (key, spelling, position) VALUES (?1, ?2, ?3);",
                    params![member.key.as_str(), spelling, position as i64],
                )?;
            }
            if member.key.as_str() != root_key {
                tx.execute(
                    "DELETE FROM clusters WHERE root_key = ?1;",
                    [member.key.as_str()],
                )?;
            }
        }

        if let Some(absorbed) = snapshot.absorbed_root.as_ref() {
            tx.execute("DELETE FROM clusters WHERE root_key = ?1;", [absorbed.as_str()])?;
        }

        let preferred_seq = snapshot
            .cluster
            .preferred_seq
            .map(i64::try_from)
            .transpose()
            .map_err(|_| RepoError::InvalidData("preferred sequence out of range".to_string()))?;
        tx.execute(
            "INSERT INTO clusters (root_key, preferred_key, preferred_seq)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(root_key) DO UPDATE SET
                preferred_key = excluded.preferred_key,
                preferred_seq = excluded.preferred_seq;",
            params![
                root_key,
                snapshot.cluster.preferred_key.as_ref().map(NormalizedKey::as_str),
                preferred_seq,
            ],
        )?;

        tx.commit()?;
        debug!(
            "event=save_cluster module=repo status=ok members={}",
            snapshot.members.len()
        );
        Ok(())
    }

    fn save_blocked(&mut self, keys: &[NormalizedKey]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for key in keys {
            tx.execute(
                "INSERT OR IGNORE INTO blocked_terms (key) VALUES (?1);",
                [key.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_blocked(&mut self, keys: &[NormalizedKey]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for key in keys {
            tx.execute("DELETE FROM blocked_terms WHERE key = ?1;", [key.as_str()])?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn parse_key(value: String, column: &str) -> RepoResult<NormalizedKey> {
    if value.is_empty() || !is_normalized(&value) {
        return Err(RepoError::InvalidData(format!(
            "non-normalized key `{value}` in {column}"
        )));
    }
    Ok(NormalizedKey::from_normalized(value))
}

fn load_spellings(conn: &Connection) -> RepoResult<HashMap<String, Vec<String>>> {
    let mut stmt =
        conn.prepare("SELECT key, spelling FROM term_spellings ORDER BY key ASC, position ASC;")?;
    let mut rows = stmt.query([])?;
    let mut spellings: HashMap<String, Vec<String>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let spelling: String = row.get(1)?;
        spellings.entry(key).or_default().push(spelling);
    }
    Ok(spellings)
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let found = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            [table],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::{RepoError, SqliteTermRepository, TermRepository};
    use rusqlite::Connection;

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteTermRepository::try_new(conn).err().unwrap();
        assert!(matches!(err, RepoError::MissingRequiredTable("terms")));
    }

    #[test]
    fn empty_store_loads_empty_state() {
        let repo = SqliteTermRepository::open_in_memory().unwrap();
        let state = repo.load_state().unwrap();
        assert!(state.registry.terms.is_empty());
        assert!(state.blocked.is_empty());
    }

    #[test]
    fn load_rejects_non_normalized_keys() {
        let repo = SqliteTermRepository::open_in_memory().unwrap();
        repo.connection()
            .execute("INSERT INTO blocked_terms (key) VALUES ('Solidity');", [])
            .unwrap();
        let err = repo.load_state().unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    }
}

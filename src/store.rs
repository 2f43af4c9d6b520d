use rusqlite::{Connection, Row, Transaction, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::country::{Country, NewCountry, Value};
use crate::error::{Error, Result};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS country (
    id INTEGER PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    population INTEGER,
    area INTEGER,
    join_year INTEGER,
    gdp INTEGER,
    avg_income INTEGER,
    border_length INTEGER
)";

const SELECT_COLUMNS: &str =
    "SELECT id, name, population, area, join_year, gdp, avg_income, border_length FROM country";

/// Narrow storage interface handed to the ingestion, query and chart code
///
/// Rows are only ever replaced wholesale or appended; there is no update or
/// delete. Every method reports an unreachable or failing database as
/// [`Error::StorageUnavailable`].
pub trait RecordStore: Send + Sync {
    /// Drop every existing row and install `rows` with ids starting at 1
    fn replace_all(&self, rows: &[NewCountry]) -> Result<usize>;

    /// Add `rows` after the current maximum id without touching existing rows
    fn append(&self, rows: &[NewCountry]) -> Result<usize>;

    /// Every record in storage order
    fn all(&self) -> Result<Vec<Country>>;

    /// Records whose name contains `needle`, in storage order
    fn filter_by_name_contains(&self, needle: &str) -> Result<Vec<Country>>;

    fn count(&self) -> Result<usize>;
}

/// [`RecordStore`] backed by a single SQLite connection
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and ensure the table exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(Error::StorageUnavailable(format!(
                    "database directory {} does not exist",
                    parent.display()
                )));
            }
        }
        let connection = Connection::open(path)?;
        Self::with_connection(connection)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        connection.execute(CREATE_TABLE, [])?;
        Ok(SqliteStore {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| Error::StorageUnavailable("connection mutex poisoned".to_string()))
    }

    fn query(&self, sql: &str, pattern: Option<&str>) -> Result<Vec<Country>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match pattern {
            Some(pattern) => stmt.query_map(params![pattern], map_country)?,
            None => stmt.query_map([], map_country)?,
        };
        let countries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(countries)
    }
}

impl RecordStore for SqliteStore {
    fn replace_all(&self, rows: &[NewCountry]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DROP TABLE IF EXISTS country", [])?;
        tx.execute(CREATE_TABLE, [])?;
        let inserted = insert_rows(&tx, rows)?;
        tx.commit()?;
        Ok(inserted)
    }

    fn append(&self, rows: &[NewCountry]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let inserted = insert_rows(&tx, rows)?;
        tx.commit()?;
        Ok(inserted)
    }

    fn all(&self) -> Result<Vec<Country>> {
        self.query(&format!("{} ORDER BY id", SELECT_COLUMNS), None)
    }

    fn filter_by_name_contains(&self, needle: &str) -> Result<Vec<Country>> {
        let pattern = format!("%{}%", escape_like(needle));
        self.query(
            &format!("{} WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id", SELECT_COLUMNS),
            Some(&pattern),
        )
    }

    fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM country", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn insert_rows(tx: &Transaction<'_>, rows: &[NewCountry]) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT INTO country (name, population, area, join_year, gdp, avg_income, border_length)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.name,
            row.population,
            row.area,
            row.join_year,
            row.gdp,
            row.avg_income,
            row.border_length,
        ])?;
    }
    Ok(rows.len())
}

fn map_country(row: &Row<'_>) -> rusqlite::Result<Country> {
    let name: Value = row.get(1)?;
    Ok(Country {
        id: row.get(0)?,
        fields: NewCountry {
            name: name.to_string(),
            population: row.get(2)?,
            area: row.get(3)?,
            join_year: row.get(4)?,
            gdp: row.get(5)?,
            avg_income: row.get(6)?,
            border_length: row.get(7)?,
        },
    })
}

/// Escape LIKE wildcards so the filter is matched as a literal substring
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::country::Attribute;

    fn sample() -> Vec<NewCountry> {
        vec![
            NewCountry::named("Latvia").with(Attribute::AvgIncome, 1200),
            NewCountry::named("Estonia").with(Attribute::AvgIncome, 1300),
            NewCountry::named("Lithuania").with(Attribute::Population, 2_800_000),
        ]
    }

    #[test]
    fn replace_assigns_ids_from_one() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(&sample()).unwrap();
        store.replace_all(&sample()[..2]).unwrap();

        let all = store.all().unwrap();
        let ids: Vec<i64> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(all[0].name(), "Latvia");
        assert_eq!(all[1].get(Attribute::AvgIncome), &Value::Integer(1300));
    }

    #[test]
    fn append_continues_after_max() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_all(&sample()).unwrap();
        let before = store.all().unwrap();

        store.append(&[NewCountry::named("Finland")]).unwrap();
        let after = store.all().unwrap();

        assert_eq!(after.len(), 4);
        assert_eq!(&after[..3], &before[..]);
        assert_eq!(after[3].id, 4);
        assert_eq!(store.count().unwrap(), 4);
    }

    #[test]
    fn filter_is_case_insensitive_and_literal() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_all(&sample()).unwrap();
        store.append(&[NewCountry::named("100% Land")]).unwrap();

        let names: Vec<String> = store
            .filter_by_name_contains("LAT")
            .unwrap()
            .into_iter()
            .map(|c| c.fields.name)
            .collect();
        assert_eq!(names, vec!["Latvia"]);

        assert_eq!(store.filter_by_name_contains("%").unwrap().len(), 1);
        assert!(store.filter_by_name_contains("_").unwrap().is_empty());
    }

    #[test]
    fn passthrough_values_survive_storage() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut row = NewCountry::named("Malta");
        row.set(Attribute::Area, Value::Text("316 km2".into()));
        row.set(Attribute::Gdp, Value::Real(17.5));
        store.replace_all(&[row.clone()]).unwrap();

        let stored = store.all().unwrap().remove(0);
        assert_eq!(stored.fields, row);
    }

    #[test]
    fn rows_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.replace_all(&sample()).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteStore::open(dir.path().join("nope").join("data.db"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }
}

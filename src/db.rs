use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "club.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS athletes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            type_athlete TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_athletes_type ON athletes(type_athlete)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT,
            location TEXT,
            observations TEXT,
            user_id INTEGER NOT NULL
        )",
        [],
    )?;

    // metrics_json carries the tagged per-type fields; test_type is duplicated
    // as a column for filtering and stats.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tests(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            evaluation_id INTEGER NOT NULL,
            athlete_id INTEGER NOT NULL,
            test_type TEXT NOT NULL,
            date TEXT NOT NULL,
            observations TEXT,
            metrics_json TEXT NOT NULL,
            FOREIGN KEY(evaluation_id) REFERENCES evaluations(id),
            FOREIGN KEY(athlete_id) REFERENCES athletes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tests_evaluation ON tests(evaluation_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tests_athlete ON tests(athlete_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendances(
            athlete_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            time TEXT,
            is_present INTEGER NOT NULL,
            justification TEXT,
            PRIMARY KEY(athlete_id, date),
            FOREIGN KEY(athlete_id) REFERENCES athletes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendances_date ON attendances(date)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('athletes','evaluations','tests','attendances')",
                [],
                |r| r.get(0),
            )
            .expect("count tables");
        assert_eq!(n, 4);
    }
}

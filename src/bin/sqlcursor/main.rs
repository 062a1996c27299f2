mod args;

use std::fs;
use std::io::{self, BufWriter, Write};

use clap::Parser;
use serde_json::{Map, Value as JsonValue};
use sql_cursor::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::args::Args;

fn row_to_json(row: &Row) -> JsonValue {
    let mut object = Map::with_capacity(row.len());
    for (name, value) in row.iter() {
        object.insert(name.to_string(), value.to_json());
    }
    JsonValue::Object(object)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let opts = args.connect_options()?;
    tracing::debug!(options = ?opts, "connecting");
    let conn = Connection::open_with(opts)?;
    let mut cursor = conn.cursor()?;

    if let Some(path) = &args.script {
        let script = fs::read_to_string(path)?;
        cursor.executescript(&script)?;
        tracing::info!(script = %path.display(), "script finished");
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for sql in &args.execute {
        cursor.execute(sql, ())?;
        for row in cursor.by_ref() {
            writeln!(out, "{}", row_to_json(&row?))?;
        }
        tracing::info!(
            rowcount = cursor.rowcount(),
            lastrowid = ?cursor.lastrowid(),
            "statement executed"
        );
    }
    out.flush()?;

    conn.commit()?;
    cursor.close()?;
    conn.close()?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(err) = run(&args) {
        eprintln!("sqlcursor: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_and_statements_are_committed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let db = dir.path().join("cli.db").to_string_lossy().into_owned();
        let script = dir.path().join("setup.sql");
        fs::write(&script, "CREATE TABLE t(x, label); INSERT INTO t VALUES (1, 'one');")?;
        let script = script.to_string_lossy().into_owned();

        let args = Args::try_parse_from([
            "sqlcursor",
            db.as_str(),
            "--script",
            script.as_str(),
            "-e",
            "INSERT INTO t VALUES (2, 'two')",
            "-e",
            "SELECT count(*) AS n FROM t",
        ])?;
        run(&args)?;

        let conn = Connection::open(&db)?;
        let rows = conn.execute("SELECT x, label FROM t ORDER BY x", ())?.fetchall()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(row_to_json(&rows[1]), serde_json::json!({"x": 2, "label": "two"}));
        Ok(())
    }

    #[test]
    fn failing_statement_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let args = Args::try_parse_from(["sqlcursor", ":memory:", "-e", "SELECT * FROM missing"])?;
        let err = run(&args).unwrap_err();
        assert!(err.to_string().contains("no such table"));
        Ok(())
    }
}

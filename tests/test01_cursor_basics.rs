use sql_cursor::prelude::*;

#[test]
fn create_insert_select_round() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;

    cur.execute("CREATE TABLE t(x)", ())?;
    cur.execute("INSERT INTO t VALUES (1)", ())?;
    assert_eq!(cur.lastrowid(), Some(1));
    assert_eq!(cur.rowcount(), 1);

    cur.execute("SELECT x FROM t", ())?;
    assert_eq!(cur.rowcount(), -1);
    assert_eq!(cur.lastrowid(), None);
    assert_eq!(cur.description().len(), 1);
    assert_eq!(cur.description()[0].name, "x");

    let rows = cur.fetchall()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec![RowValues::Int(1)]);
    assert!(cur.fetchone()?.is_none());
    Ok(())
}

#[test]
fn empty_select_still_describes_columns() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("CREATE TABLE people(id INTEGER PRIMARY KEY, name TEXT)", ())?;
    cur.execute("SELECT id, name FROM people", ())?;
    let names: Vec<&str> = cur.description().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name"]);
    assert_eq!(cur.description()[1].declared_type.as_deref(), Some("TEXT"));
    assert!(cur.fetchone()?.is_none());
    Ok(())
}

#[test]
fn description_is_reset_by_the_next_execute() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT 1 AS a", ())?;
    assert_eq!(cur.description().len(), 1);
    cur.execute("CREATE TABLE t(x)", ())?;
    assert!(cur.description().is_empty());
    Ok(())
}

#[test]
fn fetchmany_uses_arraysize_and_iteration_drains() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.executescript(
        "CREATE TABLE n(v INTEGER);
         INSERT INTO n VALUES (1);
         INSERT INTO n VALUES (2);
         INSERT INTO n VALUES (3);
         INSERT INTO n VALUES (4);
         INSERT INTO n VALUES (5);",
    )?;

    cur.execute("SELECT v FROM n ORDER BY v", ())?;
    assert_eq!(cur.fetchmany(None)?.len(), 1);
    cur.set_arraysize(3);
    let batch = cur.fetchmany(None)?;
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].get("V"), Some(&RowValues::Int(2)));
    let rest: Vec<Row> = cur.by_ref().collect::<Result<_, _>>()?;
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].get_by_index(0), Some(&RowValues::Int(5)));
    assert!(cur.fetchmany(Some(10))?.is_empty());
    Ok(())
}

#[test]
fn positional_and_named_parameters() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("CREATE TABLE kv(k TEXT, v INTEGER)", ())?;
    cur.execute(
        "INSERT INTO kv VALUES (?, ?)",
        vec![RowValues::from("a"), RowValues::Int(1)],
    )?;
    cur.execute(
        "INSERT INTO kv VALUES (:key, :value)",
        Params::named([("key", RowValues::from("b")), ("value", RowValues::Int(2))]),
    )?;

    let row = cur
        .execute("SELECT v FROM kv WHERE k = $k", Params::named([("k", "b")]))?
        .fetchone()?
        .ok_or("expected a row")?;
    assert_eq!(row.get("v"), Some(&RowValues::Int(2)));
    Ok(())
}

#[test]
fn parameter_mistakes_are_programming_errors() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;

    let err = cur.execute("SELECT ?, ?", vec![RowValues::Int(1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert!(err.to_string().contains("uses 2, and there are 1 supplied"));

    let err = cur
        .execute("SELECT :a, :b", Params::named([("a", 1)]))
        .unwrap_err();
    assert!(err.to_string().contains("You did not supply a value for binding 2."));

    let err = cur
        .execute("SELECT ?", Params::named([("a", 1)]))
        .unwrap_err();
    assert!(err.to_string().contains("has no name"));

    let err = cur.execute("   ", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);

    // the cursor remains usable afterwards
    let row = cur.execute("SELECT ?", vec![RowValues::Int(9)])?.fetchone()?;
    assert_eq!(row.and_then(|r| r.get_by_index(0).cloned()), Some(RowValues::Int(9)));
    Ok(())
}

#[test]
fn compile_errors_are_operational() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    let err = cur.execute("SELECT * FROM missing_table", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operational);
    assert!(err.to_string().contains("no such table"));

    let err = cur.execute("SELECT 1; SELECT 2", ()).unwrap_err();
    assert!(err.to_string().contains("one statement at a time"));
    Ok(())
}

#[test]
fn closed_cursor_rejects_use() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT 1 UNION ALL SELECT 2", ())?;
    cur.close()?;
    assert!(cur.is_closed());
    assert!(matches!(cur.fetchone(), Err(SqlCursorError::Closed(_))));
    assert!(matches!(cur.execute("SELECT 1", ()), Err(SqlCursorError::Closed(_))));

    // the statement went back to the cache
    let mut other = conn.cursor()?;
    other.execute("SELECT 1 UNION ALL SELECT 2", ())?;
    assert_eq!(other.fetchall()?.len(), 2);
    assert_eq!(conn.cache_stats()?.hits, 1);
    Ok(())
}

#[test]
fn closing_the_connection_invalidates_cursors() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT 1 UNION ALL SELECT 2", ())?;
    conn.close()?;
    conn.close()?;
    let err = cur.fetchone().unwrap_err();
    assert!(matches!(err, SqlCursorError::Closed(ref what) if what == "database"));
    drop(cur);
    Ok(())
}

#[test]
fn connection_conveniences_return_their_cursor() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    conn.executescript("CREATE TABLE t(x); INSERT INTO t VALUES (10);")?;
    let inserted = conn.executemany("INSERT INTO t VALUES (?)", [[RowValues::Int(11)], [RowValues::Int(12)]])?;
    assert_eq!(inserted.rowcount(), 2);
    let mut cur = conn.execute("SELECT sum(x) AS total FROM t", ())?;
    let row = cur.fetchone()?.ok_or("expected a row")?;
    assert_eq!(row.get("total"), Some(&RowValues::Int(33)));
    Ok(())
}

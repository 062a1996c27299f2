use std::collections::HashMap;

use sql_cursor::prelude::*;

#[test]
fn executemany_inserts_every_parameter_set() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("CREATE TABLE t(x)", ())?;
    cur.executemany(
        "INSERT INTO t VALUES (?)",
        [[RowValues::Int(1)], [RowValues::Int(2)], [RowValues::Int(3)]],
    )?;
    assert_eq!(cur.rowcount(), 3);
    assert_eq!(cur.lastrowid(), Some(3));

    let row = cur.execute("SELECT count(*) FROM t", ())?.fetchone()?.ok_or("no row")?;
    assert_eq!(row.get_by_index(0), Some(&RowValues::Int(3)));
    Ok(())
}

#[test]
fn update_rowcount_is_summed_over_sets() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    conn.executescript(
        "CREATE TABLE s(grp INTEGER, v INTEGER);
         INSERT INTO s VALUES (1, 0);
         INSERT INTO s VALUES (1, 0);
         INSERT INTO s VALUES (2, 0);
         INSERT INTO s VALUES (3, 0);",
    )?;
    let mut cur = conn.cursor()?;
    let sets: Vec<HashMap<String, RowValues>> = [1, 2, 9]
        .into_iter()
        .map(|g| HashMap::from([("g".to_string(), RowValues::Int(g))]))
        .collect();
    cur.executemany("UPDATE s SET v = v + 1 WHERE grp = :g", sets)?;
    assert_eq!(cur.rowcount(), 3);
    assert_eq!(cur.lastrowid(), None);
    Ok(())
}

#[test]
fn executemany_accepts_a_lazy_iterator() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("CREATE TABLE sq(n, n2)", ())?;
    cur.executemany(
        "INSERT INTO sq VALUES (?, ?)",
        (1..=10i64).map(|n| vec![RowValues::Int(n), RowValues::Int(n * n)]),
    )?;
    assert_eq!(cur.rowcount(), 10);
    let row = cur.execute("SELECT sum(n2) FROM sq", ())?.fetchone()?.ok_or("no row")?;
    assert_eq!(row.get_by_index(0), Some(&RowValues::Int(385)));
    Ok(())
}

#[test]
fn executemany_rejects_queries() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    let err = cur
        .executemany("SELECT ?", [[RowValues::Int(1)]])
        .map(|_| ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert!(err.to_string().contains("executemany() can only execute DML statements"));

    // a non-SELECT that still yields rows is rejected when the row shows up
    let err = cur
        .executemany("VALUES (?)", [[RowValues::Int(1)]])
        .map(|_| ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    Ok(())
}

#[test]
fn empty_executemany_leaves_rowcount_unknown() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("CREATE TABLE t(x)", ())?;
    cur.executemany("INSERT INTO t VALUES (?)", Vec::<Params>::new())?;
    assert_eq!(cur.rowcount(), -1);
    Ok(())
}

#[test]
fn script_commits_open_transaction_first() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let mut cur = conn.cursor()?;
    cur.execute("CREATE TABLE t(x)", ())?;
    cur.execute("INSERT INTO t VALUES (1)", ())?;
    assert!(conn.in_transaction()?);

    cur.executescript(
        "-- a comment before the first statement
         INSERT INTO t VALUES (2);
         CREATE TABLE u(y);
         CREATE TRIGGER copy AFTER INSERT ON t BEGIN INSERT INTO u VALUES (new.x); END;
         INSERT INTO t VALUES (3);
         SELECT * FROM t;",
    )?;
    assert!(!conn.in_transaction()?);
    assert!(cur.description().is_empty());
    assert_eq!(cur.rowcount(), -1);

    let rows = cur.execute("SELECT y FROM u", ())?.fetchall()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("y"), Some(&RowValues::Int(3)));
    Ok(())
}

#[test]
fn script_ignores_incomplete_tail() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    conn.executescript("CREATE TABLE t(x); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2)")?;
    let rows = conn.execute("SELECT x FROM t", ())?.fetchall()?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[test]
fn script_stops_at_first_error() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(":memory:")?;
    let err = conn
        .executescript("CREATE TABLE t(x); INSERT INTO nope VALUES (1); CREATE TABLE later(y);")
        .map(|_| ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operational);
    assert!(err.to_string().contains("no such table: nope"));
    let tables = conn
        .execute("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name", ())?
        .fetchall()?;
    let names: Vec<&str> = tables
        .iter()
        .filter_map(|r| r.get("name").and_then(RowValues::as_text))
        .collect();
    assert_eq!(names, ["t"]);
    Ok(())
}

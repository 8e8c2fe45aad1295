use sqlkit::prelude::*;
use sqlkit::{ColumnErrorKind, CursorState};

fn open_with_foo() -> Connection {
    let conn = Connection::open_memory().expect("open sqlite memory db");
    conn.execute("create table foo(id integer primary key, n integer)")
        .expect("create foo");
    conn
}

#[test]
fn insert_and_read_back_scenario() {
    let conn = open_with_foo();

    let inserted = conn
        .execute("insert into foo(n) values (5)")
        .expect("insert");
    assert_eq!(
        inserted,
        ExecutionResult::Modification {
            last_insert_rowid: 1,
            changed_rows: 1
        }
    );

    let mut rows = conn
        .query("select n from foo where id=1")
        .expect("query");
    assert!(rows.next().expect("first row"));
    assert_eq!(rows.int("n").expect("read n"), Some(5));
    assert!(!rows.next().expect("end of rows"));
    assert_eq!(rows.state(), CursorState::Exhausted);
}

#[test]
fn blob_round_trip_for_many_lengths() {
    let conn = Connection::open_memory().expect("open sqlite memory db");
    conn.execute("create table blobs(id integer primary key, data blob not null)")
        .expect("create blobs");

    let lengths = [0usize, 1, 2, 255, 256, 4096, 100_000];
    for len in lengths {
        let payload: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
        let inserted = conn
            .execute_with("insert into blobs(data) values (?)", |p| {
                p.bind(1, payload.clone())
            })
            .expect("insert blob");
        let id = inserted.last_insert_rowid().expect("modification");

        let mut rows = conn
            .query_with("select data from blobs where id = ?", |p| p.bind(1, id))
            .expect("select blob");
        assert!(rows.next().expect("blob row"));
        assert_eq!(
            rows.bytes("data").expect("read blob"),
            Some(payload),
            "length {len}"
        );
    }
}

#[test]
fn null_reads_as_absent_for_every_accessor() {
    let conn = Connection::open_memory().expect("open sqlite memory db");
    conn.execute("create table n(i integer, t text, r real, b blob)")
        .expect("create n");
    conn.execute_with("insert into n values (?, ?, ?, ?)", |p| {
        p.bind_all([Value::Null, Value::Null, Value::Null, Value::Null])
    })
    .expect("insert nulls");

    let mut rows = conn.query("select i, t, r, b from n").expect("query");
    assert!(rows.next().expect("row"));
    assert_eq!(rows.int(0).expect("int"), None);
    assert_eq!(rows.long(0).expect("long"), None);
    assert_eq!(rows.string(1).expect("string"), None);
    assert_eq!(rows.double(2).expect("double"), None);
    assert_eq!(rows.bytes(3).expect("bytes"), None);
    assert_eq!(rows.value("b").expect("value"), Value::Null);
}

#[test]
fn close_with_leaked_statement_then_close_again() {
    let mut conn = open_with_foo();
    conn.execute("insert into foo(n) values (1), (2), (3)")
        .expect("insert");

    let mut rows = conn.query("select n from foo").expect("query");
    assert!(rows.next().expect("row"));
    // Simulate a statement that was never finalized
    std::mem::forget(rows);

    conn.close().expect("close reclaims leaked statement");
    assert!(!conn.is_open());
    conn.close().expect("second close is a no-op");
    assert!(!conn.good_connection());
}

#[test]
fn closed_connection_refuses_new_statements() {
    let mut conn = open_with_foo();
    conn.close().expect("close");

    let err = conn.prepare("select 1").unwrap_err();
    assert!(err.is_connection_closed());
    assert_eq!(
        err.to_string(),
        "Connection error: connection is closed at path: :memory:"
    );
}

#[test]
fn named_map_binding_with_nulls() {
    let conn = Connection::open_memory().expect("open sqlite memory db");
    conn.execute(
        "create table foo(id integer primary key autoincrement, bar text not null, baz text not null, num integer)",
    )
    .expect("create foo");

    let data = [
        ("bara", "bazb", Some(1)),
        ("barb", "bazc", Some(2)),
        ("barc", "bazd", None),
    ];
    for (bar, baz, num) in data {
        conn.execute_with(
            "insert into foo(bar, baz, num) values (:bar, :baz, :num)",
            |p| {
                p.bind_map([
                    ("bar", Value::from(bar)),
                    ("baz", Value::from(baz)),
                    ("num", Value::from(num)),
                ])
            },
        )
        .expect("insert row");
    }

    let rows = conn
        .query("select bar, num from foo order by id")
        .expect("query")
        .collect_rows()
        .expect("collect");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].get_named::<String>("bar").expect("bar"), "barb");
    assert_eq!(rows[2].get_named::<Option<i64>>("num").expect("num"), None);
}

#[test]
fn column_lookup_errors_are_typed() {
    let conn = open_with_foo();
    conn.execute("insert into foo(n) values (1)").expect("insert");
    let mut rows = conn.query("select n from foo").expect("query");
    assert!(rows.next().expect("row"));

    match rows.long("nope").unwrap_err() {
        Error::Column(e) => assert_eq!(e.kind, ColumnErrorKind::NotFound),
        other => panic!("unexpected error: {other}"),
    }
    match rows.long(7).unwrap_err() {
        Error::Column(e) => assert_eq!(e.kind, ColumnErrorKind::OutOfRange),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn engine_version_is_available_without_a_connection() {
    assert!(sqlkit::engine_version().starts_with('3'));
    assert!(sqlkit::engine_version_number() >= 3_000_000);
}

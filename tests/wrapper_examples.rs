use anyhow::Result;
use sqlite_wrapper::{Connection, DataType, ErrorKind, SqliteConfig, StatementState, Value};
use tempfile::NamedTempFile;

#[derive(Debug, PartialEq)]
struct User {
    name: String,
    email: String,
    age: Option<i32>,
}

// Helper function to create an in-memory database for testing
fn create_test_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    initialize_schema(&conn)?;
    Ok(conn)
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> Result<(Connection, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_str().unwrap();
    let conn = Connection::open(path)?;
    initialize_schema(&conn)?;
    Ok((conn, temp_file))
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.direct_statement(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            age INTEGER
        );
        CREATE INDEX idx_users_email ON users(email);
        "#,
    )?;
    Ok(())
}

fn insert_users(conn: &Connection, users: &[User]) -> Result<()> {
    let mut stmt = conn.statement("INSERT INTO users (name, email, age) VALUES (?, ?, ?)")?;
    for user in users {
        stmt.bind(0, user.name.as_str())?;
        stmt.bind(1, user.email.as_str())?;
        stmt.bind(2, user.age)?;
        stmt.execute()?;
    }
    Ok(())
}

fn sample_users() -> Vec<User> {
    vec![
        User {
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            age: Some(30),
        },
        User {
            name: "Jane Roe".to_string(),
            email: "jane@example.com".to_string(),
            age: None,
        },
        User {
            name: "Max Poe".to_string(),
            email: "max@example.com".to_string(),
            age: Some(41),
        },
    ]
}

#[test]
fn test_open_and_select_one() -> Result<()> {
    let (conn, _file) = create_temp_db()?;
    conn.direct_statement("select 1")?;
    Ok(())
}

#[test]
fn test_open_invalid_path() {
    let err = Connection::open("/nonexistent-dir/for/sure/db.sqlite").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::CantOpen));
}

#[test]
fn test_open_read_only_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.db");
    let config = SqliteConfig::new(path.to_str().unwrap()).read_only();
    assert!(Connection::open_with_config(&config).is_err());
}

#[test]
fn test_bulk_select_shape_and_null_marker() -> Result<()> {
    let conn = create_test_db()?;
    insert_users(&conn, &sample_users())?;

    let table = conn.select("SELECT name, email, age FROM users ORDER BY id")?;
    assert_eq!(table.len(), 3);
    assert!(table.iter().all(|record| record.len() == 3));
    assert_eq!(table.columns, vec!["name", "email", "age"]);

    let rendered = table.to_strings(false);
    assert_eq!(rendered[0], vec!["John Doe", "john@example.com", "30"]);
    assert_eq!(rendered[1][2], "<null>");
    assert_eq!(table.records[1].fields[2], Value::Null);

    let with_header = table.to_strings(true);
    assert_eq!(with_header.len(), 4);
    assert_eq!(with_header[0], vec!["name", "email", "age"]);
    Ok(())
}

#[test]
fn test_select_into_clears_previous_rows() -> Result<()> {
    let conn = create_test_db()?;
    insert_users(&conn, &sample_users())?;

    let mut table = conn.select("SELECT name FROM users")?;
    conn.select_into("SELECT email FROM users WHERE age > 35", &mut table)?;
    assert_eq!(table.len(), 1);
    assert_eq!(table.columns, vec!["email"]);
    Ok(())
}

#[test]
fn test_select_error_keeps_partial_rows() -> Result<()> {
    let conn = create_test_db()?;
    insert_users(&conn, &sample_users())?;

    let mut table = conn.select("SELECT 1")?;
    let err = conn
        .select_into("SELECT name FROM users; SELECT * FROM missing", &mut table)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Generic));
    assert_eq!(table.len(), 3);
    Ok(())
}

#[test]
fn test_prepared_insert_is_visible() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = conn.statement("INSERT INTO users (name, email, age) VALUES (?, ?, ?)")?;
    stmt.bind(0, "John Doe")?;
    stmt.bind(1, String::from("john@example.com"))?;
    stmt.bind(2, 30)?;
    stmt.execute()?;
    assert_eq!(stmt.state(), StatementState::Ready);

    let table = conn.select("SELECT name, email, age FROM users")?;
    assert_eq!(
        table.records[0].to_strings(),
        vec!["John Doe", "john@example.com", "30"]
    );
    Ok(())
}

#[test]
fn test_bind_double_and_null() -> Result<()> {
    let conn = Connection::open_in_memory()?;
    conn.direct_statement("CREATE TABLE m (x REAL, y TEXT)")?;
    let mut stmt = conn.statement("INSERT INTO m VALUES (?, ?)")?;
    stmt.bind(0, 2.5)?;
    stmt.bind_null(1)?;
    stmt.execute()?;

    let mut select = conn.statement("SELECT x, y FROM m")?;
    assert!(select.next_row()?);
    assert_eq!(select.data_type(0), DataType::Float);
    assert_eq!(select.value_string(0), "2.5");
    assert_eq!(select.data_type(1), DataType::Null);
    Ok(())
}

#[test]
fn test_statement_rerun_after_execute() -> Result<()> {
    let conn = create_test_db()?;
    // insert_users re-binds and re-runs a single statement per user
    insert_users(&conn, &sample_users())?;
    let count = conn.select("SELECT count(*) FROM users")?;
    assert_eq!(count.records[0].fields[0], Value::Integer(3));
    Ok(())
}

#[test]
fn test_empty_select() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = conn.statement("SELECT name FROM users WHERE age > ?")?;
    stmt.bind(0, 100)?;

    assert!(!stmt.next_row()?);
    assert_eq!(stmt.state(), StatementState::Ready);

    stmt.restart_select();
    assert!(!stmt.next_row()?);
    Ok(())
}

#[test]
fn test_iteration_matches_bulk_select() -> Result<()> {
    let conn = create_test_db()?;
    let users = sample_users();
    insert_users(&conn, &users)?;

    let table = conn.select("SELECT name, age FROM users ORDER BY id")?;
    let mut stmt = conn.statement("SELECT name, age FROM users ORDER BY id")?;

    let mut seen = 0;
    while stmt.next_row()? {
        let record = &table.records[seen];
        assert_eq!(stmt.value_string(0), record.fields[0].render());
        assert_eq!(stmt.value(1), record.fields[1]);
        if let Some(age) = users[seen].age {
            assert_eq!(stmt.value_int(1), age);
        }
        seen += 1;
    }
    assert_eq!(seen, users.len());
    Ok(())
}

#[test]
fn test_restart_after_partial_iteration() -> Result<()> {
    let conn = create_test_db()?;
    insert_users(&conn, &sample_users())?;

    let mut stmt = conn.statement("SELECT email FROM users ORDER BY id")?;
    assert!(stmt.next_row()?);
    assert!(stmt.next_row()?);

    stmt.restart_select();
    let mut emails = Vec::new();
    while stmt.next_row()? {
        emails.push(stmt.value_string(0));
    }
    assert_eq!(
        emails,
        vec!["john@example.com", "jane@example.com", "max@example.com"]
    );
    Ok(())
}

#[test]
fn test_restart_keeps_bindings() -> Result<()> {
    let conn = create_test_db()?;
    insert_users(&conn, &sample_users())?;

    let mut stmt = conn.statement("SELECT name FROM users WHERE age >= ?")?;
    stmt.bind(0, 30)?;
    assert!(stmt.next_row()?);
    stmt.restart_select();

    let mut rows = 0;
    while stmt.next_row()? {
        rows += 1;
    }
    assert_eq!(rows, 2);
    Ok(())
}

#[test]
fn test_reset_probe() -> Result<()> {
    let conn = create_test_db()?;
    insert_users(&conn, &sample_users())?;

    let mut stmt = conn.statement("SELECT 1 FROM users WHERE email = ?")?;
    stmt.bind(0, "jane@example.com")?;
    assert!(stmt.reset()?);
    assert_eq!(stmt.state(), StatementState::Ready);

    stmt.bind(0, "nobody@example.com")?;
    assert!(!stmt.reset()?);
    Ok(())
}

#[test]
fn test_bind_out_of_range() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = conn.statement("SELECT name FROM users WHERE id = ?")?;
    let err = stmt.bind(3, 1).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Range));
    // The statement is still usable afterwards.
    stmt.bind(0, 1)?;
    assert!(!stmt.next_row()?);
    Ok(())
}

#[test]
fn test_prepare_failures() -> Result<()> {
    let conn = create_test_db()?;
    let err = conn.statement("SELEKT nothing").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Generic));
    assert!(err.to_string().contains("syntax error"));

    let err = conn.statement("   ").unwrap_err();
    assert!(matches!(err, sqlite_wrapper::Error::EmptyStatement { .. }));
    Ok(())
}

#[test]
fn test_constraint_violation_kind() -> Result<()> {
    let conn = create_test_db()?;
    insert_users(&conn, &sample_users()[..1])?;

    let mut stmt = conn.statement("INSERT INTO users (name, email) VALUES (?, ?)")?;
    stmt.bind(0, "Copy")?;
    stmt.bind(1, "john@example.com")?;
    let err = stmt.execute().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Constraint));
    assert_eq!(stmt.state(), StatementState::Interrupted);
    assert!(conn.last_error().contains("UNIQUE"));

    stmt.restart_select();
    stmt.bind(1, "copy@example.com")?;
    stmt.execute()?;
    Ok(())
}

#[test]
fn test_busy_is_reported_distinctly() -> Result<()> {
    let (writer, file) = create_temp_db()?;
    let config = SqliteConfig::new(file.path().to_str().unwrap()).with_busy_timeout(0);
    let reader = Connection::open_with_config(&config)?;

    // Prepared first so the schema is already loaded when the lock is taken.
    let mut stmt = reader.statement("SELECT count(*) FROM users")?;
    writer.direct_statement("BEGIN EXCLUSIVE")?;

    let err = stmt.next_row().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Busy));
    assert!(err.is_busy());
    assert_eq!(stmt.state(), StatementState::Interrupted);

    writer.rollback()?;
    stmt.restart_select();
    assert!(stmt.next_row()?);
    assert_eq!(stmt.value_int(0), 0);
    Ok(())
}

#[test]
fn test_reset_reports_busy_and_still_resets() -> Result<()> {
    let (writer, file) = create_temp_db()?;
    insert_users(&writer, &sample_users())?;
    let config = SqliteConfig::new(file.path().to_str().unwrap()).with_busy_timeout(0);
    let reader = Connection::open_with_config(&config)?;

    let mut stmt = reader.statement("SELECT name FROM users")?;
    writer.direct_statement("BEGIN EXCLUSIVE")?;

    let err = stmt.reset().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Busy));
    assert_eq!(stmt.state(), StatementState::Ready);

    writer.rollback()?;
    assert!(stmt.reset()?);
    assert!(stmt.next_row()?);
    Ok(())
}

#[test]
fn test_execute_reports_busy() -> Result<()> {
    let (writer, file) = create_temp_db()?;
    let config = SqliteConfig::new(file.path().to_str().unwrap()).with_busy_timeout(0);
    let reader = Connection::open_with_config(&config)?;

    let mut stmt = reader.statement("INSERT INTO users (name, email) VALUES (?, ?)")?;
    stmt.bind(0, "Late")?;
    stmt.bind(1, "late@example.com")?;
    writer.direct_statement("BEGIN EXCLUSIVE")?;

    let err = stmt.execute().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Busy));
    assert!(err.is_busy());
    assert_eq!(stmt.state(), StatementState::Interrupted);

    writer.rollback()?;
    stmt.restart_select();
    stmt.execute()?;
    assert_eq!(writer.select("SELECT email FROM users")?.len(), 1);
    Ok(())
}

#[test]
fn test_real_rendering_matches_engine_text() -> Result<()> {
    let conn = Connection::open_in_memory()?;
    let sql = "SELECT 0.1 + 0.2, 1.0 / 3, 1e300, 1e15, 123456789.123456789, 2.0, -0.5";

    let rendered = conn.select(sql)?.to_strings(false);
    let mut stmt = conn.statement(sql)?;
    assert!(stmt.next_row()?);
    let stepped: Vec<String> = (0..stmt.column_count())
        .map(|i| stmt.value_string(i))
        .collect();

    assert_eq!(rendered[0], stepped);
    assert_eq!(stepped[0], "0.3");
    assert_eq!(stepped[2], "1.0e+300");
    Ok(())
}

#[test]
fn test_transactions() -> Result<()> {
    let conn = create_test_db()?;

    conn.begin()?;
    assert!(!conn.is_autocommit());
    insert_users(&conn, &sample_users())?;
    conn.rollback()?;
    assert!(conn.select("SELECT * FROM users")?.is_empty());

    conn.begin()?;
    insert_users(&conn, &sample_users())?;
    conn.commit()?;
    assert_eq!(conn.select("SELECT * FROM users")?.len(), 3);

    assert!(conn.commit().is_err());
    Ok(())
}

#[test]
fn test_text_and_blob_are_copied() -> Result<()> {
    let conn = Connection::open_in_memory()?;
    let mut stmt = conn.statement("SELECT ?, ?")?;
    {
        let text = String::from("transient");
        let blob = vec![0u8, 1, 2, 255];
        stmt.bind(0, text.as_str())?;
        stmt.bind(1, blob.as_slice())?;
    }
    assert!(stmt.next_row()?);
    assert_eq!(stmt.value_string(0), "transient");
    assert_eq!(stmt.value_blob(1), vec![0u8, 1, 2, 255]);
    Ok(())
}

#[tokio::test]
async fn test_connection_moves_to_worker_thread() {
    let (conn, file) = create_temp_db().unwrap();
    insert_users(&conn, &sample_users()).unwrap();

    let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
        let mut stmt = conn.statement("SELECT name FROM users ORDER BY name")?;
        let mut names = Vec::new();
        while stmt.next_row()? {
            names.push(stmt.value_string(0));
        }
        Ok(names)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(names, vec!["Jane Roe", "John Doe", "Max Poe"]);
    drop(file);
}

use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "bendahara.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            parent_name TEXT NOT NULL,
            parent_email TEXT NOT NULL,
            parent_phone TEXT,
            status TEXT NOT NULL,
            registration_date TEXT,
            birth_date TEXT,
            address TEXT,
            emergency_contact TEXT,
            emergency_phone TEXT,
            medical_notes TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    // Parent portal lists schedules by the signed-in parent's email.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_parent_email ON students(parent_email)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_name ON students(class_name)",
        [],
    )?;

    // No foreign key from students.class_name: the two are correlated by
    // string equality only, matching the product's data model.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher TEXT NOT NULL,
            academic_year TEXT,
            capacity INTEGER,
            description TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS incomes(
            id TEXT PRIMARY KEY,
            amount INTEGER NOT NULL,
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses(
            id TEXT PRIMARY KEY,
            amount INTEGER NOT NULL,
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_incomes_date ON incomes(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_schedules(
            id TEXT PRIMARY KEY,
            student_name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            type TEXT NOT NULL,
            amount INTEGER NOT NULL,
            due_date TEXT NOT NULL,
            status TEXT NOT NULL,
            description TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_schedules_due ON payment_schedules(due_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_schedules_student ON payment_schedules(student_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_proofs(
            id TEXT PRIMARY KEY,
            student TEXT NOT NULL,
            payment_type TEXT NOT NULL,
            amount INTEGER NOT NULL,
            payment_date TEXT NOT NULL,
            bank_account TEXT NOT NULL,
            reference_number TEXT NOT NULL,
            notes TEXT,
            file_id TEXT NOT NULL,
            uploaded_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_proofs_student ON payment_proofs(student)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contact_messages(
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            category TEXT NOT NULL,
            priority TEXT NOT NULL,
            message TEXT NOT NULL,
            student_name TEXT,
            status TEXT NOT NULL,
            reply TEXT,
            replied_at TEXT,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_contact_messages_author ON contact_messages(author_id)",
        [],
    )?;

    // Early workspaces predate ledger verification and contact replies.
    ensure_ledger_status(&conn, "incomes")?;
    ensure_ledger_status(&conn, "expenses")?;
    ensure_contact_reply_columns(&conn)?;

    Ok(conn)
}

fn ensure_ledger_status(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, "status")? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN status TEXT NOT NULL DEFAULT 'pending'", table),
        [],
    )?;
    Ok(())
}

fn ensure_contact_reply_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "contact_messages", "reply")? {
        conn.execute("ALTER TABLE contact_messages ADD COLUMN reply TEXT", [])?;
    }
    if !table_has_column(conn, "contact_messages", "replied_at")? {
        conn.execute("ALTER TABLE contact_messages ADD COLUMN replied_at TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

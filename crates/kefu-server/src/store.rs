//! SQLite-backed product/order store.
//!
//! Connections are opened per operation with foreign keys enforced, so
//! concurrent handlers never share a connection. Schema creation and seeding
//! are both idempotent and run once at startup.

use anyhow::Result;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

/// Full contents of one table, shaped for the admin JSON API.
#[derive(Debug)]
pub struct TableDump {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

/// One order header plus its joined line items.
#[derive(Debug)]
pub struct OrderDetail {
    pub order: Value,
    pub items: Vec<Value>,
}

impl Store {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(conn)
    }

    pub fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS customer (
                customer_id      INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_name    TEXT NOT NULL,
                customer_address TEXT NOT NULL,
                customer_phone   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS product (
                product_id    INTEGER PRIMARY KEY AUTOINCREMENT,
                product_name  TEXT NOT NULL,
                unit          TEXT NOT NULL,
                price         REAL NOT NULL,
                stock         INTEGER NOT NULL DEFAULT 0,
                safety_stock  INTEGER NOT NULL DEFAULT 0,
                supplier      TEXT,
                specification TEXT
            );

            CREATE TABLE IF NOT EXISTS wastage (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                product_name  TEXT NOT NULL,
                product_id    INTEGER NOT NULL,
                loss_quantity INTEGER NOT NULL,
                FOREIGN KEY (product_id) REFERENCES product(product_id)
            );

            CREATE TABLE IF NOT EXISTS orders (
                order_id        INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_name   TEXT NOT NULL,
                delivery_method TEXT NOT NULL,
                payment_method  TEXT NOT NULL,
                total_price     REAL NOT NULL DEFAULT 0,
                is_delivered    INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS customer_order_detail (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id  INTEGER NOT NULL,
                product_id   INTEGER NOT NULL,
                order_id     INTEGER NOT NULL,
                quantity     INTEGER NOT NULL,
                unit_price   REAL NOT NULL DEFAULT 0,
                FOREIGN KEY (customer_id) REFERENCES customer(customer_id),
                FOREIGN KEY (product_id)  REFERENCES product(product_id),
                FOREIGN KEY (order_id)    REFERENCES orders(order_id)
            );",
        )?;
        Ok(())
    }

    /// Insert sample customers and products, but only into an empty database.
    pub fn seed(&self) -> Result<()> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM customer", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let customers = [
            ("王大明", "台北市信義區信義路五段7號", "0912345678"),
            ("李小華", "台中市西屯區台灣大道四段1號", "0923456789"),
            ("張美玲", "高雄市前鎮區中山二路2號", "0934567890"),
        ];
        let mut insert = conn.prepare(
            "INSERT INTO customer (customer_name, customer_address, customer_phone)
             VALUES (?1, ?2, ?3)",
        )?;
        for (name, address, phone) in customers {
            insert.execute((name, address, phone))?;
        }

        let products = [
            ("蘋果", "箱", 500.0, 100, 20, "台灣水果商", "每箱20斤"),
            ("香蕉", "箱", 300.0, 80, 15, "台灣水果商", "每箱15斤"),
            ("牛奶", "瓶", 45.0, 200, 50, "鮮奶供應商", "1000ml"),
            ("雞蛋", "盒", 60.0, 150, 30, "養雞場", "每盒30顆"),
            ("白米", "包", 250.0, 60, 10, "米商", "每包5公斤"),
        ];
        let mut insert = conn.prepare(
            "INSERT INTO product
                (product_name, unit, price, stock, safety_stock, supplier, specification)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (name, unit, price, stock, safety, supplier, spec) in products {
            insert.execute((name, unit, price, stock, safety, supplier, spec))?;
        }

        Ok(())
    }

    /// Dump every row of `table`. The caller must whitelist the name; it is
    /// interpolated into the statement.
    pub fn dump_table(&self, table: &str) -> Result<TableDump> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM {table}"))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = Vec::new();
        let mut query = stmt.query([])?;
        while let Some(row) = query.next()? {
            rows.push(row_to_json(&columns, row)?);
        }

        Ok(TableDump { columns, rows })
    }

    /// Fetch one order and its line items, with per-line subtotals.
    pub fn order_detail(&self, order_id: i64) -> Result<Option<OrderDetail>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM orders WHERE order_id = ?1")?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut query = stmt.query([order_id])?;
        let order = match query.next()? {
            Some(row) => row_to_json(&columns, row)?,
            None => return Ok(None),
        };
        drop(query);
        drop(stmt);

        let mut stmt = conn.prepare(
            "SELECT d.quantity, d.unit_price, p.product_name, p.unit,
                    (d.quantity * d.unit_price) AS subtotal
             FROM customer_order_detail d
             JOIN product p ON d.product_id = p.product_id
             WHERE d.order_id = ?1",
        )?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut items = Vec::new();
        let mut query = stmt.query([order_id])?;
        while let Some(row) = query.next()? {
            items.push(row_to_json(&columns, row)?);
        }

        Ok(Some(OrderDetail { order, items }))
    }
}

fn row_to_json(columns: &[String], row: &Row) -> Result<Value> {
    let mut object = Map::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => Value::from(f),
            ValueRef::Text(text) => Value::from(String::from_utf8_lossy(text).into_owned()),
            ValueRef::Blob(_) => Value::Null,
        };
        object.insert(name.clone(), value);
    }
    Ok(Value::Object(object))
}

#[cfg(test)]
pub(crate) fn test_store(dir: &tempfile::TempDir) -> Store {
    let store = Store::new(dir.path().join("kefu-test.db"));
    store.init().unwrap();
    store.seed().unwrap();
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_and_seed_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("kefu-test.db"));
        store.init().unwrap();
        store.init().unwrap();
        store.seed().unwrap();
        store.seed().unwrap();

        let products = store.dump_table("product").unwrap();
        assert_eq!(products.rows.len(), 5);
        let customers = store.dump_table("customer").unwrap();
        assert_eq!(customers.rows.len(), 3);
    }

    #[test]
    fn dump_table_reports_columns_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);

        let dump = store.dump_table("product").unwrap();
        assert!(dump.columns.iter().any(|c| c == "product_name"));
        assert!(dump.columns.iter().any(|c| c == "safety_stock"));

        let apple = &dump.rows[0];
        assert_eq!(apple["product_name"], "蘋果");
        assert_eq!(apple["stock"], 100);
        assert_eq!(apple["price"], 500.0);
    }

    #[test]
    fn missing_order_detail_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        assert!(store.order_detail(999).unwrap().is_none());
    }
}

//! Agent tools over the store.
//!
//! Every tool returns user-facing Traditional Chinese text; validation
//! problems (unknown product, short stock) are messages for the model to
//! relay, not errors. Only database failures propagate as `Err`, and for the
//! tools that write, even those are folded into a localized failure line so
//! a broken write never aborts the whole agent turn.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

use crate::agent::ToolDefinition;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerArgs {
    pub customer_name: String,
    pub customer_address: String,
    pub customer_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderItem {
    pub product_name: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderDraftArgs {
    pub customer_name: String,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct FinalOrderArgs {
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub delivery_method: String,
    pub payment_method: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryProductsArgs {
    #[serde(default)]
    pub product_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckStockArgs {
    pub product_name: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryOrdersArgs {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub order_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordWastageArgs {
    pub product_name: String,
    pub loss_quantity: i64,
}

struct Product {
    id: i64,
    name: String,
    price: f64,
    stock: i64,
    unit: String,
}

fn find_product(conn: &Connection, name: &str) -> Result<Option<Product>> {
    let product = conn
        .query_row(
            "SELECT product_id, product_name, price, stock, unit
             FROM product WHERE product_name LIKE ?1",
            [format!("%{name}%")],
            |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    price: row.get(2)?,
                    stock: row.get(3)?,
                    unit: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(product)
}

fn find_customer_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT customer_id FROM customer WHERE customer_name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Create or update a customer record.
pub fn register_customer(store: &Store, args: &RegisterCustomerArgs) -> Result<String> {
    let conn = store.connect()?;

    if let Some(customer_id) = find_customer_id(&conn, &args.customer_name)? {
        conn.execute(
            "UPDATE customer SET customer_address = ?1, customer_phone = ?2
             WHERE customer_id = ?3",
            (&args.customer_address, &args.customer_phone, customer_id),
        )?;
        return Ok(format!(
            "客戶資料已更新！\n客戶ID: {}\n名稱: {}\n地址: {}\n電話: {}",
            customer_id, args.customer_name, args.customer_address, args.customer_phone
        ));
    }

    conn.execute(
        "INSERT INTO customer (customer_name, customer_address, customer_phone)
         VALUES (?1, ?2, ?3)",
        (&args.customer_name, &args.customer_address, &args.customer_phone),
    )?;
    Ok(format!(
        "客戶資料建立成功！\n客戶ID: {}\n名稱: {}\n地址: {}\n電話: {}",
        conn.last_insert_rowid(),
        args.customer_name,
        args.customer_address,
        args.customer_phone
    ))
}

/// Validate an order and compute its totals without writing anything.
pub fn create_order_draft(store: &Store, args: &OrderDraftArgs) -> Result<String> {
    let conn = store.connect()?;

    if find_customer_id(&conn, &args.customer_name)?.is_none() {
        return Ok(format!(
            "找不到客戶「{}」，請先使用 register_customer 建立客戶資料。",
            args.customer_name
        ));
    }

    let mut total = 0.0;
    let mut draft_lines = Vec::new();
    for item in &args.items {
        let product = match find_product(&conn, &item.product_name)? {
            Some(product) => product,
            None => {
                return Ok(format!(
                    "找不到產品「{}」。請使用 query_products 查看可訂購的產品。",
                    item.product_name
                ))
            }
        };
        if product.stock < item.quantity {
            return Ok(format!(
                "產品「{}」庫存不足（庫存: {}，需要: {}）。",
                product.name, product.stock, item.quantity
            ));
        }
        let subtotal = product.price * item.quantity as f64;
        total += subtotal;
        draft_lines.push(format!(
            "- {} x {}{}（單價: {}元，小計: {}元）",
            product.name, item.quantity, product.unit, product.price, subtotal as i64
        ));
    }

    Ok(format!(
        "客戶: {}\n{}\n總價格: {} 元\n---\n\
         你必須將以上所有品項、數量、單價、小計、總價格原封不動顯示給客戶，\
         然後問「訂單內容是否正確？需要修改請告訴我」。禁止省略任何品項。",
        args.customer_name,
        draft_lines.join("\n"),
        total as i64
    ))
}

/// Produce the final pre-confirmation summary, delivery and payment included.
pub fn preview_final_order(store: &Store, args: &FinalOrderArgs) -> Result<String> {
    let conn = store.connect()?;

    if find_customer_id(&conn, &args.customer_name)?.is_none() {
        return Ok(format!("找不到客戶「{}」，請先建立客戶資料。", args.customer_name));
    }

    let mut total = 0.0;
    let mut draft_lines = Vec::new();
    for item in &args.items {
        let product = match find_product(&conn, &item.product_name)? {
            Some(product) => product,
            None => return Ok(format!("找不到產品「{}」。", item.product_name)),
        };
        if product.stock < item.quantity {
            return Ok(format!(
                "產品「{}」庫存不足（庫存: {}，需要: {}）。",
                product.name, product.stock, item.quantity
            ));
        }
        let subtotal = product.price * item.quantity as f64;
        total += subtotal;
        draft_lines.push(format!(
            "- {} x {}{}（小計: {}元）",
            product.name, item.quantity, product.unit, subtotal as i64
        ));
    }

    Ok(format!(
        "客戶: {}\n{}\n總價格: {} 元\n配送方式: {}\n收款方式: {}\n---\n\
         你必須將以上完整內容顯示給客戶，然後問「以上訂單是否正確？確認請回覆「確認」，\
         需要修改請告訴我」。禁止省略。禁止呼叫 confirm_order。",
        args.customer_name,
        draft_lines.join("\n"),
        total as i64,
        args.delivery_method,
        args.payment_method
    ))
}

/// Write the confirmed order: header, line items, and stock decrements, in
/// one transaction.
pub fn confirm_order(store: &Store, args: &FinalOrderArgs) -> Result<String> {
    let mut conn = store.connect()?;

    let customer_id = match find_customer_id(&conn, &args.customer_name)? {
        Some(id) => id,
        None => return Ok(format!("找不到客戶「{}」。", args.customer_name)),
    };

    let mut total = 0.0;
    let mut validated_items = Vec::new();
    for item in &args.items {
        let product = match find_product(&conn, &item.product_name)? {
            Some(product) => product,
            None => return Ok(format!("找不到產品「{}」。", item.product_name)),
        };
        if product.stock < item.quantity {
            return Ok(format!(
                "產品「{}」庫存不足（庫存: {}，需要: {}）。",
                product.name, product.stock, item.quantity
            ));
        }
        total += product.price * item.quantity as f64;
        validated_items.push((product, item.quantity));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO orders (customer_name, delivery_method, payment_method, total_price)
         VALUES (?1, ?2, ?3, ?4)",
        (&args.customer_name, &args.delivery_method, &args.payment_method, total),
    )?;
    let order_id = tx.last_insert_rowid();

    for (product, quantity) in &validated_items {
        tx.execute(
            "INSERT INTO customer_order_detail
                (customer_id, product_id, order_id, quantity, unit_price)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (customer_id, product.id, order_id, quantity, product.price),
        )?;
        tx.execute(
            "UPDATE product SET stock = stock - ?1 WHERE product_id = ?2",
            (quantity, product.id),
        )?;
    }
    tx.commit()?;

    Ok(format!(
        "✅ 訂單建立成功！\n訂單編號: {}\n客戶: {}\n總價格: {} 元\n配送方式: {}\n收款方式: {}",
        order_id, args.customer_name, total as i64, args.delivery_method, args.payment_method
    ))
}

/// List products, optionally filtered by a name fragment.
pub fn query_products(store: &Store, args: &QueryProductsArgs) -> Result<String> {
    let conn = store.connect()?;

    let (sql, params) = if args.product_name.is_empty() {
        ("SELECT * FROM product".to_string(), Vec::new())
    } else {
        (
            "SELECT * FROM product WHERE product_name LIKE ?1".to_string(),
            vec![format!("%{}%", args.product_name)],
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<String> = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let supplier: Option<String> = row.get("supplier")?;
            let specification: Option<String> = row.get("specification")?;
            let unit: String = row.get("unit")?;
            Ok(format!(
                "產品ID: {}, 名稱: {}, 價格: {}元/{}, 庫存: {}{}, 供應商: {}, 規格: {}",
                row.get::<_, i64>("product_id")?,
                row.get::<_, String>("product_name")?,
                row.get::<_, f64>("price")?,
                unit,
                row.get::<_, i64>("stock")?,
                unit,
                supplier.unwrap_or_default(),
                specification.unwrap_or_default(),
            ))
        })?
        .collect::<std::result::Result<_, _>>()?;

    if rows.is_empty() {
        return Ok("找不到符合的產品。".to_string());
    }
    Ok(rows.join("\n"))
}

/// Report stock for one product, warning when it falls to the safety level.
pub fn check_stock(store: &Store, args: &CheckStockArgs) -> Result<String> {
    let conn = store.connect()?;

    let row = conn
        .query_row(
            "SELECT product_name, stock, safety_stock, unit
             FROM product WHERE product_name LIKE ?1",
            [format!("%{}%", args.product_name)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let (name, stock, safety_stock, unit) = match row {
        Some(row) => row,
        None => return Ok(format!("找不到產品「{}」。", args.product_name)),
    };

    let status = if stock <= safety_stock {
        "⚠️ 低於安全庫存，需要補貨！"
    } else {
        "正常"
    };

    Ok(format!(
        "產品: {}\n目前庫存: {}{}\n安全庫存: {}{}\n庫存狀態: {}",
        name, stock, unit, safety_stock, unit, status
    ))
}

/// Look up orders by id (with line items) or by customer name.
pub fn query_orders(store: &Store, args: &QueryOrdersArgs) -> Result<String> {
    let conn = store.connect()?;

    if args.order_id != 0 {
        let order = conn
            .query_row(
                "SELECT order_id, customer_name, delivery_method, payment_method, total_price
                 FROM orders WHERE order_id = ?1",
                [args.order_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                },
            )
            .optional()?;

        let (order_id, customer, delivery, payment, total) = match order {
            Some(order) => order,
            None => return Ok(format!("找不到訂單編號 {}。", args.order_id)),
        };

        let mut stmt = conn.prepare(
            "SELECT d.quantity, d.unit_price, p.product_name, p.unit
             FROM customer_order_detail d
             JOIN product p ON d.product_id = p.product_id
             WHERE d.order_id = ?1",
        )?;
        let items: Vec<String> = stmt
            .query_map([order_id], |row| {
                Ok(format!(
                    "  - {} x {}{} (單價: {}元)",
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(1)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        return Ok(format!(
            "訂單編號: {}\n客戶: {}\n配送方式: {}\n收款方式: {}\n總價格: {} 元\n訂單明細:\n{}",
            order_id,
            customer,
            delivery,
            payment,
            total,
            items.join("\n")
        ));
    }

    if !args.customer_name.is_empty() {
        let mut stmt = conn.prepare(
            "SELECT order_id, total_price, delivery_method, payment_method
             FROM orders WHERE customer_name LIKE ?1",
        )?;
        let orders: Vec<String> = stmt
            .query_map([format!("%{}%", args.customer_name)], |row| {
                Ok(format!(
                    "訂單編號: {}, 總價格: {}元, 配送: {}, 收款: {}",
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        if orders.is_empty() {
            return Ok(format!("找不到客戶「{}」的訂單。", args.customer_name));
        }
        return Ok(orders.join("\n"));
    }

    Ok("請提供客戶名稱或訂單編號來查詢。".to_string())
}

/// Record product loss and deduct it from stock.
pub fn record_wastage(store: &Store, args: &RecordWastageArgs) -> Result<String> {
    let mut conn = store.connect()?;

    let product = match find_product(&conn, &args.product_name)? {
        Some(product) => product,
        None => return Ok(format!("找不到產品「{}」。", args.product_name)),
    };

    if product.stock < args.loss_quantity {
        return Ok(format!(
            "損耗數量 ({}) 超過目前庫存 ({})，請確認數量。",
            args.loss_quantity, product.stock
        ));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO wastage (product_name, product_id, loss_quantity) VALUES (?1, ?2, ?3)",
        (&product.name, product.id, args.loss_quantity),
    )?;
    tx.execute(
        "UPDATE product SET stock = stock - ?1 WHERE product_id = ?2",
        (args.loss_quantity, product.id),
    )?;
    tx.commit()?;

    Ok(format!(
        "損耗記錄成功！\n產品: {}\n損耗數量: {}\n剩餘庫存: {}",
        product.name,
        args.loss_quantity,
        product.stock - args.loss_quantity
    ))
}

/// Tool definitions advertised to the model, OpenAI function-calling schema.
pub fn definitions() -> Vec<ToolDefinition> {
    let item_schema = json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "product_name": { "type": "string" },
                "quantity": { "type": "integer" }
            },
            "required": ["product_name", "quantity"]
        }
    });

    vec![
        ToolDefinition::function(
            "register_customer",
            "【下單步驟一】建立或更新客戶基本資料，存入資料庫。需要提供：客戶名稱、地址、電話。\
             Register or update customer info and save to database.",
            json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string" },
                    "customer_address": { "type": "string" },
                    "customer_phone": { "type": "string" }
                },
                "required": ["customer_name", "customer_address", "customer_phone"]
            }),
        ),
        ToolDefinition::function(
            "create_order_draft",
            "【下單步驟二】建立訂單草稿，驗證產品和庫存，計算金額，回傳明細讓客戶確認或修改。\
             items 是列表，每個元素包含 product_name(str) 和 quantity(int)。\
             此工具只做驗證和計算，不會寫入資料庫。客戶可以要求修改後再次呼叫此工具。\
             Create order draft. Only validates, does NOT save to DB.",
            json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string" },
                    "items": item_schema
                },
                "required": ["customer_name", "items"]
            }),
        ),
        ToolDefinition::function(
            "preview_final_order",
            "【步驟 3b】客戶告知配送和收款方式後，呼叫此工具產生含配送收款的完整訂單摘要。\
             不會寫入資料庫，只是讓客戶做最終確認。客戶確認後才呼叫 confirm_order。\
             delivery_method: 專車/郵寄。payment_method: 現金/匯款/貨到付款。",
            json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string" },
                    "items": item_schema,
                    "delivery_method": { "type": "string" },
                    "payment_method": { "type": "string" }
                },
                "required": ["customer_name", "items", "delivery_method", "payment_method"]
            }),
        ),
        ToolDefinition::function(
            "confirm_order",
            "【步驟 3c】客戶已確認最終訂單後，呼叫此工具正式寫入資料庫。\
             必須在 preview_final_order 之後、客戶說「確認」之後才能呼叫。\
             delivery_method: 專車/郵寄。payment_method: 現金/匯款/貨到付款。",
            json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string" },
                    "items": item_schema,
                    "delivery_method": { "type": "string" },
                    "payment_method": { "type": "string" }
                },
                "required": ["customer_name", "items", "delivery_method", "payment_method"]
            }),
        ),
        ToolDefinition::function(
            "query_products",
            "查詢產品資訊。可以用產品名稱搜尋，或不輸入名稱列出所有產品。\
             Query product information by name, or list all products if no name given.",
            json!({
                "type": "object",
                "properties": {
                    "product_name": { "type": "string" }
                }
            }),
        ),
        ToolDefinition::function(
            "check_stock",
            "檢查特定產品的庫存狀況，如果低於安全庫存會發出警告。\
             Check stock level for a product and warn if below safety stock.",
            json!({
                "type": "object",
                "properties": {
                    "product_name": { "type": "string" }
                },
                "required": ["product_name"]
            }),
        ),
        ToolDefinition::function(
            "query_orders",
            "查詢訂單。可以用客戶名稱或訂單編號查詢。\
             Query orders by customer name or order ID.",
            json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string" },
                    "order_id": { "type": "integer" }
                }
            }),
        ),
        ToolDefinition::function(
            "record_wastage",
            "記錄產品損耗。會自動扣除庫存。\
             Record product wastage/loss. Stock will be automatically deducted.",
            json!({
                "type": "object",
                "properties": {
                    "product_name": { "type": "string" },
                    "loss_quantity": { "type": "integer" }
                },
                "required": ["product_name", "loss_quantity"]
            }),
        ),
    ]
}

/// Execute one tool call by name with its raw JSON argument string.
///
/// Argument and write failures become text for the model so it can correct
/// itself; read-path database errors propagate and fail the whole turn.
pub fn dispatch(store: &Store, name: &str, arguments: &str) -> Result<String> {
    fn parse<T: serde::de::DeserializeOwned>(arguments: &str) -> std::result::Result<T, String> {
        serde_json::from_str(arguments).map_err(|e| format!("工具參數解析失敗: {e}"))
    }

    let reply = match name {
        "register_customer" => match parse::<RegisterCustomerArgs>(arguments) {
            Ok(args) => register_customer(store, &args)
                .unwrap_or_else(|e| format!("建立客戶資料時發生錯誤: {e}")),
            Err(problem) => problem,
        },
        "create_order_draft" => match parse::<OrderDraftArgs>(arguments) {
            Ok(args) => create_order_draft(store, &args)
                .unwrap_or_else(|e| format!("建立訂單草稿時發生錯誤: {e}")),
            Err(problem) => problem,
        },
        "preview_final_order" => match parse::<FinalOrderArgs>(arguments) {
            Ok(args) => preview_final_order(store, &args)
                .unwrap_or_else(|e| format!("預覽訂單時發生錯誤: {e}")),
            Err(problem) => problem,
        },
        "confirm_order" => match parse::<FinalOrderArgs>(arguments) {
            Ok(args) => {
                confirm_order(store, &args).unwrap_or_else(|e| format!("建立訂單時發生錯誤: {e}"))
            }
            Err(problem) => problem,
        },
        "record_wastage" => match parse::<RecordWastageArgs>(arguments) {
            Ok(args) => {
                record_wastage(store, &args).unwrap_or_else(|e| format!("記錄損耗時發生錯誤: {e}"))
            }
            Err(problem) => problem,
        },
        "query_products" => match parse::<QueryProductsArgs>(arguments) {
            Ok(args) => query_products(store, &args)?,
            Err(problem) => problem,
        },
        "check_stock" => match parse::<CheckStockArgs>(arguments) {
            Ok(args) => check_stock(store, &args)?,
            Err(problem) => problem,
        },
        "query_orders" => match parse::<QueryOrdersArgs>(arguments) {
            Ok(args) => query_orders(store, &args)?,
            Err(problem) => problem,
        },
        other => format!("未知的工具: {other}"),
    };

    Ok(reply)
}

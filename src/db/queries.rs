use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Account, Cart, Category, ConversationContext, ConversationState, Faq, Page, Pagination,
    Product, Purchase, Sender, User, UserData,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Users ──

const USER_COLUMNS: &str = "id, telegram_user_id, chat_id, username, first_name, last_name, phone, \
     car_number, car_serial_number, car_number_region";

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        telegram_user_id: row.get(1)?,
        chat_id: row.get(2)?,
        username: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        phone: row.get(6)?,
        car_number: row.get(7)?,
        car_serial_number: row.get(8)?,
        car_number_region: row.get(9)?,
    })
}

pub fn get_user_by_telegram_id(
    conn: &Connection,
    telegram_user_id: &str,
) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_user_id = ?1"),
            params![telegram_user_id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

/// Look the sender up by external id, creating the record on first contact
/// and refreshing the names and chat id otherwise.
pub fn get_or_create_user(conn: &Connection, sender: &Sender) -> anyhow::Result<User> {
    conn.execute(
        "INSERT INTO users (id, telegram_user_id, chat_id, username, first_name, last_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(telegram_user_id) DO UPDATE SET
           chat_id = excluded.chat_id,
           username = excluded.username,
           first_name = excluded.first_name,
           last_name = excluded.last_name",
        params![
            new_id(),
            sender.telegram_user_id,
            sender.chat_id,
            sender.username,
            sender.first_name,
            sender.last_name,
        ],
    )?;

    get_user_by_telegram_id(conn, &sender.telegram_user_id)?
        .ok_or_else(|| anyhow::anyhow!("user {} vanished after upsert", sender.telegram_user_id))
}

pub enum ProfileUpdate<'a> {
    CarNumber(&'a str),
    CarSerialNumber(&'a str),
    CarRegion(i64),
    Phone {
        phone: &'a str,
        first_name: &'a str,
        last_name: Option<&'a str>,
    },
}

pub fn update_user_profile(
    conn: &Connection,
    telegram_user_id: &str,
    update: ProfileUpdate,
) -> anyhow::Result<Option<User>> {
    match update {
        ProfileUpdate::CarNumber(value) => conn.execute(
            "UPDATE users SET car_number = ?1 WHERE telegram_user_id = ?2",
            params![value, telegram_user_id],
        )?,
        ProfileUpdate::CarSerialNumber(value) => conn.execute(
            "UPDATE users SET car_serial_number = ?1 WHERE telegram_user_id = ?2",
            params![value, telegram_user_id],
        )?,
        ProfileUpdate::CarRegion(value) => conn.execute(
            "UPDATE users SET car_number_region = ?1 WHERE telegram_user_id = ?2",
            params![value, telegram_user_id],
        )?,
        ProfileUpdate::Phone {
            phone,
            first_name,
            last_name,
        } => conn.execute(
            "UPDATE users SET phone = ?1,
               first_name = CASE WHEN ?2 = '' THEN first_name ELSE ?2 END,
               last_name = COALESCE(?3, last_name)
             WHERE telegram_user_id = ?4",
            params![phone, first_name, last_name, telegram_user_id],
        )?,
    };

    get_user_by_telegram_id(conn, telegram_user_id)
}

// ── Categories ──

pub fn insert_category(conn: &Connection, name: &str) -> anyhow::Result<Category> {
    let category = Category {
        id: new_id(),
        name: name.to_string(),
        is_active: true,
    };
    conn.execute(
        "INSERT INTO categories (id, name, is_active) VALUES (?1, ?2, ?3)",
        params![category.id, category.name, category.is_active],
    )?;
    Ok(category)
}

pub fn get_category(conn: &Connection, id: &str) -> anyhow::Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, is_active FROM categories WHERE id = ?1 AND is_active = 1",
            params![id],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    is_active: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(category)
}

/// One page of active categories ordered by name. Out-of-range pages clamp.
pub fn list_categories(
    conn: &Connection,
    page: u32,
    page_size: u32,
) -> anyhow::Result<Page<Category>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM categories WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?;
    let window = Pagination::new(u64::try_from(total).unwrap_or(0), page, page_size);

    let mut stmt = conn.prepare(
        "SELECT id, name, is_active FROM categories WHERE is_active = 1
         ORDER BY name ASC, id ASC LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt.query_map(
        params![i64::from(window.page_size), window.offset() as i64],
        |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                is_active: row.get(2)?,
            })
        },
    )?;

    let mut items = vec![];
    for row in rows {
        items.push(row?);
    }

    Ok(Page {
        items,
        number: window.page,
        has_previous: window.has_previous(),
        has_next: window.has_next(),
    })
}

// ── Products ──

const PRODUCT_COLUMNS: &str = "id, category_id, name, description, price, image_url, is_active, \
     is_free, is_took_place, lessor_id, expiration_date";

fn parse_product_row(row: &rusqlite::Row) -> rusqlite::Result<Product> {
    let expiration: Option<String> = row.get(10)?;
    Ok(Product {
        id: row.get(0)?,
        category_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        price: row.get(4)?,
        image_url: row.get(5)?,
        is_active: row.get(6)?,
        is_free: row.get(7)?,
        is_took_place: row.get(8)?,
        lessor_id: row.get(9)?,
        expiration_date: expiration.as_deref().map(parse_ts),
    })
}

pub fn insert_product(
    conn: &Connection,
    category_id: &str,
    name: &str,
    description: &str,
    price: i64,
    image_url: Option<&str>,
) -> anyhow::Result<Product> {
    let id = new_id();
    conn.execute(
        "INSERT INTO products (id, category_id, name, description, price, image_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, category_id, name, description, price, image_url],
    )?;
    get_product(conn, &id)?.ok_or_else(|| anyhow::anyhow!("product {id} vanished after insert"))
}

pub fn get_product(conn: &Connection, id: &str) -> anyhow::Result<Option<Product>> {
    let product = conn
        .query_row(
            &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
            params![id],
            parse_product_row,
        )
        .optional()?;
    Ok(product)
}

pub fn list_free_products(conn: &Connection, category_id: &str) -> anyhow::Result<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE category_id = ?1 AND is_active = 1 AND is_free = 1 ORDER BY name ASC"
    ))?;
    let rows = stmt.query_map(params![category_id], parse_product_row)?;

    let mut products = vec![];
    for row in rows {
        products.push(row?);
    }
    Ok(products)
}

pub fn list_user_products(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE lessor_id = ?1 AND is_free = 0 ORDER BY expiration_date ASC"
    ))?;
    let rows = stmt.query_map(params![user_id], parse_product_row)?;

    let mut products = vec![];
    for row in rows {
        products.push(row?);
    }
    Ok(products)
}

/// Hold a free product for `user_id` until `expiry`. Returns false when the
/// product is no longer free, so callers can treat the write as a
/// compare-and-swap.
pub fn reserve_product(
    conn: &Connection,
    product_id: &str,
    user_id: &str,
    expiry: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE products SET is_free = 0, is_took_place = 0, lessor_id = ?1, expiration_date = ?2
         WHERE id = ?3 AND is_free = 1 AND is_active = 1",
        params![user_id, format_ts(expiry), product_id],
    )?;
    Ok(count > 0)
}

/// Mark a product the user still holds as occupied until `expiry`. Returns
/// false when the hold has lapsed by `now` or the place is already occupied.
pub fn occupy_product(
    conn: &Connection,
    product_id: &str,
    user_id: &str,
    now: &NaiveDateTime,
    expiry: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE products SET is_took_place = 1, expiration_date = ?1
         WHERE id = ?2 AND lessor_id = ?3 AND is_free = 0 AND is_took_place = 0
           AND expiration_date >= ?4",
        params![format_ts(expiry), product_id, user_id, format_ts(now)],
    )?;
    Ok(count > 0)
}

/// Free every held product whose expiry lies before `now`.
pub fn release_expired_products(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE products SET is_free = 1, is_took_place = 0, lessor_id = NULL, expiration_date = NULL
         WHERE is_free = 0 AND lessor_id IS NOT NULL
           AND expiration_date IS NOT NULL AND expiration_date < ?1",
        params![format_ts(now)],
    )?;
    Ok(count)
}

// ── Purchases ──

fn parse_purchase_row(row: &rusqlite::Row) -> rusqlite::Result<Purchase> {
    let created_at: String = row.get(7)?;
    Ok(Purchase {
        id: row.get(0)?,
        user_id: row.get(1)?,
        product_id: row.get(2)?,
        product_name: row.get(3)?,
        quantity: row.get(4)?,
        amount: row.get(5)?,
        is_completed: row.get(6)?,
        created_at: parse_ts(&created_at),
    })
}

pub fn create_purchases(conn: &Connection, purchases: &[Purchase]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO purchases (id, user_id, product_id, product_name, quantity, amount, is_completed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for purchase in purchases {
        stmt.execute(params![
            purchase.id,
            purchase.user_id,
            purchase.product_id,
            purchase.product_name,
            purchase.quantity,
            purchase.amount,
            purchase.is_completed,
            format_ts(&purchase.created_at),
        ])?;
    }
    Ok(())
}

pub fn get_purchase(conn: &Connection, id: &str) -> anyhow::Result<Option<Purchase>> {
    let purchase = conn
        .query_row(
            "SELECT id, user_id, product_id, product_name, quantity, amount, is_completed, created_at
             FROM purchases WHERE id = ?1",
            params![id],
            parse_purchase_row,
        )
        .optional()?;
    Ok(purchase)
}

/// Flip the completion flag. Returns false when it was already set.
pub fn complete_purchase(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE purchases SET is_completed = 1 WHERE id = ?1 AND is_completed = 0",
        params![id],
    )?;
    Ok(count > 0)
}

// ── FAQ ──

pub fn insert_faq(conn: &Connection, question: &str, answer: &str) -> anyhow::Result<Faq> {
    let faq = Faq {
        id: new_id(),
        question: question.to_string(),
        answer: answer.to_string(),
    };
    conn.execute(
        "INSERT INTO faqs (id, question, answer) VALUES (?1, ?2, ?3)",
        params![faq.id, faq.question, faq.answer],
    )?;
    Ok(faq)
}

pub fn list_faqs(conn: &Connection) -> anyhow::Result<Vec<Faq>> {
    let mut stmt =
        conn.prepare("SELECT id, question, answer FROM faqs ORDER BY created_at ASC, rowid ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Faq {
            id: row.get(0)?,
            question: row.get(1)?,
            answer: row.get(2)?,
        })
    })?;

    let mut faqs = vec![];
    for row in rows {
        faqs.push(row?);
    }
    Ok(faqs)
}

// ── Conversations ──

pub fn get_conversation(
    conn: &Connection,
    external_user_id: &str,
) -> anyhow::Result<Option<ConversationContext>> {
    let row = conn
        .query_row(
            "SELECT external_user_id, chat_id, state, user_data, cart, updated_at
             FROM conversations WHERE external_user_id = ?1",
            params![external_user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((external_user_id, chat_id, state, user_data, cart, updated_at)) = row else {
        return Ok(None);
    };

    // Unreadable scratch data resets to empty.
    let user_data: UserData = serde_json::from_str(&user_data).unwrap_or_else(|e| {
        tracing::warn!(user = %external_user_id, error = %e, "discarding unreadable user data");
        UserData::default()
    });
    let cart: Cart = serde_json::from_str(&cart).unwrap_or_else(|e| {
        tracing::warn!(user = %external_user_id, error = %e, "discarding unreadable cart");
        Cart::default()
    });

    Ok(Some(ConversationContext {
        external_user_id,
        chat_id,
        state: ConversationState::parse(&state),
        user_data,
        cart,
        updated_at: parse_ts(&updated_at),
    }))
}

pub fn save_conversation(conn: &Connection, ctx: &ConversationContext) -> anyhow::Result<()> {
    let user_data = serde_json::to_string(&ctx.user_data)?;
    let cart = serde_json::to_string(&ctx.cart)?;

    conn.execute(
        "INSERT INTO conversations (external_user_id, chat_id, state, user_data, cart, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(external_user_id) DO UPDATE SET
           chat_id = excluded.chat_id,
           state = excluded.state,
           user_data = excluded.user_data,
           cart = excluded.cart,
           updated_at = excluded.updated_at",
        params![
            ctx.external_user_id,
            ctx.chat_id,
            ctx.state.as_str(),
            user_data,
            cart,
            format_ts(&ctx.updated_at),
        ],
    )?;
    Ok(())
}

// ── Accounts ──

pub fn get_or_create_account(conn: &Connection, username: &str) -> anyhow::Result<Account> {
    conn.execute(
        "INSERT INTO accounts (id, username) VALUES (?1, ?2) ON CONFLICT(username) DO NOTHING",
        params![new_id(), username],
    )?;
    let account = conn.query_row(
        "SELECT id, username, link_token, chat_id FROM accounts WHERE username = ?1",
        params![username],
        |row| {
            Ok(Account {
                id: row.get(0)?,
                username: row.get(1)?,
                link_token: row.get(2)?,
                chat_id: row.get(3)?,
            })
        },
    )?;
    Ok(account)
}

pub fn set_link_token(conn: &Connection, account_id: &str, token: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE accounts SET link_token = ?1 WHERE id = ?2",
        params![token, account_id],
    )?;
    Ok(count > 0)
}

/// Bind `chat_id` to the account owning `token` and consume the token.
pub fn link_chat_by_token(
    conn: &Connection,
    token: &str,
    chat_id: &str,
) -> anyhow::Result<Option<Account>> {
    let account = conn
        .query_row(
            "UPDATE accounts SET chat_id = ?1, link_token = NULL WHERE link_token = ?2
             RETURNING id, username, link_token, chat_id",
            params![chat_id, token],
            |row| {
                Ok(Account {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    link_token: row.get(2)?,
                    chat_id: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(account)
}

// ── Dashboard ──

pub struct DashboardStats {
    pub free_places: i64,
    pub held_places: i64,
    pub open_purchases: i64,
    pub conversations: i64,
}

pub fn get_dashboard_stats(conn: &Connection) -> anyhow::Result<DashboardStats> {
    let count = |sql: &str| -> anyhow::Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

    Ok(DashboardStats {
        free_places: count("SELECT COUNT(*) FROM products WHERE is_active = 1 AND is_free = 1")?,
        held_places: count("SELECT COUNT(*) FROM products WHERE is_free = 0")?,
        open_purchases: count("SELECT COUNT(*) FROM purchases WHERE is_completed = 0")?,
        conversations: count("SELECT COUNT(*) FROM conversations")?,
    })
}

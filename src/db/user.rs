use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization. Closed set; routes list the roles they admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Manager,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Manager => "manager",
            UserRole::Admin => "admin",
        }
    }

    /// Unknown values fall back to the least privileged role.
    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            "manager" => UserRole::Manager,
            _ => UserRole::Customer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub tenant_id: Option<i64>,
    pub created_at: String,
}

/// A user as shown to callers. Carries no password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub tenant_id: Option<i64>,
    pub created_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            tenant_id: user.tenant_id,
            created_at: user.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    role: String,
    tenant_id: Option<i64>,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.password_hash,
            role: UserRole::from_str(&row.role),
            tenant_id: row.tenant_id,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, role, tenant_id, created_at";

/// Fields for a new user. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub tenant_id: Option<i64>,
}

/// Fields an admin may change on an existing user.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub tenant_id: Option<i64>,
}

/// Listing filter. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub q: String,
    pub role: Option<UserRole>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for UserFilter {
    fn default() -> Self {
        Self {
            q: String::new(),
            role: None,
            page: 1,
            per_page: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub current_page: u32,
    pub per_page: u32,
    pub total: i64,
    pub data: Vec<UserProfile>,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    pub async fn create(&self, user: &NewUser) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (first_name, last_name, email, password_hash, role, tenant_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    pub async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// List users matching `filter`, newest first.
    ///
    /// `q` matches a substring of first name, last name or email.
    pub async fn list(&self, filter: &UserFilter) -> Result<UserPage, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(filter.q.trim()));
        let role = filter.role.map(|r| r.as_str());
        let per_page = filter.per_page.max(1);
        let page = filter.page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);

        const WHERE: &str = "WHERE (first_name LIKE ?1 ESCAPE '\\' OR last_name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\')
               AND (?2 IS NULL OR role = ?2)";

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM users {WHERE}"))
            .bind(&pattern)
            .bind(role)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users {WHERE} ORDER BY id DESC LIMIT ?3 OFFSET ?4"
        ))
        .bind(&pattern)
        .bind(role)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(UserPage {
            current_page: page,
            per_page,
            total: total.0,
            data: rows.into_iter().map(User::from).map(UserProfile::from).collect(),
        })
    }

    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET first_name = ?, last_name = ?, role = ?, tenant_id = ?,
             updated_at = datetime('now') WHERE id = ?",
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(update.role.as_str())
        .bind(update.tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID. Their refresh records go with them.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

//! SQLite-backed relationship store.
//!
//! ## Error Mapping
//!
//! | SQLx error | DomainError |
//! |------------|-------------|
//! | Database (unique violation) | `ConstraintViolation` |
//! | Database (foreign key violation) | `NotFound` |
//! | Database (other) | `StoreUnavailable` |
//! | PoolTimedOut / PoolClosed / Io | `StoreUnavailable` |
//! | ColumnDecode / Decode | `StoreUnavailable` |
//!
//! Multi-statement writes (inserts carrying association sets, replaces,
//! deletes) run inside one transaction. A transaction dropped on an error
//! path rolls back.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

use keystone_auth::{
    Association, EntityKind, Group, GroupField, Permission, PermissionField, Relation, User,
    UserField, dedup_ids,
};
use keystone_core::query::escape_like;
use keystone_core::{
    DomainError, DomainResult, Field, GroupId, Operator, Page, PermissionId, QuerySpec, UserId,
    Value,
};

use super::{
    PermissionKey, RelationshipStore, StoreOptions, UserKey, bounded, group_links,
    permission_links, user_links,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS auth_user (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        username      TEXT    NOT NULL UNIQUE,
        password_hash TEXT    NOT NULL,
        display_name  TEXT    NOT NULL DEFAULT '',
        phone         TEXT    NOT NULL DEFAULT '',
        active        BOOLEAN NOT NULL DEFAULT 1,
        superuser     BOOLEAN NOT NULL DEFAULT 0,
        created_at    TEXT    NOT NULL,
        updated_at    TEXT    NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_group (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_permission (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_user_permission (
        user_id       INTEGER NOT NULL REFERENCES auth_user(id),
        permission_id INTEGER NOT NULL REFERENCES auth_permission(id),
        PRIMARY KEY (user_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_user_group (
        user_id  INTEGER NOT NULL REFERENCES auth_user(id),
        group_id INTEGER NOT NULL REFERENCES auth_group(id),
        PRIMARY KEY (user_id, group_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_group_permission (
        group_id      INTEGER NOT NULL REFERENCES auth_group(id),
        permission_id INTEGER NOT NULL REFERENCES auth_permission(id),
        PRIMARY KEY (group_id, permission_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS auth_user_group_by_group ON auth_user_group (group_id)",
    "CREATE INDEX IF NOT EXISTS auth_user_permission_by_permission ON auth_user_permission (permission_id)",
    "CREATE INDEX IF NOT EXISTS auth_group_permission_by_permission ON auth_group_permission (permission_id)",
];

const USER_COLUMNS: &str =
    "id, username, password_hash, display_name, phone, active, superuser, created_at, updated_at";
const GROUP_COLUMNS: &str = "id, name, description";
const PERMISSION_COLUMNS: &str = "id, name, description";

#[derive(Debug, Clone)]
pub struct SqliteRelationshipStore {
    pool: SqlitePool,
    options: StoreOptions,
}

impl SqliteRelationshipStore {
    /// Open a pool for `url` (e.g. `sqlite://keystone.db` or `sqlite::memory:`).
    ///
    /// In-memory databases live per connection, so they are pinned to a single
    /// connection that is never recycled.
    pub async fn connect(url: &str, options: StoreOptions) -> DomainResult<Self> {
        let connect = SqliteConnectOptions::from_str(url)
            .map_err(|e| DomainError::malformed(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool = SqlitePoolOptions::new().acquire_timeout(options.timeout);
        pool = if in_memory {
            pool.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            pool.max_connections(options.max_connections.max(1))
        };

        let pool = pool
            .connect_with(connect)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool, options })
    }

    /// Fresh private in-memory database with the schema applied.
    pub async fn in_memory() -> DomainResult<Self> {
        let store = Self::connect("sqlite::memory:", StoreOptions::default()).await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes if they are missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> DomainResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    /// Shared pool, e.g. for a session store living in the same database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }

    /// Total join rows in one table.
    pub async fn count_links(&self, relation: Relation) -> DomainResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", relation.table());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_links", e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn begin(&self, operation: &str) -> DomainResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn commit(tx: Transaction<'static, Sqlite>, operation: &str) -> DomainResult<()> {
        tx.commit().await.map_err(|e| map_sqlx_error(operation, e))
    }

    async fn list<F, T>(&self, table: &str, columns: &str, query: &QuerySpec<F>) -> DomainResult<Page<T>>
    where
        F: Field,
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        query.validate()?;

        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table}"));
        push_where(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_count", e))?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {columns} FROM {table}"));
        push_where(&mut select, query);
        push_order(&mut select, query);
        if let Some(limit) = query.pagination.limit() {
            select.push(" LIMIT ");
            select.push_bind(i64::from(limit));
            select.push(" OFFSET ");
            select.push_bind(i64::try_from(query.pagination.offset()).unwrap_or(i64::MAX));
        }

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;
        let items = rows
            .iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_decode", e))?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers (usable inside or outside a transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn row_exists(conn: &mut SqliteConnection, kind: EntityKind, id: i64) -> DomainResult<bool> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", kind.table());
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("exists", e))?;
    Ok(count > 0)
}

async fn ensure_targets(
    conn: &mut SqliteConnection,
    association: Association,
    targets: &[i64],
) -> DomainResult<()> {
    let kind = association.target();
    for target in targets {
        if !row_exists(&mut *conn, kind, *target).await? {
            return Err(DomainError::not_found(format!("{kind} {target}")));
        }
    }
    Ok(())
}

async fn link(
    conn: &mut SqliteConnection,
    association: Association,
    owner: i64,
    targets: &[i64],
) -> DomainResult<()> {
    let relation = association.relation();
    let (left_col, right_col) = relation.columns();
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({left_col}, {right_col}) VALUES (?, ?)",
        relation.table()
    );
    for target in targets {
        let (left, right) = association.pair(owner, *target);
        sqlx::query(&sql)
            .bind(left)
            .bind(right)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("link", e))?;
    }
    Ok(())
}

async fn unlink_all(conn: &mut SqliteConnection, association: Association, owner: i64) -> DomainResult<()> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        association.relation().table(),
        association.owner_column()
    );
    sqlx::query(&sql)
        .bind(owner)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("unlink", e))?;
    Ok(())
}

async fn pluck_ids(conn: &mut SqliteConnection, association: Association, owner: i64) -> DomainResult<Vec<i64>> {
    let target = association.target_column();
    let sql = format!(
        "SELECT {target} FROM {} WHERE {} = ? ORDER BY {target} ASC",
        association.relation().table(),
        association.owner_column()
    );
    sqlx::query_scalar(&sql)
        .bind(owner)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("pluck", e))
}

async fn link_all(
    conn: &mut SqliteConnection,
    owner: i64,
    links: &[(Association, Vec<i64>)],
) -> DomainResult<()> {
    for (association, targets) in links {
        ensure_targets(&mut *conn, *association, targets).await?;
        link(&mut *conn, *association, owner, targets).await?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Query building
// ─────────────────────────────────────────────────────────────────────────────

const LIKE_ESCAPE: &str = " ESCAPE '\\'";

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Bool(b) => builder.push_bind(*b),
        Value::Integer(i) => builder.push_bind(*i),
        Value::Text(s) => builder.push_bind(s.clone()),
    };
}

fn push_where<F: Field>(builder: &mut QueryBuilder<'_, Sqlite>, query: &QuerySpec<F>) {
    let mut joiner = " WHERE ";
    for cond in &query.conditions {
        builder.push(joiner);
        joiner = " AND ";
        builder.push(cond.field.column());
        match cond.op {
            Operator::Eq => {
                builder.push(" = ");
                push_value(builder, &cond.value);
            }
            Operator::Ne => {
                builder.push(" <> ");
                push_value(builder, &cond.value);
            }
            Operator::Contains => {
                let term = match &cond.value {
                    Value::Text(s) => s.as_str(),
                    _ => "",
                };
                builder.push(" LIKE ");
                builder.push_bind(format!("%{}%", escape_like(term)));
                builder.push(LIKE_ESCAPE);
            }
        }
    }

    if let Some(search) = &query.search {
        if search.fields.is_empty() {
            return;
        }
        builder.push(joiner);
        builder.push("(");
        let pattern = format!("%{}%", escape_like(&search.term));
        for (i, field) in search.fields.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(field.column());
            builder.push(" LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(LIKE_ESCAPE);
        }
        builder.push(")");
    }
}

fn push_order<F: Field>(builder: &mut QueryBuilder<'_, Sqlite>, query: &QuerySpec<F>) {
    builder.push(" ORDER BY ");
    for (i, key) in query.effective_sort().iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(key.field.column());
        builder.push(" ");
        builder.push(key.direction.as_sql());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RelationshipStore
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl RelationshipStore for SqliteRelationshipStore {
    #[instrument(skip_all, fields(username = %user.username), err)]
    async fn insert_user(&self, user: &User) -> DomainResult<UserId> {
        bounded(self.options.timeout, "insert_user", async {
            let mut tx = self.begin("insert_user").await?;
            let id = sqlx::query(
                r#"
                INSERT INTO auth_user
                    (username, password_hash, display_name, phone, active, superuser, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(&user.phone)
            .bind(user.active)
            .bind(user.superuser)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?
            .last_insert_rowid();

            link_all(&mut tx, id, &user_links(user)).await?;
            Self::commit(tx, "insert_user").await?;
            Ok(UserId::new(id))
        })
        .await
    }

    #[instrument(skip_all, fields(name = %group.name), err)]
    async fn insert_group(&self, group: &Group) -> DomainResult<GroupId> {
        bounded(self.options.timeout, "insert_group", async {
            let mut tx = self.begin("insert_group").await?;
            let id = sqlx::query("INSERT INTO auth_group (name, description) VALUES (?, ?)")
                .bind(&group.name)
                .bind(&group.description)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_group", e))?
                .last_insert_rowid();

            link_all(&mut tx, id, &group_links(group)).await?;
            Self::commit(tx, "insert_group").await?;
            Ok(GroupId::new(id))
        })
        .await
    }

    #[instrument(skip_all, fields(name = %permission.name), err)]
    async fn insert_permission(&self, permission: &Permission) -> DomainResult<PermissionId> {
        bounded(self.options.timeout, "insert_permission", async {
            let mut tx = self.begin("insert_permission").await?;
            let id = sqlx::query("INSERT INTO auth_permission (name, description) VALUES (?, ?)")
                .bind(&permission.name)
                .bind(&permission.description)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_permission", e))?
                .last_insert_rowid();

            link_all(&mut tx, id, &permission_links(permission)).await?;
            Self::commit(tx, "insert_permission").await?;
            Ok(PermissionId::new(id))
        })
        .await
    }

    async fn find_user(&self, key: UserKey<'_>) -> DomainResult<Option<User>> {
        bounded(self.options.timeout, "find_user", async {
            let row = match key {
                UserKey::Id(id) => {
                    sqlx::query(&format!("SELECT {USER_COLUMNS} FROM auth_user WHERE id = ?"))
                        .bind(id.get())
                        .fetch_optional(&self.pool)
                        .await
                }
                UserKey::Username(username) => {
                    sqlx::query(&format!("SELECT {USER_COLUMNS} FROM auth_user WHERE username = ?"))
                        .bind(username)
                        .fetch_optional(&self.pool)
                        .await
                }
            }
            .map_err(|e| map_sqlx_error("find_user", e))?;

            row.map(|r| UserRow::from_row(&r).map(User::from))
                .transpose()
                .map_err(|e| map_sqlx_error("find_user", e))
        })
        .await
    }

    async fn find_group(&self, id: GroupId) -> DomainResult<Option<Group>> {
        bounded(self.options.timeout, "find_group", async {
            let row = sqlx::query(&format!("SELECT {GROUP_COLUMNS} FROM auth_group WHERE id = ?"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_group", e))?;

            row.map(|r| GroupRow::from_row(&r).map(Group::from))
                .transpose()
                .map_err(|e| map_sqlx_error("find_group", e))
        })
        .await
    }

    async fn find_permission(&self, key: PermissionKey<'_>) -> DomainResult<Option<Permission>> {
        bounded(self.options.timeout, "find_permission", async {
            let row = match key {
                PermissionKey::Id(id) => {
                    sqlx::query(&format!(
                        "SELECT {PERMISSION_COLUMNS} FROM auth_permission WHERE id = ?"
                    ))
                    .bind(id.get())
                    .fetch_optional(&self.pool)
                    .await
                }
                PermissionKey::Name(name) => {
                    sqlx::query(&format!(
                        "SELECT {PERMISSION_COLUMNS} FROM auth_permission WHERE name = ?"
                    ))
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await
                }
            }
            .map_err(|e| map_sqlx_error("find_permission", e))?;

            row.map(|r| PermissionRow::from_row(&r).map(Permission::from))
                .transpose()
                .map_err(|e| map_sqlx_error("find_permission", e))
        })
        .await
    }

    async fn list_users(&self, query: &QuerySpec<UserField>) -> DomainResult<Page<User>> {
        bounded(self.options.timeout, "list_users", async {
            let page: Page<UserRow> = self.list("auth_user", USER_COLUMNS, query).await?;
            Ok(page.map(User::from))
        })
        .await
    }

    async fn list_groups(&self, query: &QuerySpec<GroupField>) -> DomainResult<Page<Group>> {
        bounded(self.options.timeout, "list_groups", async {
            let page: Page<GroupRow> = self.list("auth_group", GROUP_COLUMNS, query).await?;
            Ok(page.map(Group::from))
        })
        .await
    }

    async fn list_permissions(
        &self,
        query: &QuerySpec<PermissionField>,
    ) -> DomainResult<Page<Permission>> {
        bounded(self.options.timeout, "list_permissions", async {
            let page: Page<PermissionRow> =
                self.list("auth_permission", PERMISSION_COLUMNS, query).await?;
            Ok(page.map(Permission::from))
        })
        .await
    }

    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn update_user(&self, user: &User) -> DomainResult<()> {
        bounded(self.options.timeout, "update_user", async {
            let result = sqlx::query(
                r#"
                UPDATE auth_user
                SET username = ?, password_hash = ?, display_name = ?, phone = ?,
                    active = ?, superuser = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(&user.phone)
            .bind(user.active)
            .bind(user.superuser)
            .bind(user.updated_at)
            .bind(user.id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::not_found(format!("user {}", user.id)));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, fields(group_id = %group.id), err)]
    async fn update_group(&self, group: &Group) -> DomainResult<()> {
        bounded(self.options.timeout, "update_group", async {
            let result = sqlx::query("UPDATE auth_group SET name = ?, description = ? WHERE id = ?")
                .bind(&group.name)
                .bind(&group.description)
                .bind(group.id.get())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("update_group", e))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::not_found(format!("group {}", group.id)));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, fields(permission_id = %permission.id), err)]
    async fn update_permission(&self, permission: &Permission) -> DomainResult<()> {
        bounded(self.options.timeout, "update_permission", async {
            let result =
                sqlx::query("UPDATE auth_permission SET name = ?, description = ? WHERE id = ?")
                    .bind(&permission.name)
                    .bind(&permission.description)
                    .bind(permission.id.get())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("update_permission", e))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::not_found(format!("permission {}", permission.id)));
            }
            Ok(())
        })
        .await
    }

    async fn exists(&self, kind: EntityKind, id: i64) -> DomainResult<bool> {
        bounded(self.options.timeout, "exists", async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_sqlx_error("exists", e))?;
            row_exists(&mut conn, kind, id).await
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, kind: EntityKind, id: i64) -> DomainResult<()> {
        bounded(self.options.timeout, "delete", async {
            let mut tx = self.begin("delete").await?;
            if !row_exists(&mut tx, kind, id).await? {
                return Err(DomainError::not_found(format!("{kind} {id}")));
            }
            for association in kind.associations() {
                if !pluck_ids(&mut tx, association, id).await?.is_empty() {
                    return Err(DomainError::constraint(format!(
                        "{kind} {id} is still referenced by {}",
                        association.relation().table()
                    )));
                }
            }

            sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete", e))?;
            Self::commit(tx, "delete").await
        })
        .await
    }

    async fn pluck(&self, association: Association, owner: i64) -> DomainResult<Vec<i64>> {
        bounded(self.options.timeout, "pluck", async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_sqlx_error("pluck", e))?;
            pluck_ids(&mut conn, association, owner).await
        })
        .await
    }

    #[instrument(skip(self, targets), fields(target_count = targets.len()), err)]
    async fn replace_association(
        &self,
        association: Association,
        owner: i64,
        targets: &[i64],
    ) -> DomainResult<()> {
        bounded(self.options.timeout, "replace_association", async {
            let targets = dedup_ids(targets);
            let mut tx = self.begin("replace_association").await?;

            let owner_kind = association.owner();
            if !row_exists(&mut tx, owner_kind, owner).await? {
                return Err(DomainError::not_found(format!("{owner_kind} {owner}")));
            }
            ensure_targets(&mut tx, association, &targets).await?;

            unlink_all(&mut tx, association, owner).await?;
            link(&mut tx, association, owner, &targets).await?;
            Self::commit(tx, "replace_association").await
        })
        .await
    }

    async fn clear_association(&self, association: Association, owner: i64) -> DomainResult<()> {
        bounded(self.options.timeout, "clear_association", async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_sqlx_error("clear_association", e))?;
            unlink_all(&mut conn, association, owner).await
        })
        .await
    }
}

/// Map SQLx errors onto the four domain error kinds.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            if db_err.is_unique_violation() {
                DomainError::ConstraintViolation(msg)
            } else if db_err.is_foreign_key_violation() {
                DomainError::NotFound(msg)
            } else {
                DomainError::StoreUnavailable(msg)
            }
        }
        sqlx::Error::PoolTimedOut => {
            DomainError::unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            DomainError::unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Configuration(e) => {
            DomainError::malformed(format!("invalid database configuration in {operation}: {e}"))
        }
        other => DomainError::unavailable(format!("sqlx error in {operation}: {other}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    display_name: String,
    phone: String,
    active: bool,
    superuser: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for UserRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            display_name: row.try_get("display_name")?,
            phone: row.try_get("phone")?,
            active: row.try_get("active")?,
            superuser: row.try_get("superuser")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::new(row.id),
            username: row.username,
            password_hash: row.password_hash,
            display_name: row.display_name,
            phone: row.phone,
            active: row.active,
            superuser: row.superuser,
            created_at: row.created_at,
            updated_at: row.updated_at,
            permission_ids: None,
            group_ids: None,
        }
    }
}

#[derive(Debug)]
struct GroupRow {
    id: i64,
    name: String,
    description: String,
}

impl<'r> FromRow<'r, SqliteRow> for GroupRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(GroupRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        let mut group = Group::new(row.name).with_description(row.description);
        group.id = GroupId::new(row.id);
        group
    }
}

#[derive(Debug)]
struct PermissionRow {
    id: i64,
    name: String,
    description: String,
}

impl<'r> FromRow<'r, SqliteRow> for PermissionRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        let mut permission = Permission::new(row.name).with_description(row.description);
        permission.id = PermissionId::new(row.id);
        permission
    }
}

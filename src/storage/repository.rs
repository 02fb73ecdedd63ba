use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    Cents, Expense, ExpenseId, ExpenseShare, Group, GroupId, MemberTotals, Membership,
    Settlement, User, UserId,
};

use super::MIGRATION_001_INITIAL;

const USER_COLUMNS: &str = "id, name, email, contact_no, joined_at";
const GROUP_COLUMNS: &str = "id, name, created_at";
const EXPENSE_COLUMNS: &str = "id, group_id, paid_by, amount_cents, description, created_at";
const SETTLEMENT_COLUMNS: &str =
    "id, group_id, from_user_id, to_user_id, amount_cents, settled_at";

/// Row counts for a group, used by the CLI summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupStats {
    pub member_count: i64,
    pub expense_count: i64,
    pub settlement_count: i64,
    pub total_spent: Cents,
}

/// Repository for persisting and querying the shared-expense ledger.
///
/// Single-statement reads and writes run directly on the pool. Anything that
/// has to check and write atomically goes through [`LedgerTx`].
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a read transaction. All reads through it see one snapshot.
    /// Dropping the returned handle without calling [`LedgerTx::commit`]
    /// rolls everything back.
    pub async fn begin(&self) -> Result<LedgerTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(LedgerTx { tx })
    }

    /// Start a transaction that will write.
    ///
    /// The write lock is taken up front, so concurrent writers queue on the
    /// busy timeout instead of failing when a read lock cannot be upgraded.
    pub async fn begin_write(&self) -> Result<LedgerTx> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("Failed to begin write transaction")?;
        Ok(LedgerTx { tx })
    }

    // ========================
    // User operations
    // ========================

    pub async fn save_user(&self, user: &User) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        insert_user(&mut conn, user).await
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        find_user(&mut conn, id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY name, email", USER_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        rows.iter().map(row_to_user).collect()
    }

    // ========================
    // Group operations
    // ========================

    pub async fn save_group(&self, group: &Group) -> Result<()> {
        sqlx::query("INSERT INTO expense_groups (id, name, created_at) VALUES (?, ?, ?)")
            .bind(group.id.to_string())
            .bind(&group.name)
            .bind(timestamp(&group.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to save group")?;
        Ok(())
    }

    pub async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        find_group(&mut conn, id).await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM expense_groups ORDER BY created_at, name",
            GROUP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list groups")?;

        rows.iter().map(row_to_group).collect()
    }

    /// Groups the user is a member of.
    pub async fn list_groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.name, g.created_at
            FROM expense_groups g
            JOIN memberships m ON m.group_id = g.id
            WHERE m.user_id = ?
            ORDER BY g.created_at, g.name
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list groups for user")?;

        rows.iter().map(row_to_group).collect()
    }

    pub async fn get_group_stats(&self, group_id: GroupId) -> Result<GroupStats> {
        let group_id_str = group_id.to_string();

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM memberships WHERE group_id = ?) as member_count,
                (SELECT COUNT(*) FROM expenses WHERE group_id = ?) as expense_count,
                (SELECT COUNT(*) FROM settlements WHERE group_id = ?) as settlement_count,
                (SELECT COALESCE(SUM(amount_cents), 0) FROM expenses WHERE group_id = ?) as total_spent
            "#,
        )
        .bind(&group_id_str)
        .bind(&group_id_str)
        .bind(&group_id_str)
        .bind(&group_id_str)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute group stats")?;

        Ok(GroupStats {
            member_count: row.get("member_count"),
            expense_count: row.get("expense_count"),
            settlement_count: row.get("settlement_count"),
            total_spent: row.get("total_spent"),
        })
    }

    // ========================
    // Membership operations
    // ========================

    pub async fn is_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        is_member(&mut conn, group_id, user_id).await
    }

    /// Members of a group in the order they joined.
    pub async fn list_members(&self, group_id: GroupId) -> Result<Vec<User>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        list_members(&mut conn, group_id).await
    }

    // ========================
    // Expense operations
    // ========================

    pub async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        find_expense(&mut conn, id).await
    }

    pub async fn exists_expense(&self, id: ExpenseId) -> Result<bool> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        exists_expense(&mut conn, id).await
    }

    /// Expenses of a group, newest first.
    pub async fn list_expenses_for_group(&self, group_id: GroupId) -> Result<Vec<Expense>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        list_expenses_for_group(&mut conn, group_id).await
    }

    /// Shares of an expense together with the participating users.
    pub async fn list_share_details(&self, expense_id: ExpenseId) -> Result<Vec<(ExpenseShare, User)>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id as share_id, s.expense_id, s.share_cents,
                   u.id, u.name, u.email, u.contact_no, u.joined_at
            FROM expense_shares s
            JOIN users u ON u.id = s.user_id
            WHERE s.expense_id = ?
            ORDER BY u.name, u.email
            "#,
        )
        .bind(expense_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list expense shares")?;

        rows.iter()
            .map(|row| {
                let user = row_to_user(row)?;
                let share = ExpenseShare {
                    id: parse_uuid(row, "share_id")?,
                    expense_id: parse_uuid(row, "expense_id")?,
                    user_id: user.id,
                    share_cents: row.get("share_cents"),
                };
                Ok((share, user))
            })
            .collect()
    }

    /// Every share of every expense in a group.
    pub async fn list_shares_for_group(&self, group_id: GroupId) -> Result<Vec<ExpenseShare>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        list_shares_for_group(&mut conn, group_id).await
    }

    // ========================
    // Settlement operations
    // ========================

    pub async fn save_settlement(&self, settlement: &Settlement) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        insert_settlement(&mut conn, settlement).await
    }

    /// Settlements recorded in a group, oldest first.
    pub async fn list_settlements_for_group(&self, group_id: GroupId) -> Result<Vec<Settlement>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        list_settlements_for_group(&mut conn, group_id).await
    }

    // ========================
    // Aggregations
    // ========================

    /// Sum of the expenses a user paid in a group; `None` if they paid none.
    pub async fn sum_paid_by_user_in_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<Cents>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        sum_paid_by_user_in_group(&mut conn, user_id, group_id).await
    }

    /// Sum of a user's shares in a group; `None` if they take part in nothing.
    pub async fn sum_owed_by_user_in_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<Cents>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        sum_owed_by_user_in_group(&mut conn, user_id, group_id).await
    }

    pub async fn sum_settled_from(&self, user_id: UserId, group_id: GroupId) -> Result<Cents> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        sum_settled(&mut conn, SettledSide::From, user_id, group_id).await
    }

    pub async fn sum_settled_to(&self, user_id: UserId, group_id: GroupId) -> Result<Cents> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        sum_settled(&mut conn, SettledSide::To, user_id, group_id).await
    }
}

/// A database transaction over the ledger.
///
/// Validation that must hold at write time (membership, existence) is read
/// through the same handle that writes, so it cannot be invalidated by a
/// concurrent writer before commit.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerTx {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }

    pub async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        find_user(&mut self.tx, id).await
    }

    pub async fn find_group(&mut self, id: GroupId) -> Result<Option<Group>> {
        find_group(&mut self.tx, id).await
    }

    pub async fn is_member(&mut self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        is_member(&mut self.tx, group_id, user_id).await
    }

    pub async fn list_members(&mut self, group_id: GroupId) -> Result<Vec<User>> {
        list_members(&mut self.tx, group_id).await
    }

    pub async fn find_expense(&mut self, id: ExpenseId) -> Result<Option<Expense>> {
        find_expense(&mut self.tx, id).await
    }

    pub async fn exists_expense(&mut self, id: ExpenseId) -> Result<bool> {
        exists_expense(&mut self.tx, id).await
    }

    pub async fn list_expenses_for_group(&mut self, group_id: GroupId) -> Result<Vec<Expense>> {
        list_expenses_for_group(&mut self.tx, group_id).await
    }

    pub async fn list_shares_for_group(&mut self, group_id: GroupId) -> Result<Vec<ExpenseShare>> {
        list_shares_for_group(&mut self.tx, group_id).await
    }

    pub async fn list_settlements_for_group(&mut self, group_id: GroupId) -> Result<Vec<Settlement>> {
        list_settlements_for_group(&mut self.tx, group_id).await
    }

    pub async fn email_taken(&mut self, email: &str, except: Option<UserId>) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to check email")?;

        match row {
            Some(row) => {
                let id = parse_uuid(&row, "id")?;
                Ok(Some(id) != except)
            }
            None => Ok(false),
        }
    }

    pub async fn save_user(&mut self, user: &User) -> Result<()> {
        insert_user(&mut self.tx, user).await
    }

    /// Overwrite the editable profile fields of a user.
    pub async fn update_user(&mut self, user: &User) -> Result<()> {
        sqlx::query("UPDATE users SET name = ?, email = ?, contact_no = ? WHERE id = ?")
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.contact_no)
            .bind(user.id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to update user")?;
        Ok(())
    }

    pub async fn save_membership(&mut self, membership: &Membership) -> Result<()> {
        sqlx::query("INSERT INTO memberships (group_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(membership.group_id.to_string())
            .bind(membership.user_id.to_string())
            .bind(timestamp(&membership.joined_at))
            .execute(&mut *self.tx)
            .await
            .context("Failed to save membership")?;
        Ok(())
    }

    /// Remove a membership. Returns false if the user was not a member.
    pub async fn delete_membership(&mut self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM memberships WHERE group_id = ? AND user_id = ?")
            .bind(group_id.to_string())
            .bind(user_id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete membership")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn save_expense(&mut self, expense: &Expense) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, group_id, paid_by, amount_cents, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.id.to_string())
        .bind(expense.group_id.to_string())
        .bind(expense.paid_by.to_string())
        .bind(expense.amount_cents)
        .bind(&expense.description)
        .bind(timestamp(&expense.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save expense")?;
        Ok(())
    }

    pub async fn save_expense_share(&mut self, share: &ExpenseShare) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO expense_shares (id, expense_id, user_id, share_cents)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(share.id.to_string())
        .bind(share.expense_id.to_string())
        .bind(share.user_id.to_string())
        .bind(share.share_cents)
        .execute(&mut *self.tx)
        .await
        .context("Failed to save expense share")?;
        Ok(())
    }

    pub async fn save_settlement(&mut self, settlement: &Settlement) -> Result<()> {
        insert_settlement(&mut self.tx, settlement).await
    }

    /// Delete an expense and its shares.
    pub async fn delete_expense(&mut self, id: ExpenseId) -> Result<()> {
        let id_str = id.to_string();

        sqlx::query("DELETE FROM expense_shares WHERE expense_id = ?")
            .bind(&id_str)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete expense shares")?;

        sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete expense")?;

        Ok(())
    }

    /// Delete a group with its memberships, expenses and shares.
    /// Settlements reference raw ids and are left alone.
    pub async fn delete_group(&mut self, id: GroupId) -> Result<()> {
        let id_str = id.to_string();
        let statements = [
            (
                "DELETE FROM expense_shares WHERE expense_id IN (SELECT id FROM expenses WHERE group_id = ?)",
                "Failed to delete group expense shares",
            ),
            (
                "DELETE FROM expenses WHERE group_id = ?",
                "Failed to delete group expenses",
            ),
            (
                "DELETE FROM memberships WHERE group_id = ?",
                "Failed to delete group memberships",
            ),
            ("DELETE FROM expense_groups WHERE id = ?", "Failed to delete group"),
        ];

        for (sql, error) in statements {
            sqlx::query(sql)
                .bind(&id_str)
                .execute(&mut *self.tx)
                .await
                .context(error)?;
        }
        Ok(())
    }

    /// Delete a user with their memberships, their shares, and the expenses
    /// they paid (including the other participants' shares of those).
    /// Settlements reference raw ids and are left alone.
    pub async fn delete_user(&mut self, id: UserId) -> Result<()> {
        let id_str = id.to_string();
        let statements = [
            (
                "DELETE FROM expense_shares WHERE expense_id IN (SELECT id FROM expenses WHERE paid_by = ?)",
                "Failed to delete shares of paid expenses",
            ),
            (
                "DELETE FROM expense_shares WHERE user_id = ?",
                "Failed to delete user shares",
            ),
            (
                "DELETE FROM expenses WHERE paid_by = ?",
                "Failed to delete paid expenses",
            ),
            (
                "DELETE FROM memberships WHERE user_id = ?",
                "Failed to delete user memberships",
            ),
            ("DELETE FROM users WHERE id = ?", "Failed to delete user"),
        ];

        for (sql, error) in statements {
            sqlx::query(sql)
                .bind(&id_str)
                .execute(&mut *self.tx)
                .await
                .context(error)?;
        }
        Ok(())
    }

    /// Paid, owed and settled sums for one member of a group.
    pub async fn member_totals(&mut self, user_id: UserId, group_id: GroupId) -> Result<MemberTotals> {
        Ok(MemberTotals {
            paid: sum_paid_by_user_in_group(&mut self.tx, user_id, group_id)
                .await?
                .unwrap_or(0),
            owed: sum_owed_by_user_in_group(&mut self.tx, user_id, group_id)
                .await?
                .unwrap_or(0),
            settled_from: sum_settled(&mut self.tx, SettledSide::From, user_id, group_id).await?,
            settled_to: sum_settled(&mut self.tx, SettledSide::To, user_id, group_id).await?,
        })
    }
}

// ========================
// Queries shared by the pool and transaction paths
// ========================

async fn insert_user(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, contact_no, joined_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.contact_no)
    .bind(timestamp(&user.joined_at))
    .execute(&mut *conn)
    .await
    .context("Failed to save user")?;
    Ok(())
}

async fn find_user(conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch user")?;

    row.as_ref().map(row_to_user).transpose()
}

async fn find_group(conn: &mut SqliteConnection, id: GroupId) -> Result<Option<Group>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM expense_groups WHERE id = ?",
        GROUP_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch group")?;

    row.as_ref().map(row_to_group).transpose()
}

async fn is_member(conn: &mut SqliteConnection, group_id: GroupId, user_id: UserId) -> Result<bool> {
    let row = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM memberships WHERE group_id = ? AND user_id = ?) as member",
    )
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(&mut *conn)
    .await
    .context("Failed to check membership")?;

    Ok(row.get::<i64, _>("member") != 0)
}

async fn list_members(conn: &mut SqliteConnection, group_id: GroupId) -> Result<Vec<User>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id, u.name, u.email, u.contact_no, u.joined_at
        FROM memberships m
        JOIN users u ON u.id = m.user_id
        WHERE m.group_id = ?
        ORDER BY m.id
        "#,
    )
    .bind(group_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list group members")?;

    rows.iter().map(row_to_user).collect()
}

async fn find_expense(conn: &mut SqliteConnection, id: ExpenseId) -> Result<Option<Expense>> {
    let row = sqlx::query(&format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch expense")?;

    row.as_ref().map(row_to_expense).transpose()
}

async fn exists_expense(conn: &mut SqliteConnection, id: ExpenseId) -> Result<bool> {
    let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM expenses WHERE id = ?) as found")
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to check expense")?;

    Ok(row.get::<i64, _>("found") != 0)
}

async fn list_expenses_for_group(conn: &mut SqliteConnection, group_id: GroupId) -> Result<Vec<Expense>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM expenses WHERE group_id = ? ORDER BY created_at DESC, rowid DESC",
        EXPENSE_COLUMNS
    ))
    .bind(group_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list expenses")?;

    rows.iter().map(row_to_expense).collect()
}

async fn list_shares_for_group(conn: &mut SqliteConnection, group_id: GroupId) -> Result<Vec<ExpenseShare>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.expense_id, s.user_id, s.share_cents
        FROM expense_shares s
        JOIN expenses e ON e.id = s.expense_id
        WHERE e.group_id = ?
        ORDER BY e.created_at, s.rowid
        "#,
    )
    .bind(group_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list group shares")?;

    rows.iter()
        .map(|row| {
            Ok(ExpenseShare {
                id: parse_uuid(row, "id")?,
                expense_id: parse_uuid(row, "expense_id")?,
                user_id: parse_uuid(row, "user_id")?,
                share_cents: row.get("share_cents"),
            })
        })
        .collect()
}

async fn insert_settlement(conn: &mut SqliteConnection, settlement: &Settlement) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settlements (id, group_id, from_user_id, to_user_id, amount_cents, settled_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(settlement.id.to_string())
    .bind(settlement.group_id.to_string())
    .bind(settlement.from_user.to_string())
    .bind(settlement.to_user.to_string())
    .bind(settlement.amount_cents)
    .bind(timestamp(&settlement.settled_at))
    .execute(&mut *conn)
    .await
    .context("Failed to save settlement")?;
    Ok(())
}

async fn list_settlements_for_group(
    conn: &mut SqliteConnection,
    group_id: GroupId,
) -> Result<Vec<Settlement>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM settlements WHERE group_id = ? ORDER BY settled_at, rowid",
        SETTLEMENT_COLUMNS
    ))
    .bind(group_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list settlements")?;

    rows.iter().map(row_to_settlement).collect()
}

async fn sum_paid_by_user_in_group(
    conn: &mut SqliteConnection,
    user_id: UserId,
    group_id: GroupId,
) -> Result<Option<Cents>> {
    let row = sqlx::query(
        "SELECT SUM(amount_cents) as total FROM expenses WHERE paid_by = ? AND group_id = ?",
    )
    .bind(user_id.to_string())
    .bind(group_id.to_string())
    .fetch_one(&mut *conn)
    .await
    .context("Failed to sum paid amounts")?;

    Ok(row.get("total"))
}

async fn sum_owed_by_user_in_group(
    conn: &mut SqliteConnection,
    user_id: UserId,
    group_id: GroupId,
) -> Result<Option<Cents>> {
    let row = sqlx::query(
        r#"
        SELECT SUM(s.share_cents) as total
        FROM expense_shares s
        JOIN expenses e ON e.id = s.expense_id
        WHERE s.user_id = ? AND e.group_id = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(group_id.to_string())
    .fetch_one(&mut *conn)
    .await
    .context("Failed to sum owed amounts")?;

    Ok(row.get("total"))
}

#[derive(Clone, Copy)]
enum SettledSide {
    From,
    To,
}

async fn sum_settled(
    conn: &mut SqliteConnection,
    side: SettledSide,
    user_id: UserId,
    group_id: GroupId,
) -> Result<Cents> {
    let sql = match side {
        SettledSide::From => {
            "SELECT COALESCE(SUM(amount_cents), 0) as total FROM settlements WHERE from_user_id = ? AND group_id = ?"
        }
        SettledSide::To => {
            "SELECT COALESCE(SUM(amount_cents), 0) as total FROM settlements WHERE to_user_id = ? AND group_id = ?"
        }
    };

    let row = sqlx::query(sql)
        .bind(user_id.to_string())
        .bind(group_id.to_string())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to sum settlements")?;

    Ok(row.get("total"))
}

// ========================
// Row mapping
// ========================

/// Timestamps are stored as fixed-width RFC 3339 so they sort as text.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.get(column);
    Ok(DateTime::parse_from_rfc3339(&value)
        .with_context(|| format!("Invalid {} timestamp", column))?
        .with_timezone(&Utc))
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.get(column);
    Uuid::parse_str(&value).with_context(|| format!("Invalid {} ID", column))
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(row, "id")?,
        name: row.get("name"),
        email: row.get("email"),
        contact_no: row.get("contact_no"),
        joined_at: parse_timestamp(row, "joined_at")?,
    })
}

fn row_to_group(row: &SqliteRow) -> Result<Group> {
    Ok(Group {
        id: parse_uuid(row, "id")?,
        name: row.get("name"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_expense(row: &SqliteRow) -> Result<Expense> {
    Ok(Expense {
        id: parse_uuid(row, "id")?,
        group_id: parse_uuid(row, "group_id")?,
        paid_by: parse_uuid(row, "paid_by")?,
        amount_cents: row.get("amount_cents"),
        description: row.get("description"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_settlement(row: &SqliteRow) -> Result<Settlement> {
    Ok(Settlement {
        id: parse_uuid(row, "id")?,
        group_id: parse_uuid(row, "group_id")?,
        from_user: parse_uuid(row, "from_user_id")?,
        to_user: parse_uuid(row, "to_user_id")?,
        amount_cents: row.get("amount_cents"),
        settled_at: parse_timestamp(row, "settled_at")?,
    })
}

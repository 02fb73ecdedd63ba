use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::domain::{
    Balance, Cents, Expense, ExpenseId, ExpenseShare, Group, GroupId, Membership, Settlement,
    User, UserId, compute_shares, format_cents, total_of, validate_description,
    validate_group_name, validate_profile,
};
use crate::storage::{GroupStats, Repository};

use super::AppError;

/// Application service providing high-level operations for the shared-expense ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
#[derive(Clone)]
pub struct LedgerService {
    repo: Repository,
}

/// Request to record a new expense
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub group_id: GroupId,
    pub paid_by: UserId,
    pub amount_cents: Cents,
    pub description: String,
    pub participants: Vec<UserId>,
    /// Per-participant amounts; `None` or empty means an equal split
    pub custom_shares: Option<HashMap<UserId, Cents>>,
}

/// One participant's part of an expense
#[derive(Debug, Clone)]
pub struct ParticipantShare {
    pub share: ExpenseShare,
    pub user: User,
}

/// An expense with its payer and participants resolved
#[derive(Debug, Clone)]
pub struct ExpenseDetails {
    pub expense: Expense,
    pub paid_by: User,
    pub shares: Vec<ParticipantShare>,
}

impl ExpenseDetails {
    /// Sum of all shares. May differ from the expense amount by the
    /// equal-split rounding residual.
    pub fn shares_total(&self) -> Cents {
        self.shares
            .iter()
            .fold(0, |acc: Cents, p| acc.saturating_add(p.share.share_cents))
    }
}

/// A group with its members in join order
#[derive(Debug, Clone)]
pub struct GroupDetails {
    pub group: Group,
    pub members: Vec<User>,
}

/// Detailed group information
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub group: Group,
    pub members: Vec<User>,
    pub stats: GroupStats,
}

/// A transfer to record as part of a settle-up
#[derive(Debug, Clone, Copy)]
pub struct SettlementRequest {
    pub from_user: UserId,
    pub to_user: UserId,
    pub amount_cents: Cents,
}

/// All records of a group, read in one transaction
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub group: Group,
    pub members: Vec<User>,
    pub expenses: Vec<Expense>,
    pub shares: Vec<ExpenseShare>,
    pub settlements: Vec<Settlement>,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        debug!(database = database_path, "database initialized");
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // User operations
    // ========================

    /// Create a new user. Emails are unique.
    pub async fn create_user(
        &self,
        name: String,
        email: String,
        contact_no: Option<String>,
    ) -> Result<User, AppError> {
        validate_profile(&name, &email, contact_no.as_deref()).map_err(AppError::InvalidInput)?;

        let mut tx = self.repo.begin_write().await?;
        if tx.email_taken(&email, None).await? {
            return Err(AppError::EmailAlreadyExists(email));
        }

        let mut user = User::new(name, email);
        if let Some(contact) = contact_no {
            user = user.with_contact_no(contact);
        }

        tx.save_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or(AppError::UserNotFound(id))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::UserEmailNotFound(email.to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    /// Replace the editable profile fields of a user.
    pub async fn update_user(
        &self,
        id: UserId,
        name: String,
        email: String,
        contact_no: Option<String>,
    ) -> Result<User, AppError> {
        validate_profile(&name, &email, contact_no.as_deref()).map_err(AppError::InvalidInput)?;

        let mut tx = self.repo.begin_write().await?;
        let mut user = tx.find_user(id).await?.ok_or(AppError::UserNotFound(id))?;

        if user.email != email && tx.email_taken(&email, Some(id)).await? {
            return Err(AppError::EmailAlreadyExists(email));
        }

        user.name = name;
        user.email = email;
        user.contact_no = contact_no;
        tx.update_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "user updated");
        Ok(user)
    }

    /// Delete a user together with their memberships, their shares and the
    /// expenses they paid. Recorded settlements are kept.
    pub async fn delete_user(&self, id: UserId) -> Result<User, AppError> {
        let mut tx = self.repo.begin_write().await?;
        let user = tx.find_user(id).await?.ok_or(AppError::UserNotFound(id))?;
        tx.delete_user(id).await?;
        tx.commit().await?;

        info!(user_id = %id, "user deleted");
        Ok(user)
    }

    // ========================
    // Group operations
    // ========================

    pub async fn create_group(&self, name: String) -> Result<Group, AppError> {
        validate_group_name(&name).map_err(AppError::InvalidInput)?;

        let group = Group::new(name);
        self.repo.save_group(&group).await?;

        info!(group_id = %group.id, name = %group.name, "group created");
        Ok(group)
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        Ok(self.repo.list_groups().await?)
    }

    /// Get a group with its members.
    pub async fn get_group(&self, id: GroupId) -> Result<GroupDetails, AppError> {
        let group = self
            .repo
            .get_group(id)
            .await?
            .ok_or(AppError::GroupNotFound(id))?;
        let members = self.repo.list_members(id).await?;
        Ok(GroupDetails { group, members })
    }

    /// Get detailed group information.
    pub async fn get_group_info(&self, id: GroupId) -> Result<GroupInfo, AppError> {
        let GroupDetails { group, members } = self.get_group(id).await?;
        let stats = self.repo.get_group_stats(id).await?;
        Ok(GroupInfo {
            group,
            members,
            stats,
        })
    }

    /// Groups a user belongs to.
    pub async fn get_groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>, AppError> {
        Ok(self.repo.list_groups_for_user(user_id).await?)
    }

    /// Members of a group in the order they joined.
    pub async fn get_group_members(&self, group_id: GroupId) -> Result<Vec<User>, AppError> {
        Ok(self.get_group(group_id).await?.members)
    }

    /// Add a user to a group. A user can join a group only once.
    pub async fn add_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<GroupDetails, AppError> {
        let mut tx = self.repo.begin_write().await?;
        let group = tx
            .find_group(group_id)
            .await?
            .ok_or(AppError::GroupNotFound(group_id))?;
        tx.find_user(user_id)
            .await?
            .ok_or(AppError::UserNotFound(user_id))?;

        if tx.is_member(group_id, user_id).await? {
            return Err(AppError::AlreadyMember { group_id, user_id });
        }

        tx.save_membership(&Membership::new(group_id, user_id)).await?;
        let members = tx.list_members(group_id).await?;
        tx.commit().await?;

        info!(group_id = %group_id, user_id = %user_id, "member added");
        Ok(GroupDetails { group, members })
    }

    /// Remove a user from a group. Their past expenses and shares are kept.
    pub async fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<(), AppError> {
        let mut tx = self.repo.begin_write().await?;
        if !tx.delete_membership(group_id, user_id).await? {
            return Err(AppError::NotAMember { group_id, user_id });
        }
        tx.commit().await?;

        info!(group_id = %group_id, user_id = %user_id, "member removed");
        Ok(())
    }

    /// Delete a group with its memberships, expenses and shares.
    pub async fn delete_group(&self, id: GroupId) -> Result<Group, AppError> {
        let mut tx = self.repo.begin_write().await?;
        let group = tx.find_group(id).await?.ok_or(AppError::GroupNotFound(id))?;
        tx.delete_group(id).await?;
        tx.commit().await?;

        info!(group_id = %id, "group deleted");
        Ok(group)
    }

    // ========================
    // Expense operations
    // ========================

    /// Record an expense and the share each participant owes.
    ///
    /// Checks run in order and the first failure wins: group exists, payer
    /// exists, participants given, payer is a member, every participant is a
    /// member. The checks and all writes share one transaction, so either the
    /// expense and every share are stored or nothing is.
    pub async fn create_expense(&self, request: NewExpense) -> Result<ExpenseDetails, AppError> {
        let group_id = request.group_id;
        self.create_expense_tx(request).await.inspect_err(|err| {
            warn!(group_id = %group_id, error = %err, "expense rejected");
        })
    }

    async fn create_expense_tx(&self, request: NewExpense) -> Result<ExpenseDetails, AppError> {
        if request.amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ));
        }
        validate_description(&request.description).map_err(AppError::InvalidInput)?;

        let mut tx = self.repo.begin_write().await?;

        tx.find_group(request.group_id)
            .await?
            .ok_or(AppError::GroupNotFound(request.group_id))?;
        let paid_by = tx
            .find_user(request.paid_by)
            .await?
            .ok_or(AppError::UserNotFound(request.paid_by))?;

        if request.participants.is_empty() {
            return Err(AppError::NoParticipants);
        }
        if !tx.is_member(request.group_id, request.paid_by).await? {
            return Err(AppError::PayerNotMember(request.paid_by));
        }
        for &participant in &request.participants {
            if !tx.is_member(request.group_id, participant).await? {
                return Err(AppError::ParticipantNotMember(participant));
            }
        }

        let expense = Expense::new(
            request.group_id,
            request.paid_by,
            request.amount_cents,
            request.description,
        );
        tx.save_expense(&expense).await?;

        let split = compute_shares(
            expense.amount_cents,
            &request.participants,
            request.custom_shares.as_ref(),
        )?;
        debug!(
            expense_id = %expense.id,
            participants = split.len(),
            shares_total = %format_cents(total_of(&split)),
            "computed split"
        );

        let mut shares = Vec::with_capacity(split.len());
        for (user_id, share_cents) in split {
            let user = tx
                .find_user(user_id)
                .await?
                .ok_or(AppError::UserNotFound(user_id))?;
            let share = ExpenseShare::new(expense.id, user_id, share_cents);
            tx.save_expense_share(&share).await?;
            shares.push(ParticipantShare { share, user });
        }

        tx.commit().await?;

        info!(
            expense_id = %expense.id,
            group_id = %expense.group_id,
            paid_by = %expense.paid_by,
            amount = %format_cents(expense.amount_cents),
            "expense created"
        );

        Ok(ExpenseDetails {
            expense,
            paid_by,
            shares,
        })
    }

    /// Delete an expense and its shares.
    pub async fn delete_expense(&self, id: ExpenseId) -> Result<(), AppError> {
        let mut tx = self.repo.begin_write().await?;
        if !tx.exists_expense(id).await? {
            return Err(AppError::ExpenseNotFound(id));
        }
        tx.delete_expense(id).await?;
        tx.commit().await?;

        info!(expense_id = %id, "expense deleted");
        Ok(())
    }

    /// Expenses of a group, newest first.
    pub async fn get_expenses_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<ExpenseDetails>, AppError> {
        let expenses = self.repo.list_expenses_for_group(group_id).await?;
        let mut details = Vec::with_capacity(expenses.len());
        for expense in expenses {
            details.push(self.expense_details(expense).await?);
        }
        Ok(details)
    }

    pub async fn get_expense_by_id(&self, id: ExpenseId) -> Result<ExpenseDetails, AppError> {
        let expense = self
            .repo
            .get_expense(id)
            .await?
            .ok_or(AppError::ExpenseNotFound(id))?;
        self.expense_details(expense).await
    }

    /// Participants of an expense with their shares. Unknown expenses have
    /// no participants.
    pub async fn get_expense_participants(
        &self,
        id: ExpenseId,
    ) -> Result<Vec<ParticipantShare>, AppError> {
        Ok(self
            .repo
            .list_share_details(id)
            .await?
            .into_iter()
            .map(|(share, user)| ParticipantShare { share, user })
            .collect())
    }

    async fn expense_details(&self, expense: Expense) -> Result<ExpenseDetails, AppError> {
        let paid_by = self.get_user(expense.paid_by).await?;
        let shares = self.get_expense_participants(expense.id).await?;
        Ok(ExpenseDetails {
            expense,
            paid_by,
            shares,
        })
    }

    // ========================
    // Settlement operations
    // ========================

    /// Record a direct payment between two users of a group. Nothing checks
    /// the amount against what is actually owed.
    pub async fn record_settlement(
        &self,
        group_id: GroupId,
        from_user: UserId,
        to_user: UserId,
        amount_cents: Cents,
    ) -> Result<Settlement, AppError> {
        let settlement = new_settlement(
            group_id,
            SettlementRequest {
                from_user,
                to_user,
                amount_cents,
            },
        )?;
        self.repo.save_settlement(&settlement).await?;

        info!(
            group_id = %group_id,
            from = %from_user,
            to = %to_user,
            amount = %format_cents(amount_cents),
            "settlement recorded"
        );
        Ok(settlement)
    }

    /// Record several settlements at once; either all are stored or none is.
    pub async fn record_settlements(
        &self,
        group_id: GroupId,
        requests: Vec<SettlementRequest>,
    ) -> Result<Vec<Settlement>, AppError> {
        let settlements = requests
            .into_iter()
            .map(|request| new_settlement(group_id, request))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.repo.begin_write().await?;
        for settlement in &settlements {
            tx.save_settlement(settlement).await?;
        }
        tx.commit().await?;

        info!(group_id = %group_id, count = settlements.len(), "settlements recorded");
        Ok(settlements)
    }

    /// Settlements of a group, oldest first.
    pub async fn list_settlements(&self, group_id: GroupId) -> Result<Vec<Settlement>, AppError> {
        Ok(self.repo.list_settlements_for_group(group_id).await?)
    }

    // ========================
    // Balance operations
    // ========================

    /// Net balance of every current member of a group, in join order.
    ///
    /// Totals are recomputed from the stored records on every call, inside a
    /// single read transaction so all sums come from the same snapshot.
    pub async fn get_group_balances(&self, group_id: GroupId) -> Result<Vec<Balance>, AppError> {
        let mut tx = self.repo.begin().await?;
        let members = tx.list_members(group_id).await?;

        let mut balances = Vec::with_capacity(members.len());
        for member in &members {
            let totals = tx.member_totals(member.id, group_id).await?;
            balances.push(Balance::from_totals(member, totals));
        }
        tx.commit().await?;

        debug!(group_id = %group_id, members = balances.len(), "computed balances");
        Ok(balances)
    }

    /// Read every record of a group in one transaction.
    pub async fn get_group_snapshot(&self, group_id: GroupId) -> Result<GroupSnapshot, AppError> {
        let mut tx = self.repo.begin().await?;
        let group = tx
            .find_group(group_id)
            .await?
            .ok_or(AppError::GroupNotFound(group_id))?;
        let members = tx.list_members(group_id).await?;
        let expenses = tx.list_expenses_for_group(group_id).await?;
        let shares = tx.list_shares_for_group(group_id).await?;
        let settlements = tx.list_settlements_for_group(group_id).await?;
        tx.commit().await?;

        Ok(GroupSnapshot {
            group,
            members,
            expenses,
            shares,
            settlements,
        })
    }
}

fn new_settlement(group_id: GroupId, request: SettlementRequest) -> Result<Settlement, AppError> {
    if request.amount_cents <= 0 {
        return Err(AppError::InvalidAmount(
            "Settlement amount must be greater than 0".to_string(),
        ));
    }
    if request.from_user == request.to_user {
        return Err(AppError::InvalidInput(
            "A settlement needs two different users".to_string(),
        ));
    }
    Ok(Settlement::new(
        group_id,
        request.from_user,
        request.to_user,
        request.amount_cents,
    ))
}

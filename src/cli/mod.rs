use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::application::{ExpenseDetails, LedgerService, NewExpense, ParticipantShare};
use crate::domain::{Balance, Cents, GroupId, User, format_cents, parse_cents};

/// Divvy - Shared Expense Ledger
#[derive(Parser)]
#[command(name = "divvy")]
#[command(about = "Split expenses in groups and keep track of who owes whom")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "divvy.db", env = "DIVVY_DATABASE")]
    pub database: String,

    /// Enable verbose output (debug logs on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Group and membership commands
    #[command(subcommand)]
    Group(GroupCommands),

    /// Expense commands
    #[command(subcommand)]
    Expense(ExpenseCommands),

    /// Record a direct payment between two users of a group
    Settle {
        /// Amount paid (e.g., "10.00" or "10")
        amount: String,

        /// Group ID
        #[arg(short, long)]
        group: String,

        /// User paying (ID or email)
        #[arg(long)]
        from: String,

        /// User receiving (ID or email)
        #[arg(long)]
        to: String,
    },

    /// List settlements recorded in a group
    Settlements {
        /// Group ID
        group: String,
    },

    /// Show who owes whom in a group
    Balances {
        /// Group ID
        group: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Export group data to CSV or JSON
    Export {
        /// What to export
        #[arg(value_enum)]
        export_type: ExportType,

        /// Group ID
        #[arg(short, long)]
        group: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// File format (balances: csv or json; expenses: csv; full: json)
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a new user
    Create {
        /// Display name
        name: String,

        /// Email address (must be unique)
        email: String,

        /// Contact number
        #[arg(short, long)]
        contact: Option<String>,
    },

    /// List all users
    List,

    /// Show a user and the groups they belong to
    Show {
        /// User ID or email
        user: String,
    },

    /// Update a user's profile
    Update {
        /// User ID or email
        user: String,

        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// New email address
        #[arg(long)]
        email: Option<String>,

        /// New contact number
        #[arg(long)]
        contact: Option<String>,
    },

    /// Delete a user, their memberships and the expenses they paid
    Delete {
        /// User ID or email
        user: String,
    },
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a new group
    Create {
        /// Group name
        name: String,
    },

    /// List groups
    List {
        /// Only groups this user belongs to (ID or email)
        #[arg(long)]
        user: Option<String>,
    },

    /// Show group details
    Show {
        /// Group ID
        group: String,
    },

    /// Delete a group with its members and expenses
    Delete {
        /// Group ID
        group: String,
    },

    /// Add a user to a group
    AddMember {
        /// Group ID
        group: String,

        /// User ID or email
        user: String,
    },

    /// Remove a user from a group
    RemoveMember {
        /// Group ID
        group: String,

        /// User ID or email
        user: String,
    },

    /// List the members of a group
    Members {
        /// Group ID
        group: String,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an expense paid by one member for some participants
    Add {
        /// Amount paid (e.g., "30.00" or "30")
        amount: String,

        /// Group ID
        #[arg(short, long)]
        group: String,

        /// Member who paid (ID or email)
        #[arg(short, long)]
        paid_by: String,

        /// What the expense was for
        #[arg(short, long)]
        description: String,

        /// Participants, comma separated (IDs or emails).
        /// Defaults to the users named in --split.
        #[arg(long, value_delimiter = ',')]
        participants: Vec<String>,

        /// Custom shares as user=amount, comma separated (equal split if omitted)
        #[arg(long, value_delimiter = ',')]
        split: Vec<String>,
    },

    /// List the expenses of a group, newest first
    List {
        /// Group ID
        group: String,
    },

    /// Show an expense with its shares
    Show {
        /// Expense ID
        id: String,
    },

    /// List the participants of an expense
    Participants {
        /// Expense ID
        id: String,
    },

    /// Delete an expense and its shares
    Delete {
        /// Expense ID
        id: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportType {
    Balances,
    Expenses,
    Full,
}

impl Cli {
    /// Install the log subscriber. `RUST_LOG` wins over `--verbose`.
    pub fn init_logging(&self) {
        let default_level = if self.verbose { "divvy=debug" } else { "divvy=warn" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::User(user_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_user_command(&service, user_cmd).await?;
            }

            Commands::Group(group_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_group_command(&service, group_cmd).await?;
            }

            Commands::Expense(expense_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_expense_command(&service, expense_cmd).await?;
            }

            Commands::Settle {
                amount,
                group,
                from,
                to,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let amount_cents = parse_amount(&amount)?;
                let group_id = parse_id(&group, "group")?;
                let from_user = resolve_user(&service, &from).await?;
                let to_user = resolve_user(&service, &to).await?;

                let settlement = service
                    .record_settlement(group_id, from_user.id, to_user.id, amount_cents)
                    .await?;
                println!(
                    "Recorded settlement: {} {} -> {} ({})",
                    format_cents(settlement.amount_cents),
                    from_user.name,
                    to_user.name,
                    settlement.id
                );
            }

            Commands::Settlements { group } => {
                let service = LedgerService::connect(&self.database).await?;
                run_settlements_command(&service, parse_id(&group, "group")?).await?;
            }

            Commands::Balances { group, format } => {
                let service = LedgerService::connect(&self.database).await?;
                run_balances_command(&service, parse_id(&group, "group")?, format).await?;
            }

            Commands::Export {
                export_type,
                group,
                output,
                format,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                run_export_command(
                    &service,
                    export_type,
                    parse_id(&group, "group")?,
                    output.as_deref(),
                    format,
                )
                .await?;
            }
        }

        Ok(())
    }
}

async fn run_user_command(service: &LedgerService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Create {
            name,
            email,
            contact,
        } => {
            let user = service.create_user(name, email, contact).await?;
            println!("Created user: {} <{}> ({})", user.name, user.email, user.id);
        }

        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<36}  {:<20} {:<30}", "ID", "NAME", "EMAIL");
                println!("{}", "-".repeat(88));
                for user in users {
                    println!("{:<36}  {:<20} {:<30}", user.id, user.name, user.email);
                }
            }
        }

        UserCommands::Show { user } => {
            let user = resolve_user(service, &user).await?;
            let groups = service.get_groups_for_user(user.id).await?;

            println!("User: {}", user.name);
            println!("  ID:       {}", user.id);
            println!("  Email:    {}", user.email);
            if let Some(contact) = &user.contact_no {
                println!("  Contact:  {}", contact);
            }
            println!("  Joined:   {}", user.joined_at.format("%Y-%m-%d %H:%M:%S"));
            println!();
            if groups.is_empty() {
                println!("  Not a member of any group.");
            } else {
                println!("  Groups:");
                for group in groups {
                    println!("    {} ({})", group.name, group.id);
                }
            }
        }

        UserCommands::Update {
            user,
            name,
            email,
            contact,
        } => {
            let current = resolve_user(service, &user).await?;
            let updated = service
                .update_user(
                    current.id,
                    name.unwrap_or(current.name),
                    email.unwrap_or(current.email),
                    contact.or(current.contact_no),
                )
                .await?;
            println!("Updated user: {} <{}>", updated.name, updated.email);
        }

        UserCommands::Delete { user } => {
            let user = resolve_user(service, &user).await?;
            let deleted = service.delete_user(user.id).await?;
            println!("Deleted user: {} <{}>", deleted.name, deleted.email);
        }
    }
    Ok(())
}

async fn run_group_command(service: &LedgerService, cmd: GroupCommands) -> Result<()> {
    match cmd {
        GroupCommands::Create { name } => {
            let group = service.create_group(name).await?;
            println!("Created group: {} ({})", group.name, group.id);
        }

        GroupCommands::List { user } => {
            let groups = match user {
                Some(user) => {
                    let user = resolve_user(service, &user).await?;
                    service.get_groups_for_user(user.id).await?
                }
                None => service.list_groups().await?,
            };

            if groups.is_empty() {
                println!("No groups found.");
            } else {
                println!("{:<36}  {:<30} {:<10}", "ID", "NAME", "CREATED");
                println!("{}", "-".repeat(78));
                for group in groups {
                    println!(
                        "{:<36}  {:<30} {:<10}",
                        group.id,
                        group.name,
                        group.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }

        GroupCommands::Show { group } => {
            let info = service.get_group_info(parse_id(&group, "group")?).await?;

            println!("Group: {}", info.group.name);
            println!("  ID:           {}", info.group.id);
            println!(
                "  Created:      {}",
                info.group.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Expenses:     {}", info.stats.expense_count);
            println!("  Total spent:  {}", format_cents(info.stats.total_spent));
            println!("  Settlements:  {}", info.stats.settlement_count);
            println!();
            println!("  Members ({}):", info.stats.member_count);
            for member in &info.members {
                println!("    {} <{}>", member.name, member.email);
            }
        }

        GroupCommands::Delete { group } => {
            let deleted = service.delete_group(parse_id(&group, "group")?).await?;
            println!("Deleted group: {}", deleted.name);
        }

        GroupCommands::AddMember { group, user } => {
            let user = resolve_user(service, &user).await?;
            let details = service
                .add_member(parse_id(&group, "group")?, user.id)
                .await?;
            println!(
                "Added {} to {} ({} members)",
                user.name,
                details.group.name,
                details.members.len()
            );
        }

        GroupCommands::RemoveMember { group, user } => {
            let user = resolve_user(service, &user).await?;
            service
                .remove_member(parse_id(&group, "group")?, user.id)
                .await?;
            println!("Removed {} from group", user.name);
        }

        GroupCommands::Members { group } => {
            let members = service
                .get_group_members(parse_id(&group, "group")?)
                .await?;
            if members.is_empty() {
                println!("No members yet.");
            } else {
                for member in members {
                    println!("{:<36}  {:<20} {}", member.id, member.name, member.email);
                }
            }
        }
    }
    Ok(())
}

async fn run_expense_command(service: &LedgerService, cmd: ExpenseCommands) -> Result<()> {
    match cmd {
        ExpenseCommands::Add {
            amount,
            group,
            paid_by,
            description,
            participants,
            split,
        } => {
            let amount_cents = parse_amount(&amount)?;
            let group_id = parse_id(&group, "group")?;
            let payer = resolve_user(service, &paid_by).await?;

            let mut custom_shares: HashMap<Uuid, Cents> = HashMap::new();
            let mut split_users = Vec::new();
            for entry in &split {
                let (user, share) = entry.split_once('=').with_context(|| {
                    format!("Invalid split entry '{}'. Use user=amount", entry)
                })?;
                let user = resolve_user(service, user.trim()).await?;
                let share = parse_amount_allow_zero(share)?;
                custom_shares.insert(user.id, share);
                split_users.push(user.id);
            }

            let participant_ids = if participants.is_empty() {
                split_users
            } else {
                let mut ids = Vec::with_capacity(participants.len());
                for participant in &participants {
                    ids.push(resolve_user(service, participant.trim()).await?.id);
                }
                ids
            };

            let details = service
                .create_expense(NewExpense {
                    group_id,
                    paid_by: payer.id,
                    amount_cents,
                    description,
                    participants: participant_ids,
                    custom_shares: (!custom_shares.is_empty()).then_some(custom_shares),
                })
                .await?;

            println!(
                "Recorded expense: {} paid by {} ({})",
                format_cents(details.expense.amount_cents),
                details.paid_by.name,
                details.expense.id
            );
            print_shares(&details.shares);
        }

        ExpenseCommands::List { group } => {
            let expenses = service
                .get_expenses_by_group(parse_id(&group, "group")?)
                .await?;
            if expenses.is_empty() {
                println!("No expenses found.");
            } else {
                println!(
                    "{:<36}  {:<10} {:>10}  {:<16} {}",
                    "ID", "DATE", "AMOUNT", "PAID BY", "DESCRIPTION"
                );
                println!("{}", "-".repeat(100));
                for details in expenses {
                    print_expense_row(&details);
                }
            }
        }

        ExpenseCommands::Show { id } => {
            let details = service.get_expense_by_id(parse_id(&id, "expense")?).await?;
            let expense = &details.expense;

            println!("Expense: {}", expense.description);
            println!("  ID:       {}", expense.id);
            println!("  Group:    {}", expense.group_id);
            println!("  Amount:   {}", format_cents(expense.amount_cents));
            println!("  Paid by:  {} <{}>", details.paid_by.name, details.paid_by.email);
            println!("  Date:     {}", expense.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!();
            println!("  Shares:");
            print_shares(&details.shares);

            let residual = expense.amount_cents - details.shares_total();
            if residual != 0 {
                println!("  Rounding residual: {}", format_cents(residual));
            }
        }

        ExpenseCommands::Participants { id } => {
            let participants = service
                .get_expense_participants(parse_id(&id, "expense")?)
                .await?;
            if participants.is_empty() {
                println!("No participants found.");
            } else {
                print_shares(&participants);
            }
        }

        ExpenseCommands::Delete { id } => {
            let expense_id = parse_id(&id, "expense")?;
            service.delete_expense(expense_id).await?;
            println!("Deleted expense: {}", expense_id);
        }
    }
    Ok(())
}

async fn run_settlements_command(service: &LedgerService, group_id: GroupId) -> Result<()> {
    let settlements = service.list_settlements(group_id).await?;
    if settlements.is_empty() {
        println!("No settlements found.");
        return Ok(());
    }

    // Settlements keep raw ids, so the users may be gone by now
    let mut names: HashMap<Uuid, String> = HashMap::new();
    for settlement in &settlements {
        for id in [settlement.from_user, settlement.to_user] {
            if !names.contains_key(&id) {
                let name = match service.get_user(id).await {
                    Ok(user) => user.name,
                    Err(err) if err.is_not_found() => id.to_string(),
                    Err(err) => return Err(err.into()),
                };
                names.insert(id, name);
            }
        }
    }

    println!("{:<10} {:>10}  {:<20} {:<20}", "DATE", "AMOUNT", "FROM", "TO");
    println!("{}", "-".repeat(64));
    for settlement in &settlements {
        println!(
            "{:<10} {:>10}  {:<20} {:<20}",
            settlement.settled_at.format("%Y-%m-%d"),
            format_cents(settlement.amount_cents),
            names[&settlement.from_user],
            names[&settlement.to_user]
        );
    }
    Ok(())
}

async fn run_balances_command(
    service: &LedgerService,
    group_id: GroupId,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let balances = service.get_group_balances(group_id).await?;
            print_balances_table(&balances);
        }
        OutputFormat::Json => {
            crate::io::Exporter::new(service)
                .export_balances_json(group_id, std::io::stdout())
                .await?;
        }
        OutputFormat::Csv => {
            crate::io::Exporter::new(service)
                .export_balances_csv(group_id, std::io::stdout())
                .await?;
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: ExportType,
    group_id: GroupId,
    output: Option<&str>,
    format: Option<ExportFormat>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let format = resolve_export_format(export_type, format)?;
    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        ExportType::Balances => {
            let count = if format == ExportFormat::Json {
                exporter.export_balances_json(group_id, writer).await?.len()
            } else {
                exporter.export_balances_csv(group_id, writer).await?
            };
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        ExportType::Expenses => {
            let count = exporter.export_expenses_csv(group_id, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} expense shares", count);
            }
        }
        ExportType::Full => {
            let export = exporter.export_full_json(group_id, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported group {}: {} members, {} expenses, {} settlements",
                    export.group.name,
                    export.members.len(),
                    export.expenses.len(),
                    export.settlements.len()
                );
            }
        }
    }

    Ok(())
}

/// Pick the file format for an export, rejecting combinations the exporter
/// cannot write.
fn resolve_export_format(
    export_type: ExportType,
    format: Option<ExportFormat>,
) -> Result<ExportFormat> {
    match (export_type, format) {
        (ExportType::Balances, Some(format)) => Ok(format),
        (ExportType::Balances | ExportType::Expenses, None) => Ok(ExportFormat::Csv),
        (ExportType::Expenses, Some(ExportFormat::Csv)) => Ok(ExportFormat::Csv),
        (ExportType::Full, None | Some(ExportFormat::Json)) => Ok(ExportFormat::Json),
        (ExportType::Expenses, Some(ExportFormat::Json)) => {
            anyhow::bail!("Expenses can only be exported as csv")
        }
        (ExportType::Full, Some(ExportFormat::Csv)) => {
            anyhow::bail!("A full export can only be written as json")
        }
    }
}

fn print_expense_row(details: &ExpenseDetails) {
    println!(
        "{:<36}  {:<10} {:>10}  {:<16} {}",
        details.expense.id,
        details.expense.created_at.format("%Y-%m-%d"),
        format_cents(details.expense.amount_cents),
        details.paid_by.name,
        details.expense.description
    );
}

fn print_shares(shares: &[ParticipantShare]) {
    for participant in shares {
        println!(
            "    {:<20} {:>10}",
            participant.user.name,
            format_cents(participant.share.share_cents)
        );
    }
}

fn print_balances_table(balances: &[Balance]) {
    if balances.is_empty() {
        println!("No members in this group.");
        return;
    }

    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "MEMBER", "PAID", "OWED", "SENT", "RECEIVED", "NET"
    );
    println!("{}", "-".repeat(75));
    for balance in balances {
        println!(
            "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10}",
            balance.user_name,
            format_cents(balance.total_paid),
            format_cents(balance.total_owed),
            format_cents(balance.total_settled_from),
            format_cents(balance.total_settled_to),
            format_cents(balance.net_balance)
        );
    }
    println!();
    for balance in balances {
        match balance.net_balance {
            net if net > 0 => println!("{} is owed {}", balance.user_name, format_cents(net)),
            net if net < 0 => println!("{} owes {}", balance.user_name, format_cents(net.saturating_neg())),
            _ => println!("{} is settled up", balance.user_name),
        }
    }
}

/// Look a user up by ID, falling back to email.
async fn resolve_user(service: &LedgerService, reference: &str) -> Result<User> {
    let user = match Uuid::parse_str(reference) {
        Ok(id) => service.get_user(id).await?,
        Err(_) => service.get_user_by_email(reference).await?,
    };
    Ok(user)
}

fn parse_id(input: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(input.trim())
        .with_context(|| format!("Invalid {} ID format (expected UUID): {}", what, input))
}

fn parse_amount(input: &str) -> Result<Cents> {
    let cents = parse_amount_allow_zero(input)?;
    if cents <= 0 {
        anyhow::bail!("Amount must be greater than 0, got '{}'", input);
    }
    Ok(cents)
}

fn parse_amount_allow_zero(input: &str) -> Result<Cents> {
    parse_cents(input)
        .with_context(|| format!("Invalid amount '{}'. Use '30.00' or '30'", input))
}

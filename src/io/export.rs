use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{
    Balance, Expense, ExpenseShare, Group, GroupId, Settlement, User,
    compute_group_balances, format_cents,
};

/// Everything recorded for one group, plus the balances derived from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub group: Group,
    pub members: Vec<User>,
    pub expenses: Vec<Expense>,
    pub shares: Vec<ExpenseShare>,
    pub settlements: Vec<Settlement>,
    pub balances: Vec<Balance>,
}

/// Exporter for converting group data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the balances of a group to CSV format
    pub async fn export_balances_csv<W: Write>(&self, group_id: GroupId, writer: W) -> Result<usize> {
        let balances = self.service.get_group_balances(group_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "user_id",
            "name",
            "email",
            "total_paid",
            "total_owed",
            "settled_from",
            "settled_to",
            "net_balance",
        ])?;

        for balance in &balances {
            csv_writer.write_record([
                balance.user_id.to_string(),
                balance.user_name.clone(),
                balance.user_email.clone(),
                format_cents(balance.total_paid),
                format_cents(balance.total_owed),
                format_cents(balance.total_settled_from),
                format_cents(balance.total_settled_to),
                format_cents(balance.net_balance),
            ])?;
        }

        csv_writer.flush()?;
        Ok(balances.len())
    }

    /// Export the balances of a group as a JSON array
    pub async fn export_balances_json<W: Write>(
        &self,
        group_id: GroupId,
        mut writer: W,
    ) -> Result<Vec<Balance>> {
        let balances = self.service.get_group_balances(group_id).await?;
        serde_json::to_writer_pretty(&mut writer, &balances)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(balances)
    }

    /// Export the expenses of a group to CSV format, one row per share
    pub async fn export_expenses_csv<W: Write>(&self, group_id: GroupId, writer: W) -> Result<usize> {
        let expenses = self.service.get_expenses_by_group(group_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "expense_id",
            "created_at",
            "description",
            "paid_by",
            "amount",
            "participant",
            "share",
        ])?;

        let mut count = 0;
        for details in &expenses {
            for participant in &details.shares {
                csv_writer.write_record([
                    details.expense.id.to_string(),
                    details.expense.created_at.to_rfc3339(),
                    details.expense.description.clone(),
                    details.paid_by.email.clone(),
                    format_cents(details.expense.amount_cents),
                    participant.user.email.clone(),
                    format_cents(participant.share.share_cents),
                ])?;
                count += 1;
            }
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a full group snapshot as JSON. Balances are derived from the
    /// exported records themselves, so the file is self-consistent.
    pub async fn export_full_json<W: Write>(
        &self,
        group_id: GroupId,
        mut writer: W,
    ) -> Result<GroupExport> {
        let snapshot = self.service.get_group_snapshot(group_id).await?;
        let balances = compute_group_balances(
            &snapshot.members,
            &snapshot.expenses,
            &snapshot.shares,
            &snapshot.settlements,
        );

        let export = GroupExport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            group: snapshot.group,
            members: snapshot.members,
            expenses: snapshot.expenses,
            shares: snapshot.shares,
            settlements: snapshot.settlements,
            balances,
        };

        let json = serde_json::to_string_pretty(&export)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(export)
    }
}

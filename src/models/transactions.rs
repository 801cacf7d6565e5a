use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One immutable ledger row. The engine only ever appends; status flips on
/// pending deposits/withdrawals belong to the external approval workflow.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    /// Non-negative magnitude; the sign of the balance effect is implied by
    /// `kind` (see `engine::balance`).
    pub amount: i64,
    pub status: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: &str,
        kind: TxKind,
        amount: i64,
        status: TxStatus,
        description: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        LedgerEntry {
            id: Uuid::new_v4().hyphenated().to_string(),
            user_id: user_id.to_owned(),
            kind: kind.as_str().to_owned(),
            amount,
            status: status.as_str().to_owned(),
            description,
            created_at,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxKind {
    Deposit,
    Withdrawal,
    Income,
    Commission,
    Bonus,
    Expense,
    AdminAdd,
    AdminDeduct,
}

impl TxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdrawal => "withdrawal",
            TxKind::Income => "income",
            TxKind::Commission => "commission",
            TxKind::Bonus => "bonus",
            TxKind::Expense => "expense",
            TxKind::AdminAdd => "admin_add",
            TxKind::AdminDeduct => "admin_deduct",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(TxKind::Deposit),
            "withdrawal" => Some(TxKind::Withdrawal),
            "income" => Some(TxKind::Income),
            "commission" => Some(TxKind::Commission),
            "bonus" => Some(TxKind::Bonus),
            "expense" => Some(TxKind::Expense),
            "admin_add" => Some(TxKind::AdminAdd),
            "admin_deduct" => Some(TxKind::AdminDeduct),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TxStatus::Pending),
            "success" => Some(TxStatus::Success),
            "failed" => Some(TxStatus::Failed),
            _ => None,
        }
    }
}

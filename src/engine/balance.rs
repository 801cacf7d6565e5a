//! Balance is a projection of the ledger, never a stored column. A pending
//! withdrawal already holds funds; marking it failed releases the hold with
//! no compensating entry.

use chrono::Utc;

use super::{EngineError, RewardEngine};
use crate::models::transactions::{LedgerEntry, TxKind, TxStatus};
use crate::repositories::{BalanceGuard, RewardStore, StoreError, WriteBatch, WriteOp};

/// Signed balance effect of one ledger entry. The Postgres adapter mirrors
/// this rule in SQL; keep the two in sync.
pub fn signed_amount(entry: &LedgerEntry) -> i64 {
    let (Some(kind), Some(status)) = (TxKind::parse(&entry.kind), TxStatus::parse(&entry.status))
    else {
        return 0;
    };

    match (kind, status) {
        (
            TxKind::Deposit | TxKind::Income | TxKind::Commission | TxKind::Bonus | TxKind::AdminAdd,
            TxStatus::Success,
        ) => entry.amount,
        (TxKind::Expense | TxKind::AdminDeduct, TxStatus::Success) => -entry.amount,
        (TxKind::Withdrawal, TxStatus::Pending | TxStatus::Success) => -entry.amount,
        _ => 0,
    }
}

/// Reference projection over a full ledger slice.
pub fn project(entries: &[LedgerEntry]) -> i64 {
    entries.iter().map(signed_amount).sum()
}

impl<S: RewardStore> RewardEngine<S> {
    /// Appends a pending deposit for the approval collaborator to settle.
    pub async fn request_deposit(
        &self,
        user_id: &str,
        amount: i64,
        method: &str,
    ) -> Result<LedgerEntry, EngineError> {
        self.require_user(user_id).await?;

        if amount <= 0 {
            return Err(EngineError::Validation("amount must be positive".into()));
        }

        let entry = LedgerEntry::new(
            user_id,
            TxKind::Deposit,
            amount,
            TxStatus::Pending,
            format!("Deposit via {method}"),
            Utc::now(),
        );

        let mut batch = WriteBatch::new(user_id);
        batch.push(WriteOp::InsertLedgerEntry(entry.clone()));
        self.store().commit(batch).await?;

        Ok(entry)
    }

    /// Appends a pending withdrawal. The pending entry holds the funds
    /// immediately, so a concurrent spend cannot double-use them. The
    /// balance check here is advisory; the batch's funds guard repeats it
    /// under the per-user lock.
    pub async fn request_withdrawal(
        &self,
        user_id: &str,
        amount: i64,
        account: &str,
    ) -> Result<LedgerEntry, EngineError> {
        self.require_user(user_id).await?;

        if amount <= 0 {
            return Err(EngineError::Validation("amount must be positive".into()));
        }

        let balance = self.store().balance(user_id).await?;
        if balance < amount {
            return Err(EngineError::InsufficientBalance);
        }

        let entry = LedgerEntry::new(
            user_id,
            TxKind::Withdrawal,
            amount,
            TxStatus::Pending,
            format!("Withdrawal to {account}"),
            Utc::now(),
        );

        let mut batch = WriteBatch::new(user_id).funded(BalanceGuard {
            user_id: user_id.to_owned(),
            required: amount,
        });
        batch.push(WriteOp::InsertLedgerEntry(entry.clone()));

        match self.store().commit(batch).await {
            Ok(()) => Ok(entry),
            Err(StoreError::Conflict(_)) => Err(EngineError::InsufficientBalance),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(kind: TxKind, status: TxStatus, amount: i64) -> LedgerEntry {
        LedgerEntry::new("u1", kind, amount, status, String::new(), Utc::now())
    }

    #[test]
    fn successful_credits_count_positive() {
        for kind in [
            TxKind::Deposit,
            TxKind::Income,
            TxKind::Commission,
            TxKind::Bonus,
            TxKind::AdminAdd,
        ] {
            assert_eq!(signed_amount(&entry(kind, TxStatus::Success, 700)), 700);
        }
    }

    #[test]
    fn successful_debits_count_negative() {
        for kind in [TxKind::Expense, TxKind::AdminDeduct] {
            assert_eq!(signed_amount(&entry(kind, TxStatus::Success, 700)), -700);
        }
    }

    #[test]
    fn pending_withdrawal_holds_funds() {
        assert_eq!(
            signed_amount(&entry(TxKind::Withdrawal, TxStatus::Pending, 500)),
            -500
        );
        assert_eq!(
            signed_amount(&entry(TxKind::Withdrawal, TxStatus::Success, 500)),
            -500
        );
        assert_eq!(
            signed_amount(&entry(TxKind::Withdrawal, TxStatus::Failed, 500)),
            0
        );
    }

    #[test]
    fn pending_and_failed_entries_are_inert() {
        assert_eq!(signed_amount(&entry(TxKind::Deposit, TxStatus::Pending, 900)), 0);
        assert_eq!(signed_amount(&entry(TxKind::Deposit, TxStatus::Failed, 900)), 0);
        assert_eq!(signed_amount(&entry(TxKind::Income, TxStatus::Failed, 900)), 0);
    }

    #[test]
    fn unknown_kind_or_status_is_ignored() {
        let mut odd = entry(TxKind::Deposit, TxStatus::Success, 100);
        odd.kind = "mystery".to_owned();
        assert_eq!(signed_amount(&odd), 0);
    }

    #[test]
    fn projection_sums_the_whole_ledger() {
        let entries = vec![
            entry(TxKind::Deposit, TxStatus::Success, 10_000),
            entry(TxKind::Income, TxStatus::Success, 500),
            entry(TxKind::Withdrawal, TxStatus::Pending, 2_000),
            entry(TxKind::Expense, TxStatus::Success, 3_000),
            entry(TxKind::Deposit, TxStatus::Failed, 99_999),
        ];
        assert_eq!(project(&entries), 10_000 + 500 - 2_000 - 3_000);
    }
}

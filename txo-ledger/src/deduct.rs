//! FIFO deduction
//!
//! Walks source TXOs strictly in list order and draws from each until the
//! requested amount is covered. The walk does not touch its input: it
//! returns the provenance references plus the new `used_amount` of every
//! TXO it drew from, and the caller applies them.

use crate::{
    error::{Error, Result},
    types::{Amount, Txo, TxoRef},
};

/// New `used_amount` for one source TXO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedAmountUpdate {
    /// Position in the source list
    pub index: usize,
    /// TXO id
    pub id: String,
    /// Value after the deduction
    pub used_amount: Amount,
}

/// Outcome of a successful deduction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduction {
    refs: Vec<TxoRef>,
    updates: Vec<UsedAmountUpdate>,
    spent_prefix: usize,
}

impl Deduction {
    /// References to the drawn TXOs, in walk order
    pub fn refs(&self) -> &[TxoRef] {
        &self.refs
    }

    /// Consume into the reference list
    pub fn into_refs(self) -> Vec<TxoRef> {
        self.refs
    }

    /// Per-TXO `used_amount` updates
    pub fn updates(&self) -> &[UsedAmountUpdate] {
        &self.updates
    }

    /// Number of leading source entries that are exhausted after this deduction.
    ///
    /// Covers every TXO before the last one drawn from, plus that one if it
    /// ended up fully used.
    pub fn spent_prefix(&self) -> usize {
        self.spent_prefix
    }

    /// Write the updates into the source list the deduction was computed from
    pub fn apply(&self, txos: &mut [Txo]) -> Result<()> {
        for update in &self.updates {
            let txo = txos.get_mut(update.index).filter(|t| t.id == update.id).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "deduction does not match source list at {} ({})",
                    update.index, update.id
                ))
            })?;
            txo.used_amount = update.used_amount;
        }
        Ok(())
    }
}

/// Compute which TXOs cover `amount`, oldest first.
///
/// Entries with nothing left are passed over without a reference. A zero
/// amount draws nothing. Fails with [`Error::InsufficientFunds`] when the
/// list runs out first.
pub fn deduct(txos: &[Txo], amount: Amount) -> Result<Deduction> {
    if amount.is_zero() {
        return Ok(Deduction::default());
    }

    let mut need = amount;
    let mut refs = Vec::new();
    let mut updates = Vec::new();

    for (index, txo) in txos.iter().enumerate() {
        let remain = txo.remaining()?;
        if remain.is_zero() {
            continue;
        }

        if need > remain {
            refs.push(TxoRef::new(txo.id.clone(), remain));
            updates.push(UsedAmountUpdate {
                index,
                id: txo.id.clone(),
                used_amount: txo.amount,
            });
            need = need.checked_sub(remain)?;
        } else {
            let used_amount = txo.used_amount.checked_add(need)?;
            refs.push(TxoRef::new(txo.id.clone(), need));
            updates.push(UsedAmountUpdate {
                index,
                id: txo.id.clone(),
                used_amount,
            });

            let spent_prefix = if used_amount == txo.amount { index + 1 } else { index };

            tracing::debug!(
                amount = %amount,
                refs = refs.len(),
                spent_prefix,
                "Deduction complete"
            );

            return Ok(Deduction {
                refs,
                updates,
                spent_prefix,
            });
        }
    }

    Err(Error::InsufficientFunds {
        requested: amount,
        available: amount.checked_sub(need)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txo(id: &str, amount: u64, used: u64) -> Txo {
        let mut txo = Txo::mint(0, "alice", id, "cet", Amount::new(amount), vec![]);
        txo.used_amount = Amount::new(used);
        txo
    }

    fn txo_list() -> Vec<Txo> {
        vec![txo("txo1", 3, 1), txo("txo2", 4, 1), txo("txo3", 4, 3)]
    }

    fn used(txos: &[Txo]) -> Vec<Amount> {
        txos.iter().map(|t| t.used_amount).collect()
    }

    #[test]
    fn test_deduct_within_first() {
        let mut txos = txo_list();
        let deduction = deduct(&txos, Amount::new(1)).unwrap();
        assert_eq!(deduction.refs(), &[TxoRef::new("txo1", Amount::new(1))]);
        assert_eq!(deduction.spent_prefix(), 0);

        deduction.apply(&mut txos).unwrap();
        assert_eq!(used(&txos), vec![Amount::new(2), Amount::new(1), Amount::new(3)]);
    }

    #[test]
    fn test_deduct_exhausts_first() {
        let mut txos = txo_list();
        let deduction = deduct(&txos, Amount::new(2)).unwrap();
        assert_eq!(deduction.refs(), &[TxoRef::new("txo1", Amount::new(2))]);
        assert_eq!(deduction.spent_prefix(), 1);

        deduction.apply(&mut txos).unwrap();
        assert!(txos[0].is_all_used());
    }

    #[test]
    fn test_deduct_spans_two() {
        let mut txos = txo_list();
        let deduction = deduct(&txos, Amount::new(4)).unwrap();
        assert_eq!(
            deduction.refs(),
            &[
                TxoRef::new("txo1", Amount::new(2)),
                TxoRef::new("txo2", Amount::new(2)),
            ]
        );
        assert_eq!(deduction.spent_prefix(), 1);

        deduction.apply(&mut txos).unwrap();
        assert_eq!(used(&txos), vec![Amount::new(3), Amount::new(3), Amount::new(3)]);
    }

    #[test]
    fn test_deduct_everything() {
        let deduction = deduct(&txo_list(), Amount::new(6)).unwrap();
        assert_eq!(deduction.refs().len(), 3);
        assert_eq!(deduction.spent_prefix(), 3);
    }

    #[test]
    fn test_insufficient_funds() {
        let txos = txo_list();
        match deduct(&txos, Amount::new(9)) {
            Err(Error::InsufficientFunds { requested, available }) => {
                assert_eq!(requested, Amount::new(9));
                assert_eq!(available, Amount::new(6));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // input untouched
        assert_eq!(txos, txo_list());
    }

    #[test]
    fn test_insufficient_funds_empty_list() {
        assert!(matches!(
            deduct(&[], Amount::new(1)),
            Err(Error::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_zero_amount_draws_nothing() {
        let deduction = deduct(&txo_list(), Amount::zero()).unwrap();
        assert!(deduction.refs().is_empty());
        assert!(deduction.updates().is_empty());
        assert_eq!(deduction.spent_prefix(), 0);
    }

    #[test]
    fn test_fully_used_entries_are_passed_over() {
        let txos = vec![txo("spent", 5, 5), txo("txo1", 3, 0)];
        let deduction = deduct(&txos, Amount::new(2)).unwrap();

        assert_eq!(deduction.refs(), &[TxoRef::new("txo1", Amount::new(2))]);
        assert_eq!(deduction.updates()[0].index, 1);
        // the spent entry still falls inside the trimmed prefix
        assert_eq!(deduction.spent_prefix(), 1);
    }

    #[test]
    fn test_apply_rejects_mismatched_list() {
        let deduction = deduct(&txo_list(), Amount::new(4)).unwrap();
        let mut other = vec![txo("x", 3, 0)];
        assert!(matches!(
            deduction.apply(&mut other),
            Err(Error::InvariantViolation(_))
        ));
    }
}

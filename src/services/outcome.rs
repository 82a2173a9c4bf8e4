//! Outcome rules and the settlement plan derived from them.
//!
//! A rule only picks winners. What happens to the money is fixed here:
//! winners get their stake back plus an equal share of the losers' stakes,
//! losers forfeit their stake, and a room without winners refunds everyone.

use crate::error::{AppError, AppResult};
use crate::models::{AccountId, FlowKind, RoomId, SettlementSummary, WagerVector};
use crate::repositories::SettlementLeg;
use std::collections::{BTreeSet, HashMap};

/// Deterministic winner selection over decoded wagers.
///
/// Returns positions into `wagers` (which is in bet order). Must be pure:
/// the same input always yields the same winners.
pub trait OutcomeRule: Send + Sync {
    fn winners(&self, wagers: &[WagerVector]) -> Vec<usize>;
}

impl<F> OutcomeRule for F
where
    F: Fn(&[WagerVector]) -> Vec<usize> + Send + Sync,
{
    fn winners(&self, wagers: &[WagerVector]) -> Vec<usize> {
        self(wagers)
    }
}

/// Scores each wager by how many slots agree with the crowd.
///
/// For every slot the most frequent value wins (ties go to the smaller
/// value). Wagers with the highest score win, unless every wager has that
/// score, in which case nobody is separated from the field and the room
/// is refunded.
#[derive(Debug, Default, Clone, Copy)]
pub struct MajorityMatchRule;

impl MajorityMatchRule {
    fn majority(wagers: &[WagerVector]) -> Vec<u8> {
        let slots = wagers.iter().map(|w| w.len()).max().unwrap_or(0);
        (0..slots)
            .map(|slot| {
                let mut counts: HashMap<u8, usize> = HashMap::new();
                for value in wagers.iter().filter_map(|w| w.get(slot)) {
                    *counts.entry(*value).or_default() += 1;
                }
                counts
                    .into_iter()
                    .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then(vb.cmp(va)))
                    .map(|(value, _)| value)
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl OutcomeRule for MajorityMatchRule {
    fn winners(&self, wagers: &[WagerVector]) -> Vec<usize> {
        let majority = Self::majority(wagers);
        let scores: Vec<usize> = wagers
            .iter()
            .map(|w| w.iter().zip(&majority).filter(|(a, b)| a == b).count())
            .collect();

        let Some(top) = scores.iter().copied().max() else {
            return Vec::new();
        };
        if scores.iter().all(|s| *s == top) {
            return Vec::new();
        }
        scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == top)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Never picks a winner; every room settles as a refund
#[derive(Debug, Default, Clone, Copy)]
pub struct RefundAllRule;

impl OutcomeRule for RefundAllRule {
    fn winners(&self, _wagers: &[WagerVector]) -> Vec<usize> {
        Vec::new()
    }
}

/// Ledger legs plus the summary recorded on the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub legs: Vec<SettlementLeg>,
    pub summary: SettlementSummary,
}

/// Turn the winners chosen by a rule into ledger movements.
///
/// `bettors` is in bet order. The forfeited pool is split equally between
/// winners; the remainder goes out one unit at a time in bet order.
pub fn plan_settlement(
    room_id: RoomId,
    bettors: &[AccountId],
    stake: u64,
    winners: &[usize],
    settled_at: i64,
) -> AppResult<SettlementPlan> {
    if let Some(bad) = winners.iter().find(|w| **w >= bettors.len()) {
        return Err(AppError::InvalidState(format!(
            "Outcome rule for room {} picked position {} of {} bets",
            room_id,
            bad,
            bettors.len()
        )));
    }
    let winners: BTreeSet<usize> = winners.iter().copied().collect();
    let pool = stake_total(room_id, stake, bettors.len())?;

    if winners.is_empty() {
        let legs = bettors
            .iter()
            .map(|bettor| SettlementLeg {
                account: bettor.clone(),
                kind: FlowKind::Release,
                amount: stake,
            })
            .collect();
        return Ok(SettlementPlan {
            legs,
            summary: SettlementSummary {
                winners: Vec::new(),
                payouts: Vec::new(),
                pool,
                refunded: true,
                settled_at,
            },
        });
    }

    let forfeited = stake_total(room_id, stake, bettors.len() - winners.len())?;
    let share = forfeited / winners.len() as u64;
    let mut remainder = forfeited % winners.len() as u64;

    let mut legs = Vec::with_capacity(bettors.len() * 2);
    let mut payouts = Vec::with_capacity(winners.len());
    for (position, bettor) in bettors.iter().enumerate() {
        if !winners.contains(&position) {
            legs.push(SettlementLeg {
                account: bettor.clone(),
                kind: FlowKind::Forfeit,
                amount: stake,
            });
            continue;
        }

        let mut amount = share;
        if remainder > 0 {
            amount += 1;
            remainder -= 1;
        }
        legs.push(SettlementLeg {
            account: bettor.clone(),
            kind: FlowKind::Release,
            amount: stake,
        });
        legs.push(SettlementLeg {
            account: bettor.clone(),
            kind: FlowKind::Payout,
            amount,
        });
        payouts.push((bettor.clone(), amount));
    }

    Ok(SettlementPlan {
        legs,
        summary: SettlementSummary {
            winners: payouts.iter().map(|(a, _)| a.clone()).collect(),
            payouts,
            pool,
            refunded: false,
            settled_at,
        },
    })
}

fn stake_total(room_id: RoomId, stake: u64, count: usize) -> AppResult<u64> {
    stake.checked_mul(count as u64).ok_or_else(|| {
        AppError::LedgerInvariantViolation(format!(
            "Pool of room {} overflows: {} stakes of {}",
            room_id, count, stake
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts(n: usize) -> Vec<AccountId> {
        (0..n).map(|i| AccountId::new(format!("acct-{}", i))).collect()
    }

    fn sum(legs: &[SettlementLeg], kind: FlowKind) -> u64 {
        legs.iter().filter(|l| l.kind == kind).map(|l| l.amount).sum()
    }

    #[test]
    fn test_majority_rule_picks_closest_to_crowd() {
        let wagers = vec![vec![1, 2, 3], vec![1, 2, 0], vec![1, 0, 3], vec![2, 2, 3]];
        // majority is [1, 2, 3]
        assert_eq!(MajorityMatchRule.winners(&wagers), vec![0]);
    }

    #[test]
    fn test_majority_rule_without_separation() {
        assert!(MajorityMatchRule.winners(&[]).is_empty());
        assert!(MajorityMatchRule.winners(&[vec![4, 4]]).is_empty());
        // identical wagers all score the same
        assert!(MajorityMatchRule.winners(&[vec![1, 0], vec![1, 0]]).is_empty());
    }

    #[test]
    fn test_majority_tie_goes_to_smaller_value() {
        // slot 0 is tied between 1 and 2, so 1 is the majority
        let wagers = vec![vec![1], vec![2]];
        assert_eq!(MajorityMatchRule.winners(&wagers), vec![0]);
    }

    #[test]
    fn test_closure_rule() {
        let first = |wagers: &[WagerVector]| -> Vec<usize> { wagers.iter().take(1).map(|_| 0).collect() };
        assert_eq!(first.winners(&[vec![9]]), vec![0]);
        assert!(RefundAllRule.winners(&[vec![9]]).is_empty());
    }

    #[test]
    fn test_refund_when_no_winners() {
        let plan = plan_settlement(RoomId(1), &accounts(2), 1, &[], 7).unwrap();
        assert!(plan.summary.refunded);
        assert_eq!(plan.summary.pool, 2);
        assert_eq!(sum(&plan.legs, FlowKind::Release), 2);
        assert_eq!(sum(&plan.legs, FlowKind::Payout), 0);
    }

    #[test]
    fn test_remainder_goes_out_in_bet_order() {
        let bettors = accounts(5);
        // two winners share three forfeited stakes of 5
        let plan = plan_settlement(RoomId(1), &bettors, 5, &[3, 1], 0).unwrap();
        assert_eq!(
            plan.summary.payouts,
            vec![(bettors[1].clone(), 8), (bettors[3].clone(), 7)]
        );
        assert_eq!(sum(&plan.legs, FlowKind::Forfeit), 15);
        // conservation
        assert_eq!(
            sum(&plan.legs, FlowKind::Release) + sum(&plan.legs, FlowKind::Payout),
            plan.summary.pool
        );
    }

    #[test]
    fn test_everyone_wins() {
        let plan = plan_settlement(RoomId(1), &accounts(3), 2, &[0, 1, 2], 0).unwrap();
        assert!(!plan.summary.refunded);
        assert_eq!(sum(&plan.legs, FlowKind::Release), 6);
        assert!(plan.summary.payouts.iter().all(|(_, amount)| *amount == 0));
    }

    #[test]
    fn test_out_of_range_winner() {
        let err = plan_settlement(RoomId(4), &accounts(2), 1, &[2], 0).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_pool_overflow_is_an_error() {
        let stake = u64::MAX / 2 + 1;
        let err = plan_settlement(RoomId(5), &accounts(3), stake, &[0, 1], 0).unwrap_err();
        assert!(matches!(err, AppError::LedgerInvariantViolation(_)));
        assert!(err.is_fatal());

        // refund path sums the whole pool too
        let err = plan_settlement(RoomId(5), &accounts(3), stake, &[], 0).unwrap_err();
        assert!(matches!(err, AppError::LedgerInvariantViolation(_)));
    }

    #[test]
    fn test_largest_fitting_pool() {
        let stake = u64::MAX / 3;
        let plan = plan_settlement(RoomId(6), &accounts(3), stake, &[0], 0).unwrap();
        assert_eq!(plan.summary.pool, u64::MAX);
        assert_eq!(plan.summary.payouts, vec![(AccountId::new("acct-0"), 2 * stake)]);
    }
}

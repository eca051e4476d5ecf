// Eligibility ranking: standings by score, top-N cut
use log::{debug, info};

use crate::chain::BalanceSource;
use crate::raffle_error::Result;
use crate::raffle_state::{FinalCut, ResultStatus, ScoreResult};
use crate::service::RaffleService;
use crate::store::RaffleStore;

/// Which status rows outside the winner count receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankPass {
    /// Standings while the raffle is still open; losers stay `pending`
    Provisional,
    /// The cut made when eligibility is finalized; losers become `not_eligible`
    Final,
}

/// Rank and status computed for one score row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankAssignment {
    pub id: i64,
    pub rank: u32,
    pub status: ResultStatus,
}

/// Rank rows by score descending, ties broken by insertion order (ascending id).
///
/// The result depends only on the (score, id) pairs, never on previous
/// rank or status values, so running it twice yields the same assignment.
pub fn rank_scores(rows: &[ScoreResult], top_n: u32, pass: RankPass) -> Vec<RankAssignment> {
    let mut standings: Vec<&ScoreResult> = rows.iter().collect();
    standings.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));

    let outside = match pass {
        RankPass::Provisional => ResultStatus::Pending,
        RankPass::Final => ResultStatus::NotEligible,
    };

    standings
        .into_iter()
        .enumerate()
        .map(|(position, row)| {
            let rank = u32::try_from(position + 1).unwrap_or(u32::MAX);
            RankAssignment {
                id: row.id,
                rank,
                status: if rank <= top_n {
                    ResultStatus::Eligible
                } else {
                    outside
                },
            }
        })
        .collect()
}

/// Split a final ranking into winners and non-winners
pub fn final_cut(assignments: &[RankAssignment]) -> FinalCut {
    let mut cut = FinalCut::default();
    for assignment in assignments {
        if assignment.status == ResultStatus::Eligible {
            cut.eligible.push(assignment.id);
        } else {
            cut.not_eligible.push(assignment.id);
        }
    }
    cut
}

impl<S: RaffleStore, B: BalanceSource> RaffleService<S, B> {
    /// Provisional ranking pass over an open raffle
    pub async fn compute_ranks(&self, raffle_id: i64) -> Result<Vec<RankAssignment>> {
        let raffle = self.load_raffle(raffle_id).await?;
        raffle.ensure_accepts_scores()?;

        let rows = self.store().scores_by_standing(raffle.id).await?;
        let assignments = rank_scores(&rows, raffle.top_n, RankPass::Provisional);
        self.store().apply_ranks(raffle.id, &assignments).await?;

        debug!(
            "Ranked {} participants of raffle {} (top {})",
            assignments.len(),
            raffle.id,
            raffle.top_n
        );
        Ok(assignments)
    }

    /// Final cut: lock every row of the raffle and mark the top `top_n` as
    /// `eligible`, everyone else `not_eligible`. Entries close for good; the
    /// cut can be repeated only with the same `top_n`.
    pub async fn set_eligibility_for_raffle(&self, raffle_id: i64, top_n: u32) -> Result<FinalCut> {
        self.validate_top_n(top_n)?;
        let cut = self.store().finalize_eligibility(raffle_id, top_n, None).await?;
        info!(
            "Eligibility finalized for raffle {}: {} eligible, {} not eligible",
            raffle_id,
            cut.eligible.len(),
            cut.not_eligible.len()
        );
        Ok(cut)
    }
}

use log::info;
use serde::Serialize;

use crate::chain::BalanceSource;
use crate::raffle_error::Result;
use crate::raffle_instruction::RaffleInstruction;
use crate::raffle_state::{FinalCut, Raffle, ScoreResult};
use crate::score_ledger::ScoreSubmission;
use crate::service::RaffleService;
use crate::store::RaffleStore;
use crate::utils::ton_to_nano;

/// What a processed instruction produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InstructionOutcome {
    Raffle(Raffle),
    ScoreRecorded { inserted: bool },
    ScoreSubmitted(ScoreSubmission),
    Ranked { participants: usize },
    Eligibility(FinalCut),
    Paid(ScoreResult),
    BatchPaid { updated: u64 },
    Failed(ScoreResult),
}

pub struct Processor;

impl Processor {
    pub async fn process<S: RaffleStore, B: BalanceSource>(
        service: &RaffleService<S, B>,
        instruction_data: &[u8],
    ) -> Result<InstructionOutcome> {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::CreateRaffle {
                event_id,
                top_n,
                token_id,
            } => {
                info!("Instruction: Create Raffle");
                let raffle = service.create_raffle(event_id, top_n, token_id).await?;
                Ok(InstructionOutcome::Raffle(raffle))
            }
            RaffleInstruction::DefineOrUpdate {
                event_id,
                top_n,
                prize_pool_ton,
                token_id,
            } => {
                info!("Instruction: Define Or Update");
                let prize_pool = prize_pool_ton.as_deref().map(ton_to_nano).transpose()?;
                let raffle = service
                    .define_or_update(event_id, top_n, prize_pool, token_id)
                    .await?;
                Ok(InstructionOutcome::Raffle(raffle))
            }
            RaffleInstruction::SetPrizePool { raffle_id, amount } => {
                info!("Instruction: Set Prize Pool");
                let raffle = service.set_prize_pool(raffle_id, amount).await?;
                Ok(InstructionOutcome::Raffle(raffle))
            }
            RaffleInstruction::RecordScore {
                raffle_id,
                user_id,
                score,
                wallet_address,
            } => {
                info!("Instruction: Record Score");
                let inserted = service
                    .record_score(raffle_id, user_id, score, &wallet_address)
                    .await?;
                Ok(InstructionOutcome::ScoreRecorded { inserted })
            }
            RaffleInstruction::SubmitScore {
                raffle_id,
                user_id,
                score,
                wallet_address,
            } => {
                info!("Instruction: Submit Score");
                let submission = service
                    .submit_score(raffle_id, user_id, score, &wallet_address)
                    .await?;
                Ok(InstructionOutcome::ScoreSubmitted(submission))
            }
            RaffleInstruction::ComputeRanks { raffle_id } => {
                info!("Instruction: Compute Ranks");
                let assignments = service.compute_ranks(raffle_id).await?;
                Ok(InstructionOutcome::Ranked {
                    participants: assignments.len(),
                })
            }
            RaffleInstruction::SetEligibility { raffle_id, top_n } => {
                info!("Instruction: Set Eligibility");
                let cut = service.set_eligibility_for_raffle(raffle_id, top_n).await?;
                Ok(InstructionOutcome::Eligibility(cut))
            }
            RaffleInstruction::TriggerDistribution { raffle_id } => {
                info!("Instruction: Trigger Distribution");
                let cut = service.trigger_distribution(raffle_id).await?;
                Ok(InstructionOutcome::Eligibility(cut))
            }
            RaffleInstruction::MarkPaid {
                result_id,
                amount,
                tx_hash,
            } => {
                info!("Instruction: Mark Paid");
                let row = service.mark_paid(result_id, amount, &tx_hash).await?;
                Ok(InstructionOutcome::Paid(row))
            }
            RaffleInstruction::MarkManyPaid {
                result_ids,
                amount,
                tx_hash,
            } => {
                info!("Instruction: Mark Many Paid");
                let updated = service.mark_many_paid(&result_ids, amount, &tx_hash).await?;
                Ok(InstructionOutcome::BatchPaid { updated })
            }
            RaffleInstruction::MarkFailed { result_id } => {
                info!("Instruction: Mark Failed");
                let row = service.mark_failed(result_id).await?;
                Ok(InstructionOutcome::Failed(row))
            }
            RaffleInstruction::CompleteRaffle { raffle_id } => {
                info!("Instruction: Complete Raffle");
                let raffle = service.complete_raffle(raffle_id).await?;
                Ok(InstructionOutcome::Raffle(raffle))
            }
        }
    }
}

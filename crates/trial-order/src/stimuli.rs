use crate::config::DesignParams;
use crate::error::AssignmentError;
use crate::schedule::Schedule;
use crate::seeding::{rng_from_seed, step_seed};
use crate::tables::StimulusTable;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Fixation,
    Question,
    Stimulus(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DraftTrial {
    pub onset: f64,
    pub condition: u32,
    pub slot: Slot,
}

/// Shuffled indices into a category's filename list plus a read cursor.
#[derive(Debug, Clone)]
struct StimulusPool {
    order: Vec<usize>,
    cursor: usize,
}

impl StimulusPool {
    fn shuffled(len: usize, seed: u64) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut rng_from_seed(seed));
        Self { order, cursor: 0 }
    }

    fn next(&mut self) -> Option<usize> {
        let idx = self.order.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(idx)
    }

    fn remaining(&self) -> usize {
        self.order.len() - self.cursor
    }
}

/// Fills every category slot with a filename. The opening `boundary_trials`
/// of a run show the category's preparatory clip; later slots drain a pool
/// reshuffled per run, which must be empty when the run ends.
pub(crate) fn assign_stimuli(
    schedule: &Schedule,
    stimuli: &StimulusTable,
    prep: &StimulusTable,
    params: &DesignParams,
    participant: u32,
) -> Result<Vec<Vec<Vec<DraftTrial>>>, AssignmentError> {
    let mut counter = params.stimulus_seed_base;
    let mut sessions = Vec::with_capacity(schedule.sessions.len());
    for (session_i, session) in schedule.sessions.iter().enumerate() {
        let mut runs = Vec::with_capacity(session.len());
        for (run_i, run) in session.iter().enumerate() {
            let seed = step_seed(participant, counter);
            let mut pools: BTreeMap<u32, StimulusPool> = params
                .category_ids()
                .map(|id| (id, StimulusPool::shuffled(stimuli.files(id).len(), seed)))
                .collect();
            counter += 1;

            let mut drafts = Vec::with_capacity(run.len());
            for (trial_i, trial) in run.iter().enumerate() {
                let slot = if trial.condition == params.fixation_id {
                    Slot::Fixation
                } else if trial.condition == params.question_id {
                    if trial_i == 0 {
                        Slot::Fixation
                    } else {
                        Slot::Question
                    }
                } else if trial_i < params.boundary_trials {
                    let file = prep.files(trial.condition).first().ok_or_else(|| {
                        AssignmentError::input_shape(format!(
                            "no preparatory stimulus for category {}",
                            trial.condition
                        ))
                    })?;
                    Slot::Stimulus(file.clone())
                } else {
                    let overdraw = || AssignmentError::StimulusOverdraw {
                        participant,
                        session: session_i + 1,
                        run: run_i + 1,
                        category: trial.condition,
                    };
                    let idx = pools
                        .get_mut(&trial.condition)
                        .and_then(|pool| pool.next())
                        .ok_or_else(overdraw)?;
                    Slot::Stimulus(stimuli.files(trial.condition)[idx].clone())
                };
                drafts.push(DraftTrial {
                    onset: trial.onset,
                    condition: trial.condition,
                    slot,
                });
            }

            for (category, pool) in pools.iter() {
                if pool.remaining() != 0 {
                    return Err(AssignmentError::StimulusPoolNotDrained {
                        participant,
                        session: session_i + 1,
                        run: run_i + 1,
                        category: *category,
                        remaining: pool.remaining(),
                    });
                }
            }
            runs.push(drafts);
        }
        sessions.push(runs);
    }
    Ok(sessions)
}

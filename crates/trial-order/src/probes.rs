use crate::config::DesignParams;
use crate::error::AssignmentError;
use crate::seeding::{foil_verb_seed, rng_from_seed, step_seed};
use crate::stimuli::{DraftTrial, Slot};
use crate::trial::{Session, Trial, TrialKind};
use crate::verbs::VerbBook;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

type VerbPair = (String, String);

/// Pairs drawn near run edges. The opening trials of a run repeat the closing
/// trials of the run before it (and the first run's opening repeats the last
/// run's closing), so a question there must show the same pair again.
#[derive(Debug, Default)]
struct BoundaryCache {
    initial_three_first_run: BTreeMap<u32, VerbPair>,
    final_three: BTreeMap<usize, BTreeMap<u32, VerbPair>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Previous {
    Nothing,
    Fixation,
    Question,
    Stimulus(u32),
}

#[derive(Debug, Clone, Copy)]
struct Position {
    session: usize,
    run: usize,
    trial: usize,
    run_len: usize,
}

pub(crate) fn assign_probes(
    drafts: Vec<Vec<Vec<DraftTrial>>>,
    verbs: &mut VerbBook,
    params: &DesignParams,
    participant: u32,
) -> Result<Vec<Session>, AssignmentError> {
    let mut step = params.verb_seed_base;
    let mut previous = Previous::Nothing;
    let mut sessions = Vec::with_capacity(drafts.len());

    for (session_i, session) in drafts.into_iter().enumerate() {
        let mut cache = BoundaryCache::default();
        let mut runs = Vec::with_capacity(session.len());
        for (run_i, run) in session.into_iter().enumerate() {
            let run_len = run.len();
            let mut trials = Vec::with_capacity(run_len);
            for (trial_i, draft) in run.into_iter().enumerate() {
                let pos = Position {
                    session: session_i,
                    run: run_i,
                    trial: trial_i,
                    run_len,
                };
                let kind = match draft.slot {
                    Slot::Fixation => TrialKind::Fixation,
                    Slot::Stimulus(filename) => TrialKind::Stimulus { filename },
                    Slot::Question => match previous {
                        Previous::Stimulus(category) => {
                            let mut order_rng = rng_from_seed(foil_verb_seed(participant, step));
                            let (correct, foil) = resolve_pair(
                                pos,
                                category,
                                &mut cache,
                                verbs,
                                params,
                                participant,
                                step,
                                &mut order_rng,
                            )?;
                            let answer: usize = order_rng.gen_range(0..2);
                            let probe = if answer == 0 {
                                [correct, foil]
                            } else {
                                [foil, correct]
                            };
                            TrialKind::Question { probe, answer }
                        }
                        other => {
                            warn!(
                                participant,
                                session = session_i + 1,
                                run = run_i + 1,
                                trial = trial_i + 1,
                                previous = ?other,
                                "question does not follow a stimulus, switching to fixation"
                            );
                            TrialKind::Fixation
                        }
                    },
                };
                previous = match &kind {
                    TrialKind::Fixation => Previous::Fixation,
                    TrialKind::Question { .. } => Previous::Question,
                    TrialKind::Stimulus { .. } => Previous::Stimulus(draft.condition),
                };
                trials.push(Trial {
                    onset: draft.onset,
                    condition: draft.condition,
                    kind,
                });
                step += 1;
            }
            runs.push(trials);
        }
        sessions.push(runs);
    }
    Ok(sessions)
}

#[allow(clippy::too_many_arguments)]
fn resolve_pair<R: Rng>(
    pos: Position,
    category: u32,
    cache: &mut BoundaryCache,
    verbs: &mut VerbBook,
    params: &DesignParams,
    participant: u32,
    step: u64,
    foil_rng: &mut R,
) -> Result<VerbPair, AssignmentError> {
    let boundary = params.boundary_trials;
    let in_opening = pos.trial < boundary;
    let in_closing = pos.trial + boundary >= pos.run_len;
    let miss = || AssignmentError::BoundaryCacheMiss {
        participant,
        session: pos.session + 1,
        run: pos.run + 1,
        trial: pos.trial + 1,
        category,
    };

    if pos.run > 0 && in_opening {
        let pair = cache
            .final_three
            .get(&(pos.run - 1))
            .and_then(|by_category| by_category.get(&category))
            .cloned()
            .ok_or_else(miss)?;
        info!(
            participant,
            session = pos.session + 1,
            run = pos.run + 1,
            trial = pos.trial + 1,
            category,
            "question in opening trials reuses pair from previous run"
        );
        return Ok(pair);
    }
    if pos.run + 1 == params.runs_per_session && in_closing {
        let pair = cache
            .initial_three_first_run
            .get(&category)
            .cloned()
            .ok_or_else(miss)?;
        info!(
            participant,
            session = pos.session + 1,
            run = pos.run + 1,
            trial = pos.trial + 1,
            category,
            "question in closing trials of last run reuses pair from first run"
        );
        return Ok(pair);
    }

    let pair = draw_pair(pos, category, verbs, params, participant, step, foil_rng)?;
    if pos.run == 0 && in_opening {
        cache
            .initial_three_first_run
            .insert(category, pair.clone());
    } else if in_closing {
        cache
            .final_three
            .entry(pos.run)
            .or_default()
            .insert(category, pair.clone());
    }
    Ok(pair)
}

fn draw_pair<R: Rng>(
    pos: Position,
    category: u32,
    verbs: &mut VerbBook,
    params: &DesignParams,
    participant: u32,
    step: u64,
    foil_rng: &mut R,
) -> Result<VerbPair, AssignmentError> {
    let mut rng = rng_from_seed(step_seed(participant, step));
    let correct = verbs
        .pool_mut(category)
        .and_then(|pool| pool.draw(&mut rng))
        .ok_or(AssignmentError::VerbPoolExhausted {
            participant,
            category,
        })?;

    let foil_category =
        pick_foil_category(verbs, category, pos.session, params, participant, &mut rng)?;
    let foil_pool = verbs
        .pool_mut(foil_category)
        .ok_or(AssignmentError::VerbPoolExhausted {
            participant,
            category: foil_category,
        })?;
    foil_pool.mark_foil();
    let foil = foil_pool
        .draw(foil_rng)
        .ok_or(AssignmentError::VerbPoolExhausted {
            participant,
            category: foil_category,
        })?;

    debug!(
        participant,
        session = pos.session + 1,
        run = pos.run + 1,
        trial = pos.trial + 1,
        category,
        foil_category,
        correct = %correct,
        foil = %foil,
        "assigned question probe"
    );
    Ok((correct, foil))
}

/// Uniform draws over all categories until one is a legal foil. A category
/// may serve as foil once per session, never for itself, and confusable
/// categories never foil each other.
fn pick_foil_category<R: Rng>(
    verbs: &VerbBook,
    category: u32,
    session_index: usize,
    params: &DesignParams,
    participant: u32,
    rng: &mut R,
) -> Result<u32, AssignmentError> {
    let ids = verbs.category_ids();
    let correct_confusable = verbs.is_confusable(category, &params.confusable);
    let eligible = |id: u32| -> bool {
        if id == category {
            return false;
        }
        match verbs.pool(id) {
            Some(pool) if pool.used_as_foil() <= session_index && !pool.is_drained() => {
                !(correct_confusable && verbs.is_confusable(id, &params.confusable))
            }
            _ => false,
        }
    };

    if !ids.iter().any(|&id| eligible(id)) {
        return Err(AssignmentError::FoilExhausted {
            participant,
            category,
            attempts: 0,
        });
    }
    for _ in 0..params.max_foil_attempts {
        let id = ids[rng.gen_range(0..ids.len())];
        if eligible(id) {
            return Ok(id);
        }
    }
    Err(AssignmentError::FoilExhausted {
        participant,
        category,
        attempts: params.max_foil_attempts,
    })
}

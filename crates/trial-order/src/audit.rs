use crate::config::DesignParams;
use crate::error::AssignmentError;
use crate::trial::{Session, Trial};
use crate::verbs::VerbBook;
use std::collections::{BTreeMap, BTreeSet};

/// Questions inside a run's opening boundary repeat an earlier question and
/// are not counted.
pub fn counted_questions<'a>(
    session: &'a Session,
    params: &DesignParams,
) -> impl Iterator<Item = &'a Trial> + 'a {
    let boundary = params.boundary_trials;
    session
        .iter()
        .flat_map(move |run| run.iter().skip(boundary))
        .filter(|t| t.is_question())
}

pub fn audit_questions(
    sessions: &[Session],
    verbs: &VerbBook,
    params: &DesignParams,
    participant: u32,
) -> Result<(), AssignmentError> {
    let mut all_verbs: BTreeSet<&str> = BTreeSet::new();
    let mut verb_slots = 0usize;

    for (session_i, session) in sessions.iter().enumerate() {
        let questions: Vec<&Trial> = counted_questions(session, params).collect();
        if questions.len() != params.questions_per_session {
            return Err(AssignmentError::invariant(
                participant,
                format!(
                    "session {} has {} question trials, expected {}",
                    session_i + 1,
                    questions.len(),
                    params.questions_per_session
                ),
            ));
        }

        let mut pairs: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut foils_by_category: BTreeMap<u32, usize> = BTreeMap::new();
        for trial in questions {
            let (correct, foil) = trial.verb_pair().ok_or_else(|| {
                AssignmentError::invariant(participant, "question trial without a valid probe")
            })?;
            if !pairs.insert((correct, foil)) {
                return Err(AssignmentError::invariant(
                    participant,
                    format!(
                        "session {} repeats probe pair ({}, {})",
                        session_i + 1,
                        correct,
                        foil
                    ),
                ));
            }
            let foil_category = verbs.category_of_verb(foil).ok_or_else(|| {
                AssignmentError::invariant(participant, format!("unknown foil verb '{}'", foil))
            })?;
            *foils_by_category.entry(foil_category).or_insert(0) += 1;
            for verb in [correct, foil] {
                verb_slots += 1;
                if !all_verbs.insert(verb) {
                    return Err(AssignmentError::invariant(
                        participant,
                        format!("verb '{}' used more than once", verb),
                    ));
                }
            }
        }

        for category in verbs.category_ids() {
            let used = foils_by_category.get(&category).copied().unwrap_or(0);
            if used != 1 {
                return Err(AssignmentError::invariant(
                    participant,
                    format!(
                        "category {} served as foil {} times in session {}, expected 1",
                        category,
                        used,
                        session_i + 1
                    ),
                ));
            }
        }
    }

    let expected = params.categories as usize * params.verbs_per_category;
    if verb_slots != expected {
        return Err(AssignmentError::invariant(
            participant,
            format!("{} verbs used across sessions, expected {}", verb_slots, expected),
        ));
    }
    Ok(())
}

pub fn audit_pools(
    verbs: &VerbBook,
    params: &DesignParams,
    participant: u32,
) -> Result<(), AssignmentError> {
    for pool in verbs.pools() {
        if !pool.is_drained() {
            return Err(AssignmentError::invariant(
                participant,
                format!(
                    "category {} ({}) still holds {} verbs",
                    pool.category,
                    pool.name,
                    pool.remaining_len()
                ),
            ));
        }
        if pool.used_as_foil() != params.sessions {
            return Err(AssignmentError::invariant(
                participant,
                format!(
                    "category {} ({}) served as foil {} times, expected {}",
                    pool.category,
                    pool.name,
                    pool.used_as_foil(),
                    params.sessions
                ),
            ));
        }
    }
    Ok(())
}

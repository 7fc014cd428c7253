use crate::config::DesignParams;
use crate::error::AssignmentError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTrial {
    pub onset: f64,
    pub condition: u32,
}

/// Timing and condition labels merged and split into sessions of runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub sessions: Vec<Vec<Vec<ScheduledTrial>>>,
}

impl Schedule {
    pub fn run_len(&self) -> usize {
        self.sessions
            .first()
            .and_then(|s| s.first())
            .map(|r| r.len())
            .unwrap_or(0)
    }

    pub fn count_condition(&self, session: usize, condition: u32) -> usize {
        self.sessions
            .get(session)
            .map(|runs| {
                runs.iter()
                    .flatten()
                    .filter(|t| t.condition == condition)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// `sequence` holds zero-based labels as written by the sequence optimiser;
/// `condition_offset` maps them onto category and reserved ids.
pub fn merge_schedule(
    timing: &[Vec<f64>],
    sequence: &[Vec<i64>],
    params: &DesignParams,
) -> Result<Schedule, AssignmentError> {
    if timing.len() != sequence.len() {
        return Err(AssignmentError::input_shape(format!(
            "timing has {} runs but sequence has {}",
            timing.len(),
            sequence.len()
        )));
    }
    if timing.len() != params.total_runs() {
        return Err(AssignmentError::input_shape(format!(
            "expected {} runs ({} sessions x {}), got {}",
            params.total_runs(),
            params.sessions,
            params.runs_per_session,
            timing.len()
        )));
    }

    let mut runs = Vec::with_capacity(timing.len());
    for (run_i, (run_timing, run_sequence)) in timing.iter().zip(sequence.iter()).enumerate() {
        if run_timing.len() != run_sequence.len() {
            return Err(AssignmentError::input_shape(format!(
                "run {}: {} onsets but {} conditions",
                run_i + 1,
                run_timing.len(),
                run_sequence.len()
            )));
        }
        if !params.run_lengths.contains(&run_timing.len()) {
            return Err(AssignmentError::input_shape(format!(
                "run {}: {} trials, expected one of {:?}",
                run_i + 1,
                run_timing.len(),
                params.run_lengths
            )));
        }
        let mut run = Vec::with_capacity(run_timing.len());
        for (trial_i, (&onset, &label)) in run_timing.iter().zip(run_sequence.iter()).enumerate() {
            let condition = label + i64::from(params.condition_offset);
            let valid = u32::try_from(condition).ok().filter(|&c| {
                params.is_category(c) || c == params.fixation_id || c == params.question_id
            });
            let condition = valid.ok_or_else(|| {
                AssignmentError::input_shape(format!(
                    "run {} trial {}: label {} maps to unknown condition {}",
                    run_i + 1,
                    trial_i + 1,
                    label,
                    condition
                ))
            })?;
            run.push(ScheduledTrial { onset, condition });
        }
        runs.push(run);
    }

    let first_len = runs
        .first()
        .map(|r| r.len())
        .ok_or_else(|| AssignmentError::input_shape("design has no runs"))?;
    if let Some(pos) = runs.iter().position(|r| r.len() != first_len) {
        return Err(AssignmentError::input_shape(format!(
            "run {} has {} trials but run 1 has {}",
            pos + 1,
            runs[pos].len(),
            first_len
        )));
    }
    if first_len < 2 * params.boundary_trials {
        return Err(AssignmentError::input_shape(format!(
            "runs of {} trials cannot hold {} opening and {} closing boundary trials",
            first_len, params.boundary_trials, params.boundary_trials
        )));
    }

    let mut sessions = Vec::with_capacity(params.sessions);
    let mut iter = runs.into_iter();
    for _ in 0..params.sessions {
        sessions.push(iter.by_ref().take(params.runs_per_session).collect());
    }
    Ok(Schedule { sessions })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DesignParams {
        DesignParams {
            sessions: 2,
            runs_per_session: 2,
            run_lengths: vec![8],
            boundary_trials: 2,
            ..DesignParams::default()
        }
    }

    fn runs(n: usize, len: usize, label: i64) -> (Vec<Vec<f64>>, Vec<Vec<i64>>) {
        let timing = (0..n)
            .map(|_| (0..len).map(|i| i as f64 * 4.0).collect())
            .collect();
        let sequence = (0..n).map(|_| vec![label; len]).collect();
        (timing, sequence)
    }

    #[test]
    fn merge_splits_sessions_and_offsets_labels() {
        let (timing, mut sequence) = runs(4, 8, 0);
        sequence[3][5] = 18;
        sequence[3][6] = 19;
        let schedule = merge_schedule(&timing, &sequence, &params()).expect("schedule");
        assert_eq!(schedule.sessions.len(), 2);
        assert_eq!(schedule.sessions[1].len(), 2);
        assert_eq!(schedule.run_len(), 8);
        assert_eq!(schedule.sessions[0][0][2].condition, 1);
        assert_eq!(schedule.sessions[0][0][2].onset, 8.0);
        assert_eq!(schedule.sessions[1][1][5].condition, 19);
        assert_eq!(schedule.count_condition(1, 20), 1);
        assert_eq!(schedule.count_condition(0, 20), 0);
    }

    #[test]
    fn run_count_mismatch_is_rejected() {
        let (timing, sequence) = runs(3, 8, 0);
        let err = merge_schedule(&timing, &sequence, &params()).expect_err("3 runs");
        assert!(err.to_string().contains("expected 4 runs"), "{}", err);
    }

    #[test]
    fn timing_sequence_shape_mismatch_is_rejected() {
        let (timing, mut sequence) = runs(4, 8, 0);
        sequence[2].pop();
        let err = merge_schedule(&timing, &sequence, &params()).expect_err("ragged");
        assert!(err.to_string().contains("run 3: 8 onsets but 7"), "{}", err);
    }

    #[test]
    fn unexpected_run_length_is_rejected() {
        let (timing, sequence) = runs(4, 9, 0);
        let err = merge_schedule(&timing, &sequence, &params()).expect_err("length");
        assert!(err.to_string().contains("expected one of [8]"), "{}", err);
    }

    #[test]
    fn unknown_labels_are_rejected() {
        let (timing, mut sequence) = runs(4, 8, 0);
        sequence[0][3] = 20;
        let err = merge_schedule(&timing, &sequence, &params()).expect_err("label");
        assert!(err.to_string().contains("unknown condition 21"), "{}", err);
        sequence[0][3] = -1;
        let err = merge_schedule(&timing, &sequence, &params()).expect_err("label");
        assert!(err.to_string().contains("unknown condition 0"), "{}", err);
    }

    #[test]
    fn empty_design_is_an_input_error() {
        let p = DesignParams {
            sessions: 0,
            ..params()
        };
        let err = merge_schedule(&[], &[], &p).expect_err("no runs");
        assert_eq!(err.code(), "input_shape");
        assert!(err.to_string().contains("no runs"), "{}", err);
    }

    #[test]
    fn both_default_run_lengths_are_accepted() {
        let p = DesignParams::default();
        for len in [103, 124] {
            let (timing, sequence) = runs(8, len, 18);
            let schedule = merge_schedule(&timing, &sequence, &p).expect("schedule");
            assert_eq!(schedule.run_len(), len);
            assert_eq!(schedule.count_condition(0, p.fixation_id), 4 * len);
        }
        let (mut timing, mut sequence) = runs(8, 124, 18);
        timing[5].truncate(103);
        sequence[5].truncate(103);
        let err = merge_schedule(&timing, &sequence, &p).expect_err("mixed lengths");
        assert!(err.to_string().contains("run 6 has 103 trials but run 1 has 124"), "{}", err);
    }
}

pub mod audit;
pub mod config;
pub mod error;
pub mod output;
mod probes;
pub mod schedule;
pub mod seeding;
mod stimuli;
pub mod tables;
pub mod trial;
pub mod verbs;

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub use config::{DesignConfig, DesignParams, LoadedDesign};
pub use error::AssignmentError;
pub use output::WrittenRun;
pub use trial::{Run, Session, Trial, TrialKind};
pub use verbs::{VerbBook, VerbPool};

use audit::{audit_pools, audit_questions, counted_questions};
use schedule::merge_schedule;
use seeding::step_seed;
use tables::{parse_stimulus_table, parse_verb_table, StimulusTable};

pub const TEST_PARTICIPANT: u32 = 99;

/// Everything the assembler reads, already parsed.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub stimuli: StimulusTable,
    pub prep: StimulusTable,
    pub verbs: VerbBook,
    pub timing: Vec<Vec<f64>>,
    pub sequence: Vec<Vec<i64>>,
}

#[derive(Debug, Clone)]
pub struct TrialOrder {
    pub participant: u32,
    pub sessions: Vec<Session>,
    /// Pools after assignment; all drained when the order passed its audit.
    pub verbs: VerbBook,
}

#[derive(Debug)]
pub struct GenerateResult {
    pub participant: u32,
    pub output_dir: PathBuf,
    pub runs: Vec<WrittenRun>,
    pub questions_per_session: Vec<usize>,
    pub demoted_questions: usize,
}

#[derive(Debug, Clone)]
pub struct DesignSummary {
    pub participant: u32,
    pub categories: u32,
    pub stimuli_per_category: usize,
    pub verbs_per_category: usize,
    pub sessions: usize,
    pub runs_per_session: usize,
    pub run_len: usize,
    pub question_slots: Vec<usize>,
    pub fixation_slots: Vec<usize>,
    pub first_stimulus_seed: u64,
    pub first_verb_seed: u64,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct VerifyResult {
    pub participant: u32,
    pub runs_checked: usize,
    pub questions_per_session: Vec<usize>,
    pub distinct_verbs: usize,
}

/// Builds and audits the complete trial order for one participant without
/// touching the filesystem.
pub fn assemble(
    participant: u32,
    params: &DesignParams,
    inputs: &Inputs,
) -> Result<TrialOrder, AssignmentError> {
    let schedule = merge_schedule(&inputs.timing, &inputs.sequence, params)?;
    let drafts =
        stimuli::assign_stimuli(&schedule, &inputs.stimuli, &inputs.prep, params, participant)?;
    let mut verbs = inputs.verbs.clone();
    let sessions = probes::assign_probes(drafts, &mut verbs, params, participant)?;
    audit_questions(&sessions, &verbs, params, participant)?;
    audit_pools(&verbs, params, participant)?;
    Ok(TrialOrder {
        participant,
        sessions,
        verbs,
    })
}

pub fn load_inputs(design: &LoadedDesign, participant: u32) -> Result<Inputs> {
    let params = &design.config.design;
    let paths = &design.config.inputs;
    let stimuli = parse_stimulus_table(
        &read_text(&design.resolve(&paths.stimuli))?,
        params,
        params.stimuli_per_category,
        "stimuli",
    )?;
    let prep = parse_stimulus_table(
        &read_text(&design.resolve(&paths.prep_stimuli))?,
        params,
        1,
        "prep_stimuli",
    )?;
    let verbs = parse_verb_table(&read_text(&design.resolve(&paths.verbs))?, params)?;
    let timing: Vec<Vec<f64>> =
        read_json(&design.participant_path(&paths.timing, participant))?;
    let sequence: Vec<Vec<i64>> =
        read_json(&design.participant_path(&paths.sequence, participant))?;
    Ok(Inputs {
        stimuli,
        prep,
        verbs,
        timing,
        sequence,
    })
}

pub fn generate(
    config_path: &Path,
    participant: u32,
    set_bindings: &BTreeMap<String, Value>,
) -> Result<GenerateResult> {
    let design = config::load_design(config_path, set_bindings)?;
    let params = &design.config.design;
    let inputs = load_inputs(&design, participant)?;
    let order = assemble(participant, params, &inputs)?;

    let questions_per_session = order
        .sessions
        .iter()
        .map(|s| counted_questions(s, params).count())
        .collect();
    let scheduled_questions = inputs
        .sequence
        .iter()
        .flatten()
        .filter(|&&label| label + i64::from(params.condition_offset) == i64::from(params.question_id))
        .count();
    let placed_questions = order
        .sessions
        .iter()
        .flatten()
        .flatten()
        .filter(|t| t.is_question())
        .count();

    let output_dir = design.output_dir();
    let runs = output::write_trial_order(&order, params, &output_dir)?;
    info!(
        participant,
        runs = runs.len(),
        output_dir = %output_dir.display(),
        "finished creating trial order"
    );
    Ok(GenerateResult {
        participant,
        output_dir,
        runs,
        questions_per_session,
        demoted_questions: scheduled_questions.saturating_sub(placed_questions),
    })
}

pub fn describe(
    config_path: &Path,
    participant: u32,
    set_bindings: &BTreeMap<String, Value>,
) -> Result<DesignSummary> {
    let design = config::load_design(config_path, set_bindings)?;
    let params = &design.config.design;
    let inputs = load_inputs(&design, participant)?;
    let schedule = merge_schedule(&inputs.timing, &inputs.sequence, params)?;
    let sessions = 0..params.sessions;
    Ok(DesignSummary {
        participant,
        categories: params.categories,
        stimuli_per_category: params.stimuli_per_category,
        verbs_per_category: params.verbs_per_category,
        sessions: params.sessions,
        runs_per_session: params.runs_per_session,
        run_len: schedule.run_len(),
        question_slots: sessions
            .clone()
            .map(|s| schedule.count_condition(s, params.question_id))
            .collect(),
        fixation_slots: sessions
            .map(|s| schedule.count_condition(s, params.fixation_id))
            .collect(),
        first_stimulus_seed: step_seed(participant, params.stimulus_seed_base),
        first_verb_seed: step_seed(participant, params.verb_seed_base),
        output_dir: design.output_dir(),
    })
}

/// Re-reads a participant's written run files and re-runs the question audit
/// on them.
pub fn verify(
    config_path: &Path,
    participant: u32,
    set_bindings: &BTreeMap<String, Value>,
) -> Result<VerifyResult> {
    let design = config::load_design(config_path, set_bindings)?;
    let params = &design.config.design;
    let verbs = parse_verb_table(
        &read_text(&design.resolve(&design.config.inputs.verbs))?,
        params,
    )?;
    let output_dir = design.output_dir();

    let mut sessions: Vec<Session> = Vec::with_capacity(params.sessions);
    let mut run_len = None;
    for session in 1..=params.sessions {
        let mut runs = Vec::with_capacity(params.runs_per_session);
        for run in 1..=params.runs_per_session {
            let path = output::run_file_path(&output_dir, participant, session, run);
            let record = output::read_run_record(&path)?;
            if (record.participant, record.session, record.run) != (participant, session, run) {
                return Err(anyhow!(
                    "{} holds participant {} session {} run {}",
                    path.display(),
                    record.participant,
                    record.session,
                    record.run
                ));
            }
            if !params.run_lengths.contains(&record.trials.len()) {
                return Err(anyhow!(
                    "{} has {} trials, expected one of {:?}",
                    path.display(),
                    record.trials.len(),
                    params.run_lengths
                ));
            }
            let len = *run_len.get_or_insert(record.trials.len());
            if record.trials.len() != len {
                return Err(anyhow!(
                    "{} has {} trials, earlier runs have {}",
                    path.display(),
                    record.trials.len(),
                    len
                ));
            }
            runs.push(record.trials);
        }
        sessions.push(runs);
    }

    audit_questions(&sessions, &verbs, params, participant)?;
    let questions_per_session: Vec<usize> = sessions
        .iter()
        .map(|s| counted_questions(s, params).count())
        .collect();
    let distinct_verbs: BTreeSet<&str> = sessions
        .iter()
        .flat_map(|s| counted_questions(s, params))
        .filter_map(|t| t.verb_pair())
        .flat_map(|(correct, foil)| [correct, foil])
        .collect();
    Ok(VerifyResult {
        participant,
        runs_checked: sessions.iter().map(|s| s.len()).sum(),
        distinct_verbs: distinct_verbs.len(),
        questions_per_session,
    })
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Err(anyhow!(
            "init file already exists (use --force): {}",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        output::ensure_dir(parent)?;
    }
    output::atomic_write_bytes(path, config::DESIGN_TEMPLATE.as_bytes())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = read_text(path)?;
    serde_json::from_str(&data).map_err(|e| anyhow!("failed to parse {}: {}", path.display(), e))
}

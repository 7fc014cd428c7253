use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "trial-order", version, about = "Trial-order assembler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ParticipantArgs {
    /// Participant id; defaults to the test participant.
    participant: Option<u32>,
    #[arg(long, default_value = "design.yaml")]
    config: PathBuf,
    #[arg(long = "set")]
    set_values: Vec<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    Generate(ParticipantArgs),
    Describe(ParticipantArgs),
    Verify(ParticipantArgs),
    Init {
        #[arg(long, default_value = "design.yaml")]
        config: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                let code = err
                    .downcast_ref::<trial_order::AssignmentError>()
                    .map(|e| e.code())
                    .unwrap_or("command_failed");
                emit_json(&json_error(code, err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Generate(args) => {
            let participant = resolve_participant(args.participant);
            let set_bindings = parse_set_bindings(&args.set_values)?;
            let result = trial_order::generate(&args.config, participant, &set_bindings)?;
            if args.json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "generate",
                    "participant": result.participant,
                    "output_dir": result.output_dir.display().to_string(),
                    "questions_per_session": result.questions_per_session,
                    "demoted_questions": result.demoted_questions,
                    "runs": result.runs.iter().map(written_run_to_json).collect::<Vec<_>>(),
                })));
            }
            println!("participant: {}", result.participant);
            println!("output_dir: {}", result.output_dir.display());
            println!("questions_per_session: {:?}", result.questions_per_session);
            println!("demoted_questions: {}", result.demoted_questions);
            for run in &result.runs {
                println!(
                    "wrote: {} ({} trials, {})",
                    run.path.display(),
                    run.trials,
                    run.digest
                );
            }
        }
        Commands::Describe(args) => {
            let participant = resolve_participant(args.participant);
            let set_bindings = parse_set_bindings(&args.set_values)?;
            let summary = trial_order::describe(&args.config, participant, &set_bindings)?;
            if args.json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": summary_to_json(&summary),
                })));
            }
            print_summary(&summary);
        }
        Commands::Verify(args) => {
            let participant = resolve_participant(args.participant);
            let set_bindings = parse_set_bindings(&args.set_values)?;
            let result = trial_order::verify(&args.config, participant, &set_bindings)?;
            if args.json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "verify",
                    "participant": result.participant,
                    "runs_checked": result.runs_checked,
                    "questions_per_session": result.questions_per_session,
                    "distinct_verbs": result.distinct_verbs,
                })));
            }
            println!("participant: {}", result.participant);
            println!("runs_checked: {}", result.runs_checked);
            println!("questions_per_session: {:?}", result.questions_per_session);
            println!("distinct_verbs: {}", result.distinct_verbs);
            println!("ok");
        }
        Commands::Init { config, force } => {
            trial_order::init_config(&config, force)?;
            println!("wrote: {}", config.display());
            println!(
                "next: edit {}, point the inputs at your tables",
                config.display()
            );
            println!("next: trial-order describe 1 --config {}", config.display());
        }
    }
    Ok(None)
}

fn resolve_participant(participant: Option<u32>) -> u32 {
    participant.unwrap_or_else(|| {
        warn!(
            participant = trial_order::TEST_PARTICIPANT,
            "test run, no participant given"
        );
        trial_order::TEST_PARTICIPANT
    })
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Generate(args) | Commands::Describe(args) | Commands::Verify(args) => args.json,
        Commands::Init { .. } => false,
    }
}

fn parse_set_bindings(values: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for raw in values {
        let (key, val_raw) = raw
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!(format!("invalid --set '{}': expected k=v", raw)))?;
        if key.trim().is_empty() {
            return Err(anyhow::anyhow!(format!(
                "invalid --set '{}': key cannot be empty",
                raw
            )));
        }
        let parsed =
            serde_json::from_str::<Value>(val_raw).unwrap_or(Value::String(val_raw.to_string()));
        out.insert(key.trim().to_string(), parsed);
    }
    Ok(out)
}

fn written_run_to_json(run: &trial_order::WrittenRun) -> Value {
    json!({
        "session": run.session,
        "run": run.run,
        "path": run.path.display().to_string(),
        "trials": run.trials,
        "digest": run.digest,
    })
}

fn summary_to_json(summary: &trial_order::DesignSummary) -> Value {
    json!({
        "participant": summary.participant,
        "categories": summary.categories,
        "stimuli_per_category": summary.stimuli_per_category,
        "verbs_per_category": summary.verbs_per_category,
        "sessions": summary.sessions,
        "runs_per_session": summary.runs_per_session,
        "run_len": summary.run_len,
        "question_slots": summary.question_slots,
        "fixation_slots": summary.fixation_slots,
        "first_stimulus_seed": summary.first_stimulus_seed,
        "first_verb_seed": summary.first_verb_seed,
        "output_dir": summary.output_dir.display().to_string(),
    })
}

fn print_summary(summary: &trial_order::DesignSummary) {
    println!("participant: {}", summary.participant);
    println!("categories: {}", summary.categories);
    println!("stimuli_per_category: {}", summary.stimuli_per_category);
    println!("verbs_per_category: {}", summary.verbs_per_category);
    println!("sessions: {}", summary.sessions);
    println!("runs_per_session: {}", summary.runs_per_session);
    println!("run_len: {}", summary.run_len);
    println!("question_slots: {:?}", summary.question_slots);
    println!("fixation_slots: {:?}", summary.fixation_slots);
    println!("first_stimulus_seed: {}", summary.first_stimulus_seed);
    println!("first_verb_seed: {}", summary.first_verb_seed);
    println!("output_dir: {}", summary.output_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bindings_parse_json_values_or_strings() {
        let values = vec![
            "design.verb_seed_base=60".to_string(),
            "output.dir=orders_v2".to_string(),
        ];
        let out = parse_set_bindings(&values).expect("bindings");
        assert_eq!(out["design.verb_seed_base"], json!(60));
        assert_eq!(out["output.dir"], json!("orders_v2"));
    }

    #[test]
    fn set_bindings_reject_malformed_entries() {
        assert!(parse_set_bindings(&["novalue".to_string()]).is_err());
        assert!(parse_set_bindings(&["=5".to_string()]).is_err());
    }

    #[test]
    fn cli_defaults_to_test_participant() {
        let cli = Cli::try_parse_from(["trial-order", "generate"]).expect("parse");
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.participant, None);
                assert_eq!(args.config, PathBuf::from("design.yaml"));
                assert_eq!(resolve_participant(args.participant), 99);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn json_error_shape() {
        let v = json_error("foil_exhausted", "stuck".to_string(), json!({}));
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["error"]["code"], json!("foil_exhausted"));
    }
}

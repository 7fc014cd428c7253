use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignConfig {
    pub inputs: InputPaths,
    pub output: OutputConfig,
    #[serde(default)]
    pub design: DesignParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputPaths {
    pub stimuli: String,
    pub prep_stimuli: String,
    pub verbs: String,
    /// May contain `{participant}`.
    pub timing: String,
    /// May contain `{participant}`.
    pub sequence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignParams {
    pub categories: u32,
    pub stimuli_per_category: usize,
    pub verbs_per_category: usize,
    pub sessions: usize,
    pub runs_per_session: usize,
    pub boundary_trials: usize,
    pub condition_offset: u32,
    pub fixation_id: u32,
    pub question_id: u32,
    pub questions_per_session: usize,
    pub run_lengths: Vec<usize>,
    pub stimulus_seed_base: u64,
    pub verb_seed_base: u64,
    pub max_foil_attempts: usize,
    pub confusable: Vec<String>,
}

impl Default for DesignParams {
    fn default() -> Self {
        Self {
            categories: 18,
            stimuli_per_category: 5,
            verbs_per_category: 4,
            sessions: 2,
            runs_per_session: 4,
            boundary_trials: 3,
            condition_offset: 1,
            fixation_id: 19,
            question_id: 20,
            questions_per_session: 18,
            run_lengths: vec![103, 124],
            stimulus_seed_base: 0,
            verb_seed_base: 50,
            max_foil_attempts: 10_000,
            confusable: vec!["assembly".to_string(), "using".to_string()],
        }
    }
}

impl DesignParams {
    pub fn category_ids(&self) -> impl Iterator<Item = u32> {
        1..=self.categories
    }

    pub fn is_category(&self, condition: u32) -> bool {
        condition >= 1 && condition <= self.categories
    }

    pub fn total_runs(&self) -> usize {
        self.sessions * self.runs_per_session
    }

    fn check(&self) -> Result<()> {
        if self.categories == 0 {
            return Err(anyhow!("design.categories must be > 0"));
        }
        if self.fixation_id <= self.categories || self.question_id <= self.categories {
            return Err(anyhow!(
                "design.fixation_id and design.question_id must be above the category range 1..={}",
                self.categories
            ));
        }
        if self.fixation_id == self.question_id {
            return Err(anyhow!("design.fixation_id and design.question_id must differ"));
        }
        if self.sessions == 0 || self.runs_per_session == 0 {
            return Err(anyhow!("design.sessions and design.runs_per_session must be > 0"));
        }
        if self.run_lengths.is_empty() {
            return Err(anyhow!("design.run_lengths must list at least one length"));
        }
        if self.max_foil_attempts == 0 {
            return Err(anyhow!("design.max_foil_attempts must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDesign {
    pub config: DesignConfig,
    pub base_dir: PathBuf,
}

impl LoadedDesign {
    pub fn resolve(&self, rel: &str) -> PathBuf {
        let p = Path::new(rel);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn participant_path(&self, template: &str, participant: u32) -> PathBuf {
        self.resolve(&template.replace("{participant}", &participant.to_string()))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.config.output.dir)
    }
}

pub fn load_design(path: &Path, set_bindings: &BTreeMap<String, Value>) -> Result<LoadedDesign> {
    let base_dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    let raw_yaml = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read design config {}: {}", path.display(), e))?;
    let config = parse_design(&raw_yaml, set_bindings)?;
    Ok(LoadedDesign { config, base_dir })
}

pub fn parse_design(raw_yaml: &str, set_bindings: &BTreeMap<String, Value>) -> Result<DesignConfig> {
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(raw_yaml)?;
    let mut json_value: Value = serde_json::to_value(yaml_value)?;
    for (key, value) in set_bindings {
        set_json_pointer_value(&mut json_value, &binding_pointer(key), value.clone())?;
    }
    validate_required_fields(&json_value)?;
    let config: DesignConfig = serde_json::from_value(json_value)?;
    config.design.check()?;
    Ok(config)
}

/// `design.verb_seed_base` and `/design/verb_seed_base` address the same field.
fn binding_pointer(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{}", key.replace('.', "/"))
    }
}

fn validate_required_fields(json_value: &Value) -> Result<()> {
    let required: &[&str] = &[
        "/inputs/stimuli",
        "/inputs/prep_stimuli",
        "/inputs/verbs",
        "/inputs/timing",
        "/inputs/sequence",
        "/output/dir",
    ];
    let mut missing = Vec::new();
    for pointer in required {
        let is_missing = match json_value.pointer(pointer) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            _ => false,
        };
        if is_missing {
            missing.push(*pointer);
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "design.yaml missing required fields:\n{}",
            missing
                .iter()
                .map(|p| format!("  - {}", p))
                .collect::<Vec<_>>()
                .join("\n")
        ))
    }
}

fn decode_pointer_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn set_json_pointer_value(root: &mut Value, pointer: &str, new_value: Value) -> Result<()> {
    if pointer.is_empty() || pointer == "/" {
        *root = new_value;
        return Ok(());
    }
    if !pointer.starts_with('/') {
        return Err(anyhow!("json_pointer must start with '/': {}", pointer));
    }

    let tokens: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(decode_pointer_token)
        .collect();
    let (last, parents) = match tokens.split_last() {
        Some(split) => split,
        None => {
            *root = new_value;
            return Ok(());
        }
    };

    let mut cur = root;
    for token in parents {
        match cur {
            Value::Object(map) => {
                cur = map.entry(token.clone()).or_insert_with(|| json!({}));
            }
            Value::Array(arr) => {
                let idx = array_index(token, arr.len(), pointer)?;
                cur = &mut arr[idx];
            }
            _ => {
                return Err(anyhow!(
                    "json_pointer traversal hit non-container at token '{}' in {}",
                    token,
                    pointer
                ));
            }
        }
    }

    match cur {
        Value::Object(map) => {
            map.insert(last.clone(), new_value);
            Ok(())
        }
        Value::Array(arr) => {
            let idx = array_index(last, arr.len(), pointer)?;
            arr[idx] = new_value;
            Ok(())
        }
        _ => Err(anyhow!(
            "json_pointer target is not an object/array for {}",
            pointer
        )),
    }
}

fn array_index(token: &str, len: usize, pointer: &str) -> Result<usize> {
    let idx: usize = token.parse().map_err(|_| {
        anyhow!(
            "json_pointer token '{}' is not a valid array index in {}",
            token,
            pointer
        )
    })?;
    if idx >= len {
        return Err(anyhow!(
            "json_pointer array index {} out of bounds in {}",
            idx,
            pointer
        ));
    }
    Ok(idx)
}

pub const DESIGN_TEMPLATE: &str = "\
version: '0.3'
inputs:
  stimuli: stimuli.csv                          # REQUIRED: <any>,<category>,<filename>
  prep_stimuli: prep_stimuli.csv                # REQUIRED: one row per category
  verbs: verbs.csv                              # REQUIRED: <category>,<name>,<sociality>,<verb>x4
  timing: timing/timing_final_{participant}.json       # REQUIRED
  sequence: sequences/sequence_final_{participant}.json # REQUIRED
output:
  dir: trial_orders                             # REQUIRED
design:
  categories: 18
  stimuli_per_category: 5
  verbs_per_category: 4
  sessions: 2
  runs_per_session: 4
  boundary_trials: 3
  condition_offset: 1
  fixation_id: 19
  question_id: 20
  questions_per_session: 18
  run_lengths: [103, 124]
  stimulus_seed_base: 0
  verb_seed_base: 50                            # change this if foil search is exhausted
  max_foil_attempts: 10000
  confusable: [assembly, using]
";

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "
inputs:
  stimuli: s.csv
  prep_stimuli: p.csv
  verbs: v.csv
  timing: t_{participant}.json
  sequence: q_{participant}.json
output:
  dir: out
";

    #[test]
    fn template_parses_with_defaults() {
        let config = parse_design(DESIGN_TEMPLATE, &BTreeMap::new()).expect("template");
        assert_eq!(config.design.categories, 18);
        assert_eq!(config.design.verb_seed_base, 50);
        assert_eq!(config.design.confusable, vec!["assembly", "using"]);
        assert_eq!(config.output.dir, "trial_orders");
    }

    #[test]
    fn design_section_is_optional() {
        let config = parse_design(MINIMAL, &BTreeMap::new()).expect("minimal");
        assert_eq!(config.design.total_runs(), 8);
        assert_eq!(config.design.run_lengths, vec![103, 124]);
    }

    #[test]
    fn set_bindings_override_fields() {
        let mut bindings = BTreeMap::new();
        bindings.insert("design.verb_seed_base".to_string(), json!(77));
        bindings.insert("/output/dir".to_string(), json!("elsewhere"));
        let config = parse_design(MINIMAL, &bindings).expect("overridden");
        assert_eq!(config.design.verb_seed_base, 77);
        assert_eq!(config.output.dir, "elsewhere");
        assert_eq!(config.design.categories, 18);
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let err = parse_design("inputs:\n  stimuli: s.csv\n  verbs: ''\n", &BTreeMap::new())
            .expect_err("should fail");
        let msg = err.to_string();
        assert!(msg.contains("/inputs/prep_stimuli"), "{}", msg);
        assert!(msg.contains("/inputs/verbs"), "{}", msg);
        assert!(msg.contains("/output/dir"), "{}", msg);
        assert!(!msg.contains("/inputs/stimuli\n"), "{}", msg);
    }

    #[test]
    fn reserved_ids_must_sit_above_categories() {
        let mut bindings = BTreeMap::new();
        bindings.insert("design.fixation_id".to_string(), json!(5));
        let err = parse_design(MINIMAL, &bindings).expect_err("should fail");
        assert!(err.to_string().contains("fixation_id"), "{}", err);
    }

    #[test]
    fn participant_paths_fill_template() {
        let loaded = LoadedDesign {
            config: parse_design(MINIMAL, &BTreeMap::new()).expect("minimal"),
            base_dir: PathBuf::from("/data/exp"),
        };
        assert_eq!(
            loaded.participant_path("t_{participant}.json", 12),
            PathBuf::from("/data/exp/t_12.json")
        );
        assert_eq!(
            loaded.resolve("/abs/verbs.csv"),
            PathBuf::from("/abs/verbs.csv")
        );
        assert_eq!(loaded.output_dir(), PathBuf::from("/data/exp/out"));
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub onset: f64,
    pub condition: u32,
    #[serde(flatten)]
    pub kind: TrialKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TrialKind {
    Fixation,
    /// `probe` is shown left/right; `answer` indexes the correct verb.
    Question { probe: [String; 2], answer: usize },
    Stimulus { filename: String },
}

impl Trial {
    pub fn is_question(&self) -> bool {
        matches!(self.kind, TrialKind::Question { .. })
    }

    pub fn is_fixation(&self) -> bool {
        matches!(self.kind, TrialKind::Fixation)
    }

    /// `(correct, foil)` for question trials.
    pub fn verb_pair(&self) -> Option<(&str, &str)> {
        match &self.kind {
            TrialKind::Question { probe, answer } => {
                let correct = probe.get(*answer)?;
                let foil = probe.get(1 - (*answer).min(1))?;
                Some((correct.as_str(), foil.as_str()))
            }
            _ => None,
        }
    }
}

pub type Run = Vec<Trial>;
pub type Session = Vec<Run>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trials_serialize_with_role_tag() {
        let trials = vec![
            Trial {
                onset: 0.0,
                condition: 4,
                kind: TrialKind::Stimulus {
                    filename: "clip_04_a.mp4".to_string(),
                },
            },
            Trial {
                onset: 4.5,
                condition: 19,
                kind: TrialKind::Fixation,
            },
            Trial {
                onset: 9.0,
                condition: 20,
                kind: TrialKind::Question {
                    probe: ["hammer".to_string(), "kiss".to_string()],
                    answer: 1,
                },
            },
        ];
        let value = serde_json::to_value(&trials).expect("serialize");
        assert_eq!(
            value,
            json!([
                {"onset": 0.0, "condition": 4, "role": "stimulus", "filename": "clip_04_a.mp4"},
                {"onset": 4.5, "condition": 19, "role": "fixation"},
                {"onset": 9.0, "condition": 20, "role": "question", "probe": ["hammer", "kiss"], "answer": 1}
            ])
        );
        let back: Vec<Trial> = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, trials);
    }

    #[test]
    fn verb_pair_follows_answer_index() {
        let trial = Trial {
            onset: 1.0,
            condition: 20,
            kind: TrialKind::Question {
                probe: ["hammer".to_string(), "kiss".to_string()],
                answer: 1,
            },
        };
        assert_eq!(trial.verb_pair(), Some(("kiss", "hammer")));
        assert!(trial.is_question());
        assert!(!trial.is_fixation());
    }
}

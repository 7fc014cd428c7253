use thiserror::Error;

/// Failures of the assembly procedure. Session, run and trial numbers are
/// 1-based in messages so they line up with the output file names.
#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("input shape mismatch: {message}")]
    InputShape { message: String },

    #[error(
        "participant {participant}: category {category} stimulus pool overdrawn \
         (session {session}, run {run})"
    )]
    StimulusOverdraw {
        participant: u32,
        session: usize,
        run: usize,
        category: u32,
    },

    #[error(
        "participant {participant}: category {category} has {remaining} undrawn stimuli \
         at end of session {session}, run {run}"
    )]
    StimulusPoolNotDrained {
        participant: u32,
        session: usize,
        run: usize,
        category: u32,
        remaining: usize,
    },

    #[error(
        "participant {participant}: no cached verb pair for category {category} \
         (session {session}, run {run}, trial {trial})"
    )]
    BoundaryCacheMiss {
        participant: u32,
        session: usize,
        run: usize,
        trial: usize,
        category: u32,
    },

    #[error("participant {participant}: verb pool for category {category} is exhausted")]
    VerbPoolExhausted { participant: u32, category: u32 },

    #[error(
        "participant {participant}: no valid foil for category {category} after {attempts} \
         attempts, try a different verb seed"
    )]
    FoilExhausted {
        participant: u32,
        category: u32,
        attempts: usize,
    },

    #[error("participant {participant}: {message}")]
    InvariantViolation { participant: u32, message: String },
}

impl AssignmentError {
    pub fn input_shape(message: impl Into<String>) -> Self {
        Self::InputShape {
            message: message.into(),
        }
    }

    pub fn invariant(participant: u32, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            participant,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InputShape { .. } => "input_shape",
            Self::StimulusOverdraw { .. } => "stimulus_overdraw",
            Self::StimulusPoolNotDrained { .. } => "stimulus_pool_not_drained",
            Self::BoundaryCacheMiss { .. } => "boundary_cache_miss",
            Self::VerbPoolExhausted { .. } => "verb_pool_exhausted",
            Self::FoilExhausted { .. } => "foil_exhausted",
            Self::InvariantViolation { .. } => "invariant_violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foil_exhausted_message_suggests_new_seed() {
        let err = AssignmentError::FoilExhausted {
            participant: 7,
            category: 12,
            attempts: 500,
        };
        let msg = err.to_string();
        assert!(msg.contains("participant 7"), "{}", msg);
        assert!(msg.contains("category 12"), "{}", msg);
        assert!(msg.contains("different verb seed"), "{}", msg);
        assert_eq!(err.code(), "foil_exhausted");
    }

    #[test]
    fn helpers_build_expected_variants() {
        assert_eq!(AssignmentError::input_shape("x").code(), "input_shape");
        let err = AssignmentError::invariant(3, "duplicate verb 'lift'");
        assert_eq!(err.code(), "invariant_violation");
        assert_eq!(err.to_string(), "participant 3: duplicate verb 'lift'");
    }
}

use crate::config::DesignParams;
use crate::error::AssignmentError;
use crate::verbs::{VerbBook, VerbPool};
use std::collections::BTreeMap;

/// Category id to stimulus filenames, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusTable {
    by_category: BTreeMap<u32, Vec<String>>,
}

impl StimulusTable {
    pub fn files(&self, category: u32) -> &[String] {
        self.by_category
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Rows are `<any>,<category id>,<filename>`; each category must end up with
/// exactly `per_category` filenames.
pub fn parse_stimulus_table(
    data: &str,
    params: &DesignParams,
    per_category: usize,
    label: &str,
) -> Result<StimulusTable, AssignmentError> {
    let mut by_category: BTreeMap<u32, Vec<String>> =
        params.category_ids().map(|id| (id, Vec::new())).collect();
    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() < 3 {
            return Err(AssignmentError::input_shape(format!(
                "{} line {}: expected at least 3 fields, got {}",
                label,
                line_no + 1,
                fields.len()
            )));
        }
        let category = parse_category(fields[1], label, line_no)?;
        let files = by_category.get_mut(&category).ok_or_else(|| {
            AssignmentError::input_shape(format!(
                "{} line {}: category {} outside 1..={}",
                label,
                line_no + 1,
                category,
                params.categories
            ))
        })?;
        files.push(fields[2].trim().to_string());
    }
    for (category, files) in by_category.iter() {
        if files.len() != per_category {
            return Err(AssignmentError::input_shape(format!(
                "{}: category {} has {} filenames, expected {}",
                label,
                category,
                files.len(),
                per_category
            )));
        }
    }
    Ok(StimulusTable { by_category })
}

/// Rows are `<category id>,<name>,<sociality>,<verb>...`.
pub fn parse_verb_table(data: &str, params: &DesignParams) -> Result<VerbBook, AssignmentError> {
    let mut pools = BTreeMap::new();
    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() < 3 {
            return Err(AssignmentError::input_shape(format!(
                "verbs line {}: expected category, name and sociality",
                line_no + 1
            )));
        }
        let category = parse_category(fields[0], "verbs", line_no)?;
        if !params.is_category(category) {
            return Err(AssignmentError::input_shape(format!(
                "verbs line {}: category {} outside 1..={}",
                line_no + 1,
                category,
                params.categories
            )));
        }
        let verbs: Vec<String> = fields[3..].iter().map(|v| v.trim().to_string()).collect();
        if verbs.len() != params.verbs_per_category {
            return Err(AssignmentError::input_shape(format!(
                "verbs: category {} has {} verbs, expected {}",
                category,
                verbs.len(),
                params.verbs_per_category
            )));
        }
        let pool = VerbPool::new(
            category,
            fields[1].trim().to_string(),
            fields[2].trim().to_string(),
            verbs,
        );
        if pools.insert(category, pool).is_some() {
            return Err(AssignmentError::input_shape(format!(
                "verbs: category {} listed twice",
                category
            )));
        }
    }
    if pools.len() != params.categories as usize {
        return Err(AssignmentError::input_shape(format!(
            "verbs: {} categories listed, expected {}",
            pools.len(),
            params.categories
        )));
    }
    Ok(VerbBook::new(pools))
}

fn parse_category(raw: &str, label: &str, line_no: usize) -> Result<u32, AssignmentError> {
    raw.trim().parse::<u32>().map_err(|_| {
        AssignmentError::input_shape(format!(
            "{} line {}: category id '{}' is not an integer",
            label,
            line_no + 1,
            raw.trim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> DesignParams {
        DesignParams {
            categories: 2,
            verbs_per_category: 2,
            fixation_id: 3,
            question_id: 4,
            ..DesignParams::default()
        }
    }

    #[test]
    fn stimulus_rows_group_by_category() {
        let data = "0,1,a.mp4\n1,2,b.mp4\n2,1,c.mp4\n\n3,2,d.mp4\n";
        let table = parse_stimulus_table(data, &small_params(), 2, "stimuli").expect("table");
        assert_eq!(table.files(1), &["a.mp4".to_string(), "c.mp4".to_string()]);
        assert_eq!(table.files(2), &["b.mp4".to_string(), "d.mp4".to_string()]);
        assert!(table.files(9).is_empty());
    }

    #[test]
    fn stimulus_count_mismatch_is_input_shape() {
        let data = "0,1,a.mp4\n1,2,b.mp4\n2,1,c.mp4\n";
        let err = parse_stimulus_table(data, &small_params(), 2, "stimuli").expect_err("short");
        assert_eq!(err.code(), "input_shape");
        assert!(err.to_string().contains("category 2 has 1"), "{}", err);
    }

    #[test]
    fn stimulus_category_out_of_range_is_rejected() {
        let data = "0,7,a.mp4\n";
        let err = parse_stimulus_table(data, &small_params(), 1, "prep").expect_err("range");
        assert!(err.to_string().contains("category 7 outside"), "{}", err);
    }

    #[test]
    fn verb_rows_build_pools() {
        let data = "1,assembly,nonsocial,build,assemble\n2,talking,social,chat,speak\n";
        let book = parse_verb_table(data, &small_params()).expect("verbs");
        let pool = book.pool(1).expect("pool 1");
        assert_eq!(pool.name, "assembly");
        assert_eq!(pool.sociality, "nonsocial");
        assert_eq!(pool.remaining_len(), 2);
        assert_eq!(book.category_of_verb("speak"), Some(2));
    }

    #[test]
    fn verb_count_mismatch_is_input_shape() {
        let data = "1,assembly,nonsocial,build\n2,talking,social,chat,speak\n";
        let err = parse_verb_table(data, &small_params()).expect_err("short");
        assert!(err.to_string().contains("category 1 has 1 verbs"), "{}", err);
    }

    #[test]
    fn verb_table_needs_every_category() {
        let data = "1,assembly,nonsocial,build,assemble\n";
        let err = parse_verb_table(data, &small_params()).expect_err("missing");
        assert!(err.to_string().contains("1 categories listed"), "{}", err);
    }
}

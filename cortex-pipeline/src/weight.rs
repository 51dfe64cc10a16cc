use std::collections::HashMap;

use crate::request::Subject;

/// Maps the caller's per-subject weight to `[-1, 1]` by dividing by the
/// maximum absolute weight; if all raw weights are zero, normalized
/// weights are all zero too (spec §4.2 step 1, §8 property 5).
pub fn normalize(raw: &HashMap<Subject, f64>) -> HashMap<Subject, f64> {
    let max_abs = raw.values().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if max_abs == 0.0 {
        return raw.keys().map(|k| (k.clone(), 0.0)).collect();
    }
    raw.iter().map(|(k, v)| (k.clone(), v / max_abs)).collect()
}

/// Aggregates the per-step activations into a final per-subject weight,
/// starting from the normalized input weight and adding `tanh(activation)`
/// for every step in application order (spec §4.2 step 3, §8 property 4).
/// `per_step_activations` must be in application order; a subject absent
/// from a given step's map contributes 0 for that step.
pub fn aggregate(
    normalized_input: &HashMap<Subject, f64>,
    per_step_activations: &[HashMap<Subject, f64>],
) -> HashMap<Subject, f64> {
    normalized_input
        .iter()
        .map(|(subject, start)| {
            let total = per_step_activations.iter().fold(*start, |acc, step_map| {
                acc + step_map.get(subject).copied().unwrap_or(0.0).tanh()
            });
            (subject.clone(), total)
        })
        .collect()
}

/// Sorts subjects descending by aggregated weight, ties broken by the
/// subject's position in `insertion_order` (spec §4.2 step 4, §8
/// property 6 "Ordering determinism").
pub fn sort_descending(aggregated: &HashMap<Subject, f64>, insertion_order: &[Subject]) -> Vec<Subject> {
    let mut index_of: HashMap<&Subject, usize> = HashMap::new();
    for (i, s) in insertion_order.iter().enumerate() {
        index_of.entry(s).or_insert(i);
    }
    let mut subjects: Vec<Subject> = aggregated.keys().cloned().collect();
    subjects.sort_by(|a, b| {
        let wa = aggregated[a];
        let wb = aggregated[b];
        wb.partial_cmp(&wa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ia = index_of.get(a).copied().unwrap_or(usize::MAX);
                let ib = index_of.get(b).copied().unwrap_or(usize::MAX);
                ia.cmp(&ib)
            })
    });
    subjects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_divides_by_max_abs() {
        let raw = HashMap::from([("a".to_string(), 4.0), ("b".to_string(), -2.0)]);
        let n = normalize(&raw);
        assert_eq!(n["a"], 1.0);
        assert_eq!(n["b"], -0.5);
    }

    #[test]
    fn normalize_all_zero_stays_zero() {
        let raw = HashMap::from([("a".to_string(), 0.0), ("b".to_string(), 0.0)]);
        let n = normalize(&raw);
        assert_eq!(n["a"], 0.0);
        assert_eq!(n["b"], 0.0);
    }

    #[test]
    fn sort_descending_ties_break_by_insertion_order() {
        let aggregated = HashMap::from([("a".to_string(), 1.0), ("b".to_string(), 1.0)]);
        let order = vec!["b".to_string(), "a".to_string()];
        let sorted = sort_descending(&aggregated, &order);
        assert_eq!(sorted, vec!["b".to_string(), "a".to_string()]);
    }
}

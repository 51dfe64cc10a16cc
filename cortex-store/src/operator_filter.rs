use cortex_common::meta::ObjectMeta;
use cortex_common::records::WithMeta;
use cortex_common::Operator;

/// Whether a controller replica tagged `mine` owns a record (spec §6
/// "scopes its writes to records whose operator tag matches"), so
/// multiple Cortex instances can reconcile against the same store
/// without stepping on each other's records.
pub fn owns(mine: &Operator, meta: &ObjectMeta) -> bool {
    mine.matches(&meta.operator)
}

pub fn retain_owned<'a, T: WithMeta>(mine: &Operator, records: &'a [T]) -> Vec<&'a T> {
    records.iter().filter(|r| owns(mine, r.meta())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_common::records::Pipeline;
    use cortex_common::records::pipeline::{PipelineSpec, PipelineStatus, PipelineType};

    fn pipeline(name: &str, operator: &str) -> Pipeline {
        Pipeline {
            meta: ObjectMeta::new(name, Operator(operator.to_string())),
            spec: PipelineSpec {
                type_: PipelineType::FilterWeigher,
                steps: vec![],
            },
            status: PipelineStatus::default(),
        }
    }

    #[test]
    fn filters_to_matching_operator_only() {
        let mine = Operator("az-a".to_string());
        let records = vec![pipeline("p1", "az-a"), pipeline("p2", "az-b")];
        let owned = retain_owned(&mine, &records);
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].meta.name, "p1");
    }
}

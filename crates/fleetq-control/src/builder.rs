//! Question building.
//!
//! Converts a resolved [`QuerySpec`] into the submittable [`Question`].

use fleetq_core::{Filter, Question, QuestionGroup, QuerySpec, Select, SensorRef};

use crate::coerce::SensorCatalog;
use crate::error::Result;
use crate::types::QuestionOptions;

/// Build a question from a spec whose names and parameters are resolved.
///
/// Selects follow selector order. A filter group is attached only when the
/// spec has groupings, so an empty spec yields the server's default query.
///
/// # Errors
///
/// Returns `ControlError::Validation` if a referenced sensor is not in the
/// catalog.
pub fn build_question(
    spec: &QuerySpec,
    catalog: &SensorCatalog,
    options: &QuestionOptions,
) -> Result<Question> {
    let selects = spec
        .selectors
        .iter()
        .map(|fragment| {
            let sensor = catalog.resolve(&fragment.name)?;
            Ok(Select {
                sensor: SensorRef::from(sensor),
                parameters: fragment.params.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let group = if spec.groupings.is_empty() {
        None
    } else {
        let filters = spec
            .groupings
            .iter()
            .map(|fragment| {
                let sensor = catalog.resolve(&fragment.name)?;
                Ok(Filter {
                    sensor: SensorRef::from(sensor),
                    parameters: fragment.params.clone(),
                    operator: fragment.operator,
                    value: fragment.value.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Some(QuestionGroup {
            and_flag: spec.combine.and_flag(),
            filters,
        })
    };

    Ok(Question {
        expire_seconds: options.expire_seconds,
        skip_lock_flag: options.skip_lock,
        selects,
        group,
        ..Question::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{parse_grouping, parse_selector};
    use fleetq_core::{CombineOp, FilterOperator, Sensor};

    fn catalog() -> SensorCatalog {
        SensorCatalog::new([
            Sensor {
                id: Some(10.into()),
                name: Some("Computer Name".to_string()),
                hash: Some(3_409_330_187),
                ..Default::default()
            },
            Sensor {
                id: Some(11.into()),
                name: Some("Operating System".to_string()),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn empty_spec_is_default_query() {
        let question =
            build_question(&QuerySpec::default(), &catalog(), &QuestionOptions::default())
                .unwrap();
        assert!(question.is_default_query());
    }

    #[test]
    fn selects_and_filters_follow_spec() {
        let spec = QuerySpec {
            selectors: vec![parse_selector("Computer Name").unwrap()],
            groupings: vec![
                parse_grouping("Operating System, that contains:Windows").unwrap(),
                parse_grouping("Computer Name, that starts with:web").unwrap(),
            ],
            combine: CombineOp::Or,
        };
        let options = QuestionOptions {
            expire_seconds: Some(600),
            skip_lock: true,
        };
        let question = build_question(&spec, &catalog(), &options).unwrap();

        assert_eq!(question.selects.len(), 1);
        assert_eq!(question.selects[0].sensor.hash, Some(3_409_330_187));
        let group = question.group.unwrap();
        assert!(!group.and_flag);
        assert_eq!(group.filters.len(), 2);
        assert_eq!(group.filters[1].operator, FilterOperator::StartsWith);
        assert_eq!(question.expire_seconds, Some(600));
        assert!(question.skip_lock_flag);
    }

    #[test]
    fn unknown_sensor_fails() {
        let spec = QuerySpec {
            selectors: vec![parse_selector("Uptime").unwrap()],
            ..Default::default()
        };
        assert!(build_question(&spec, &catalog(), &QuestionOptions::default()).is_err());
    }
}

//! Criteria evaluation engine
//!
//! The engine walks a `LogicCriteria` tree bottom-up. Token references are
//! answered by a `TokenResolver` for the whole cohort in one call; every other
//! node transforms the per-patient result maps of its children.

use crate::cache::ResultMap;
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::operators::{aggregate, comparison, logical, temporal};
use clinlogic_criteria::{BooleanOp, LogicCriteria, TokenReference};
use clinlogic_types::{Cohort, LogicResult};
use log::{debug, trace};

/// Answers token references for a cohort
pub trait TokenResolver {
    /// Fetch the raw chains for `reference`.
    ///
    /// Patients without data may be left out of the returned map.
    fn resolve(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        reference: &TokenReference,
    ) -> EvalResult<ResultMap>;
}

/// Evaluates criteria trees against a resolver
pub struct CriteriaEngine<'r> {
    resolver: &'r dyn TokenResolver,
}

impl<'r> CriteriaEngine<'r> {
    /// Create an engine backed by `resolver`
    pub fn new(resolver: &'r dyn TokenResolver) -> Self {
        Self { resolver }
    }

    /// Evaluate `criteria` for every member of `cohort`.
    ///
    /// Only members with a non-empty result appear in the returned map, except
    /// for `count`, `exists` and `not_exists`, which answer for every member.
    pub fn evaluate(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &LogicCriteria,
    ) -> EvalResult<ResultMap> {
        criteria.validate()?;
        debug!("Evaluating '{criteria}' for {} patients", cohort.len());
        self.eval(context, cohort, criteria)
    }

    fn eval(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &LogicCriteria,
    ) -> EvalResult<ResultMap> {
        let fail = |message: String| EvalError::criteria(criteria.to_string(), message);

        match criteria {
            LogicCriteria::Token(reference) => {
                let raw = self.resolver.resolve(context, cohort, reference)?;
                trace!("'{reference}' answered for {} patients", raw.len());
                Ok(raw
                    .into_iter()
                    .filter(|(patient, result)| cohort.contains(*patient) && !result.is_empty())
                    .collect())
            }

            LogicCriteria::Comparison {
                source,
                op,
                operand,
            } => {
                let input = self.eval(context, cohort, source)?;
                let mut out = ResultMap::with_capacity(input.len());
                for (patient, result) in input {
                    let kept = comparison::filter(&result, *op, operand).map_err(fail)?;
                    if !kept.is_empty() {
                        out.insert(patient, kept);
                    }
                }
                Ok(out)
            }

            LogicCriteria::Aggregation { source, function } => {
                let input = self.eval(context, cohort, source)?;
                let absent = aggregate::answers_for_absent(*function);
                let empty = LogicResult::empty();
                let mut out = ResultMap::new();
                for patient in cohort.iter() {
                    let result = input.get(&patient).unwrap_or(&empty);
                    if result.is_empty() && !absent {
                        continue;
                    }
                    let aggregated =
                        aggregate::apply(result, *function, context.index_date()).map_err(fail)?;
                    if !aggregated.is_empty() {
                        out.insert(patient, aggregated);
                    }
                }
                Ok(out)
            }

            LogicCriteria::DateConstraint { source, constraint } => {
                let input = self.eval(context, cohort, source)?;
                let mut out = ResultMap::with_capacity(input.len());
                for (patient, result) in input {
                    let kept =
                        temporal::apply(&result, constraint, context.index_date()).map_err(fail)?;
                    if !kept.is_empty() {
                        out.insert(patient, kept);
                    }
                }
                Ok(out)
            }

            LogicCriteria::Combination { op, children } => {
                let evaluated = children
                    .iter()
                    .map(|child| self.eval(context, cohort, child))
                    .collect::<EvalResult<Vec<_>>>()?;
                match op {
                    BooleanOp::And => Ok(logical::and(cohort, &evaluated)),
                    BooleanOp::Or => Ok(logical::or(cohort, &evaluated)),
                    BooleanOp::Not => match evaluated.as_slice() {
                        [child] => Ok(logical::not(cohort, child)),
                        _ => Err(fail(format!(
                            "NOT takes exactly one operand, got {}",
                            evaluated.len()
                        ))),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use clinlogic_types::{Duration, ResultNode};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[derive(Default)]
    struct MapResolver {
        tokens: HashMap<String, ResultMap>,
    }

    impl MapResolver {
        fn with(mut self, key: &str, entries: Vec<(i64, LogicResult)>) -> Self {
            self.tokens
                .insert(key.to_string(), entries.into_iter().collect());
            self
        }
    }

    impl TokenResolver for MapResolver {
        fn resolve(
            &self,
            _context: &EvaluationContext,
            _cohort: &Cohort,
            reference: &TokenReference,
        ) -> EvalResult<ResultMap> {
            self.tokens
                .get(&reference.key)
                .cloned()
                .ok_or_else(|| EvalError::unknown_key(&reference.key))
        }
    }

    fn cd4() -> MapResolver {
        MapResolver::default().with(
            "CD4 COUNT",
            vec![
                (
                    1,
                    LogicResult::from_nodes(vec![
                        ResultNode::dated(date(2023, 1, 10), 350),
                        ResultNode::dated(date(2023, 6, 10), 180),
                    ]),
                ),
                (2, LogicResult::from_node(ResultNode::dated(date(2023, 3, 1), 500))),
                (9, LogicResult::of(100)),
            ],
        )
    }

    fn context() -> EvaluationContext {
        EvaluationContext::builder().index_date(date(2024, 1, 1)).build()
    }

    #[test]
    fn test_token_limited_to_cohort() {
        let resolver = cd4();
        let engine = CriteriaEngine::new(&resolver);
        let result = engine
            .evaluate(&context(), &Cohort::new([1, 2, 3]), &LogicCriteria::token("CD4 COUNT"))
            .unwrap();
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_comparison_then_last() {
        let resolver = cd4();
        let engine = CriteriaEngine::new(&resolver);
        let criteria = LogicCriteria::token("CD4 COUNT").lt(200).last();
        let result = engine
            .evaluate(&context(), &Cohort::new([1, 2]), &criteria)
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[&1].to_string(), "180");
    }

    #[test]
    fn test_count_answers_for_every_member() {
        let resolver = cd4();
        let engine = CriteriaEngine::new(&resolver);
        let criteria = LogicCriteria::token("CD4 COUNT")
            .within(Duration::days(330.0))
            .count();
        let result = engine
            .evaluate(&context(), &Cohort::new([1, 2, 3]), &criteria)
            .unwrap();
        assert_eq!(result[&1], LogicResult::of(1));
        assert_eq!(result[&2], LogicResult::of(1));
        assert_eq!(result[&3], LogicResult::of(0));
    }

    #[test]
    fn test_not_over_cohort() {
        let resolver = cd4();
        let engine = CriteriaEngine::new(&resolver);
        let criteria = LogicCriteria::token("CD4 COUNT").not();
        let result = engine
            .evaluate(&context(), &Cohort::new([1, 2, 3]), &criteria)
            .unwrap();
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_type_mismatch_names_subexpression() {
        let resolver = cd4();
        let engine = CriteriaEngine::new(&resolver);
        let criteria = LogicCriteria::token("CD4 COUNT").contains("HIV");
        let err = engine
            .evaluate(&context(), &Cohort::new([1]), &criteria)
            .unwrap_err();
        match err {
            EvalError::CriteriaEvaluation { expression, .. } => {
                assert!(expression.contains("contains"), "{expression}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_token_propagates() {
        let resolver = cd4();
        let engine = CriteriaEngine::new(&resolver);
        let err = engine
            .evaluate(&context(), &Cohort::new([1]), &LogicCriteria::token("WEIGHT"))
            .unwrap_err();
        assert!(matches!(err, EvalError::UnknownKey { .. }));
    }

    #[test]
    fn test_invalid_criteria_rejected_before_resolving() {
        let resolver = MapResolver::default();
        let engine = CriteriaEngine::new(&resolver);
        let err = engine
            .evaluate(&context(), &Cohort::new([1]), &LogicCriteria::token("X").last_n(0))
            .unwrap_err();
        assert!(matches!(err, EvalError::CriteriaEvaluation { .. }));
    }
}

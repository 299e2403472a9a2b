//! Service-level evaluation: caching, invalidation, expiry and token lookup

mod common;

use chrono::Duration;
use clinlogic::{LogicConfig, LogicService};
use clinlogic_eval::{EvalError, ManualClock};
use clinlogic_types::{Cohort, LogicResult, ResultNode};
use common::{
    CountingSource, clinic, clinic_source, context, context_with_clock, criteria, index_date,
    patients, service_with, ymd,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;
use std::sync::Arc;

#[test]
fn test_second_evaluation_is_served_from_cache() {
    let source = Arc::new(clinic_source(60));
    let service = service_with(source.clone());
    let ctx = context(&service);

    let first = service
        .evaluate_expression(&ctx, &clinic(), "GENDER = 'M'")
        .unwrap();
    let second = service
        .evaluate_expression(&ctx, &clinic(), "GENDER = 'M'")
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(patients(&first), vec![1, 3]);
    assert_eq!(source.reads(), 1);
}

#[test]
fn test_filters_over_one_key_share_a_read() {
    let source = Arc::new(clinic_source(60));
    let service = service_with(source.clone());
    let ctx = context(&service);

    let male = service
        .evaluate_expression(&ctx, &clinic(), "GENDER = 'M'")
        .unwrap();
    let female = service
        .evaluate_expression(&ctx, &clinic(), "GENDER = 'F'")
        .unwrap();

    assert_eq!(patients(&male), vec![1, 3]);
    assert_eq!(patients(&female), vec![2, 4]);
    assert_eq!(source.reads(), 1);
}

#[test]
fn test_set_base_cohort_clears_every_entry() {
    let source = Arc::new(
        CountingSource::new(60)
            .with("MALE", 1, vec![ResultNode::new(true)])
            .with("FEMALE", 2, vec![ResultNode::new(true)]),
    );
    let service = service_with(source.clone());
    let ctx = context(&service);

    service.evaluate_expression(&ctx, &clinic(), "MALE").unwrap();
    service.evaluate_expression(&ctx, &clinic(), "FEMALE").unwrap();
    assert_eq!(ctx.cache_len(), 2);

    ctx.set_base_cohort(Cohort::new([1, 2]));
    assert_eq!(ctx.cache_len(), 0);

    service.evaluate_expression(&ctx, &clinic(), "MALE").unwrap();
    assert_eq!(source.reads(), 3);
}

#[test]
fn test_switching_cohorts_recomputes() {
    let source = Arc::new(clinic_source(60));
    let service = service_with(source.clone());
    let ctx = context(&service);

    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    let subset = service
        .evaluate_expression(&ctx, &Cohort::new([2]), "GENDER")
        .unwrap();
    assert_eq!(patients(&subset), vec![2]);
    assert_eq!(ctx.base_cohort(), Some(Cohort::new([2])));

    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    assert_eq!(source.reads(), 3);
}

#[test]
fn test_entry_expires_after_source_ttl() {
    let source = Arc::new(clinic_source(1));
    let service = service_with(source.clone());
    let clock = Arc::new(ManualClock::new(index_date()));
    let ctx = context_with_clock(&service, clock.clone());

    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    clock.advance(Duration::seconds(1));
    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    assert_eq!(source.reads(), 1);

    clock.advance(Duration::seconds(1));
    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    assert_eq!(source.reads(), 2);
}

#[test]
fn test_configured_ttl_overrides_source_ttl() {
    let source = Arc::new(clinic_source(3600));
    let config = LogicConfig {
        ttl_overrides: [("counting".to_string(), 1)].into_iter().collect(),
        ..LogicConfig::default()
    };
    let service = LogicService::with_config(config);
    service
        .register_data_source("counting", source.clone())
        .unwrap();
    let clock = Arc::new(ManualClock::new(index_date()));
    let ctx = context_with_clock(&service, clock.clone());

    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    clock.advance(Duration::seconds(2));
    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    assert_eq!(source.reads(), 2);
}

#[test]
fn test_unknown_token_is_an_error() {
    let service = service_with(Arc::new(clinic_source(60)));
    let ctx = context(&service);

    let err = service
        .evaluate_expression(&ctx, &clinic(), "@doesnotexist")
        .unwrap_err();
    assert!(matches!(err, EvalError::UnknownKey { ref key } if key == "doesnotexist"));

    let err = service
        .evaluate_expression(&ctx, &clinic(), "@counting WEIGHT")
        .unwrap_err();
    assert!(matches!(err, EvalError::UnknownKey { .. }));
}

#[rstest]
#[case("GENDER AND")]
#[case("NOT")]
#[case("{CD4 COUNT}.last.foo")]
#[case("{CD4 COUNT}.within.past.years(5000)")]
fn test_malformed_expression_is_a_criteria_error(#[case] expression: &str) {
    let source = Arc::new(clinic_source(60));
    let service = service_with(source.clone());
    let ctx = context(&service);

    let err = service
        .evaluate_expression(&ctx, &clinic(), expression)
        .unwrap_err();
    assert!(
        matches!(err, EvalError::CriteriaEvaluation { .. }),
        "{expression}: {err:?}"
    );
    assert_eq!(source.reads(), 0);
}

#[test]
fn test_provider_failure_aborts_evaluation() {
    let service = service_with(Arc::new(CountingSource::failing("timeout").with_key("LABS")));
    let ctx = context(&service);

    let err = service
        .evaluate_expression(&ctx, &clinic(), "LABS")
        .unwrap_err();
    assert!(matches!(err, EvalError::ProviderUnavailable { .. }));
    assert_eq!(ctx.cache_len(), 0);
}

#[test]
fn test_window_boundary_is_inclusive() {
    let service = service_with(Arc::new(clinic_source(60)));
    let ctx = context(&service);

    let result = service
        .evaluate_expression(&ctx, &clinic(), "{CD4 COUNT}.within.past.days(330)")
        .unwrap();
    assert_eq!(patients(&result), vec![1, 3]);
    assert_eq!(result[&1].len(), 2);
    assert!(result[&2].is_empty());
}

#[rstest]
#[case("{CD4 COUNT}.last", vec![1, 2, 3])]
#[case("{CD4 COUNT}.last < 200", vec![2, 3])]
#[case("LAST {CD4 COUNT} < 200", vec![1, 2, 3])]
#[case("@counting GENDER = 'F'", vec![2, 4])]
#[case("GENDER = 'M' AND {CD4 COUNT}.within.past.months(6)", vec![1, 3])]
#[case("GENDER = 'F' OR {CD4 COUNT} > 400", vec![1, 2, 4])]
#[case("NOT {CD4 COUNT}", vec![4])]
fn test_expressions(#[case] expression: &str, #[case] expected: Vec<i64>) {
    let service = service_with(Arc::new(clinic_source(60)));
    let ctx = context(&service);
    let result = service
        .evaluate_expression(&ctx, &clinic(), expression)
        .unwrap();
    assert_eq!(patients(&result), expected);
}

#[test]
fn test_missing_members_filled_with_empty_results() {
    let service = service_with(Arc::new(clinic_source(60)));
    let ctx = context(&service);
    let result = service
        .evaluate_expression(&ctx, &clinic(), "{CD4 COUNT}")
        .unwrap();
    assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert!(result[&4].is_empty());

    let sparse = LogicService::with_config(LogicConfig {
        fill_missing: false,
        ..LogicConfig::default()
    });
    sparse
        .register_data_source("counting", Arc::new(clinic_source(60)))
        .unwrap();
    let ctx = context(&sparse);
    let result = sparse
        .evaluate_expression(&ctx, &clinic(), "{CD4 COUNT}")
        .unwrap();
    assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn test_adding_to_a_result_leaves_cached_entry_untouched() {
    let service = service_with(Arc::new(clinic_source(60)));
    let ctx = context(&service);

    let first = service
        .evaluate_expression(&ctx, &clinic(), "{CD4 COUNT}")
        .unwrap();
    let merged = first[&1].add(&LogicResult::from_node(ResultNode::dated(ymd(2023, 10, 1), 5)));
    assert_eq!(merged.len(), 3);

    let again = service
        .evaluate_expression(&ctx, &clinic(), "{CD4 COUNT}")
        .unwrap();
    assert_eq!(again[&1].len(), 2);
    assert_eq!(again[&1].to_string(), "150,420");
}

#[test]
fn test_evaluate_patient_keeps_base_cohort() {
    let source = Arc::new(clinic_source(60));
    let service = service_with(source.clone());
    let ctx = context(&service);

    service.evaluate_expression(&ctx, &clinic(), "GENDER").unwrap();
    let latest = service
        .evaluate_patient(&ctx, 2, &criteria("{CD4 COUNT}.last"))
        .unwrap();

    assert_eq!(latest.to_number().unwrap(), Decimal::from(90));
    assert_eq!(ctx.base_cohort(), Some(clinic()));
    let absent = service
        .evaluate_patient(&ctx, 4, &criteria("{CD4 COUNT}"))
        .unwrap();
    assert!(absent.is_empty());
}

#[test]
fn test_evaluate_many_reads_each_key_once() {
    let source = Arc::new(clinic_source(60));
    let service = service_with(source.clone());
    let ctx = context(&service);

    let results = service
        .evaluate_many(
            &ctx,
            &clinic(),
            &[
                criteria("GENDER = 'M'"),
                criteria("{CD4 COUNT}.count"),
                criteria("GENDER = 'F'"),
            ],
        )
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[1][&1].to_number().unwrap(), Decimal::from(2));
    assert_eq!(results[1][&4].to_number().unwrap(), Decimal::from(0));
    assert_eq!(source.reads(), 2);
}

#[test]
fn test_partial_token_match() {
    let source = CountingSource::new(60)
        .with_key("AGE")
        .with_key("PAGE")
        .with_key("MAGE")
        .with_key("AGED");
    let service = service_with(Arc::new(source));

    let mut found = service.find_tokens("AGE");
    found.sort();
    assert_eq!(found, vec!["AGE", "AGED", "MAGE", "PAGE"]);
    assert!(service.find_tokens("XYZ").is_empty());
    assert!(LogicService::new().find_tokens("AGE").is_empty());
}

#[test]
fn test_source_keys_tagged_with_source_name() {
    let service = service_with(Arc::new(clinic_source(60)));
    assert_eq!(service.token_tags("GENDER"), Some(vec!["counting".to_string()]));
    assert_eq!(service.find_tags("count"), vec!["counting"]);

    service.add_token_tag("GENDER", "demographics").unwrap();
    assert_eq!(service.tokens_with_tag("demographics"), vec!["GENDER"]);

    assert!(service.unregister_data_source("counting"));
    assert_eq!(service.token_tags("GENDER"), None);
    assert!(service.all_tokens().is_empty());
}

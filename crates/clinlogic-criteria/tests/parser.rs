//! Parser tests for criteria expressions

use chrono::{NaiveDate, NaiveDateTime};
use clinlogic_criteria::{
    Aggregate, ComparisonOp, CriteriaError, DateConstraint, DateRef, Direction, LogicCriteria,
    Operand, TokenReference,
};
use clinlogic_types::Duration;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn parse(text: &str) -> LogicCriteria {
    LogicCriteria::parse(text).unwrap_or_else(|e| panic!("failed to parse '{text}': {e}"))
}

#[test]
fn test_scoped_reference() {
    assert_eq!(
        parse("@pharmacy visit.pharmacy"),
        LogicCriteria::scoped("pharmacy", "visit.pharmacy")
    );
}

#[test]
fn test_lone_at_reference() {
    assert_eq!(parse("@doesnotexist"), LogicCriteria::token("doesnotexist"));
}

#[test]
fn test_fluent_chain() {
    let expected = LogicCriteria::token("CONCEPT_NAME")
        .last_n(2)
        .within(Duration::days(330.0));
    assert_eq!(parse("CONCEPT_NAME.last(2).within.past.days(330)"), expected);
}

#[test]
fn test_within_defaults_to_past() {
    assert_eq!(
        parse("WEIGHT.within.months(6)"),
        LogicCriteria::token("WEIGHT").within(Duration::months(6.0))
    );
    assert_eq!(
        parse("VISIT.within.future.weeks(2)"),
        LogicCriteria::token("VISIT").within_future(Duration::weeks(2.0))
    );
}

#[rstest]
#[case("\"CD4 COUNT\"")]
#[case("{CD4 COUNT}")]
#[case("CD4 COUNT")]
#[case("  CD4 COUNT  ")]
fn test_multi_word_keys(#[case] text: &str) {
    assert_eq!(parse(text), LogicCriteria::token("CD4 COUNT"));
}

#[rstest]
#[case("CD4 COUNT < 200", ComparisonOp::Less)]
#[case("CD4 COUNT <= 200", ComparisonOp::LessOrEqual)]
#[case("CD4 COUNT > 200", ComparisonOp::Greater)]
#[case("CD4 COUNT >= 200", ComparisonOp::GreaterOrEqual)]
#[case("CD4 COUNT = 200", ComparisonOp::Equal)]
#[case("CD4 COUNT == 200", ComparisonOp::Equal)]
#[case("CD4 COUNT != 200", ComparisonOp::NotEqual)]
#[case("CD4 COUNT <> 200", ComparisonOp::NotEqual)]
#[case("CD4 COUNT LT 200", ComparisonOp::Less)]
#[case("CD4 COUNT lte 200", ComparisonOp::LessOrEqual)]
#[case("CD4 COUNT GT 200", ComparisonOp::Greater)]
#[case("CD4 COUNT GTE 200", ComparisonOp::GreaterOrEqual)]
#[case("CD4 COUNT EQ 200", ComparisonOp::Equal)]
#[case("CD4 COUNT NE 200", ComparisonOp::NotEqual)]
#[case("\"CD4 COUNT\".lt(200)", ComparisonOp::Less)]
#[case("\"CD4 COUNT\".gte(200)", ComparisonOp::GreaterOrEqual)]
fn test_comparison_operators(#[case] text: &str, #[case] op: ComparisonOp) {
    assert_eq!(
        parse(text),
        LogicCriteria::Comparison {
            source: Box::new(LogicCriteria::token("CD4 COUNT")),
            op,
            operand: Operand::from(200),
        }
    );
}

#[test]
fn test_legacy_clause_form() {
    let expected = LogicCriteria::token("CD4 COUNT")
        .lt(200)
        .within(Duration::months(6.0))
        .last();
    assert_eq!(parse("LAST {CD4 COUNT} < 200 WITHIN 6 MONTHS"), expected);
}

#[test]
fn test_prefix_with_count() {
    assert_eq!(
        parse("LAST 3 FROM \"WEIGHT (KG)\""),
        LogicCriteria::token("WEIGHT (KG)").last_n(3)
    );
    assert_eq!(
        parse("EXISTS {HIV DIAGNOSIS}"),
        LogicCriteria::token("HIV DIAGNOSIS").exists()
    );
}

#[test]
fn test_prefix_word_needs_delimited_reference() {
    assert_eq!(parse("LAST VISIT DATE"), LogicCriteria::token("LAST VISIT DATE"));
}

#[test]
fn test_date_conditions() {
    assert_eq!(
        parse("WEIGHT BEFORE 2024-01-01"),
        LogicCriteria::token("WEIGHT").before(date(2024, 1, 1))
    );
    assert_eq!(
        parse("WEIGHT AFTER '2023-06-15'"),
        LogicCriteria::token("WEIGHT").after(date(2023, 6, 15))
    );
    assert_eq!(
        parse("WEIGHT AS OF TODAY"),
        LogicCriteria::token("WEIGHT").as_of(DateRef::IndexDate)
    );
    assert_eq!(
        parse("WEIGHT BETWEEN 2023-01-01 AND 2023-12-31"),
        LogicCriteria::token("WEIGHT").between(date(2023, 1, 1), date(2023, 12, 31))
    );
}

#[test]
fn test_date_methods() {
    assert_eq!(
        parse("WEIGHT.before(2024-01-01).last"),
        LogicCriteria::token("WEIGHT").before(date(2024, 1, 1)).last()
    );
    assert_eq!(
        parse("WEIGHT.as_of(today)"),
        LogicCriteria::token("WEIGHT").as_of(DateRef::IndexDate)
    );
}

#[test]
fn test_operands() {
    assert_eq!(
        parse("GENDER = 'M'"),
        LogicCriteria::token("GENDER").equal_to("M")
    );
    assert_eq!(
        parse("DEAD = true"),
        LogicCriteria::token("DEAD").equal_to(true)
    );
    assert_eq!(
        parse("PROBLEM LIST CONTAINS \"HIV INFECTED\""),
        LogicCriteria::token("PROBLEM LIST").contains("HIV INFECTED")
    );
    assert_eq!(
        parse("TEMPERATURE > 38.5"),
        LogicCriteria::token("TEMPERATURE").gt(rust_decimal::Decimal::new(385, 1))
    );
    assert_eq!(
        parse("BIRTHDATE < 1990-05-01"),
        LogicCriteria::token("BIRTHDATE").lt(date(1990, 5, 1))
    );
}

#[test]
fn test_boolean_precedence() {
    let expected = LogicCriteria::token("A")
        .or(LogicCriteria::token("B").and(LogicCriteria::token("C")));
    assert_eq!(parse("A OR B AND C"), expected);

    let expected = LogicCriteria::token("A")
        .or(LogicCriteria::token("B"))
        .and(LogicCriteria::token("C"));
    assert_eq!(parse("(A OR B) AND C"), expected);
}

#[test]
fn test_not() {
    assert_eq!(
        parse("NOT @male"),
        LogicCriteria::token("male").not()
    );
    assert_eq!(
        parse("AGE >= 18 AND NOT (GENDER = 'F')"),
        LogicCriteria::token("AGE")
            .gte(18)
            .and(LogicCriteria::token("GENDER").equal_to("F").not())
    );
}

#[test]
fn test_aggregations() {
    let cases = [
        ("X.count", Aggregate::Count),
        ("X.average()", Aggregate::Average),
        ("X.exists", Aggregate::Exists),
        ("X.not_exists", Aggregate::NotExists),
        ("X.distinct", Aggregate::Distinct),
        ("X.first(4)", Aggregate::First(4)),
        ("X.latest", Aggregate::Last(1)),
    ];
    for (text, function) in cases {
        assert_eq!(
            parse(text),
            LogicCriteria::Aggregation {
                source: Box::new(LogicCriteria::token("X")),
                function,
            },
            "{text}"
        );
    }
}

#[test]
fn test_keywords_are_case_insensitive() {
    assert_eq!(parse("a and b"), parse("a AND b"));
    assert_eq!(parse("x.LAST(2)"), parse("x.last(2)"));
}

#[test]
fn test_canonical_form_reparses() {
    let inputs = [
        "LAST {CD4 COUNT} < 200 WITHIN 6 MONTHS",
        "@pharmacy visit.pharmacy",
        "(A OR B) AND NOT C",
        "WEIGHT BETWEEN 2023-01-01 AND 2023-12-31",
        "GENDER = 'M' AND AGE >= 18",
        "X.within.future.days(7).count",
        "WEIGHT.as_of(today).last(3)",
    ];
    for input in inputs {
        let criteria = parse(input);
        let canonical = criteria.to_string();
        assert_eq!(parse(&canonical), criteria, "{input} -> {canonical}");
    }
}

#[test]
fn test_plain_words_fall_back_to_token() {
    assert_eq!(
        parse("HIV VIRAL LOAD, QUALITATIVE"),
        LogicCriteria::token("HIV VIRAL LOAD, QUALITATIVE")
    );
}

#[rstest]
#[case("")]
#[case("x.last(")]
#[case("(A AND B")]
#[case("x > ")]
#[case("x.unknown_method(1)")]
#[case("x.within.past.fortnights(2)")]
#[case("x.before(2024-13-01)")]
#[case("WEIGHT AND")]
#[case("NOT")]
#[case("GENDER OR")]
#[case("CD4 COUNT.last.foo")]
fn test_parse_errors(#[case] text: &str) {
    let error = LogicCriteria::parse(text).unwrap_err();
    assert!(matches!(error, CriteriaError::Parse { .. }), "{text}: {error}");
    assert_eq!(error.expression(), text);
}

#[test]
fn test_structural_errors_surface_as_invalid() {
    let error = LogicCriteria::parse("x.last(0)").unwrap_err();
    assert!(matches!(error, CriteriaError::Invalid { .. }));
}

#[test]
fn test_token_reference_fields() {
    let criteria = parse("@person \"FAMILY NAME\"");
    assert_eq!(
        criteria.root_token(),
        Some(&TokenReference::scoped("person", "FAMILY NAME"))
    );
}

#[test]
fn test_within_clause_direction() {
    assert_eq!(
        parse("VISIT WITHIN FUTURE 2 WEEKS"),
        LogicCriteria::DateConstraint {
            source: Box::new(LogicCriteria::token("VISIT")),
            constraint: DateConstraint::Within {
                direction: Direction::Future,
                duration: Duration::weeks(2.0),
            },
        }
    );
}

//! Criteria expression parser
//!
//! Accepts both the fluent method form (`"CD4 COUNT".last(2).within.past.days(330)`)
//! and the legacy clause form (`LAST {CD4 COUNT} < 200 WITHIN 6 MONTHS`).

use crate::criteria::{
    Aggregate, ComparisonOp, DateConstraint, DateRef, Direction, LogicCriteria, Operand,
};
use crate::error::CriteriaError;
use chrono::{NaiveDate, NaiveDateTime};
use clinlogic_types::{Duration, DurationUnits};
use rust_decimal::Decimal;
use std::str::FromStr;
use winnow::ascii::{Caseless, digit1, multispace0, multispace1};
use winnow::combinator::{alt, cut_err, opt, preceded};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

const METHOD_NAMES: &[&str] = &[
    "last",
    "first",
    "latest",
    "earliest",
    "count",
    "average",
    "avg",
    "exists",
    "not_exists",
    "distinct",
    "within",
    "before",
    "after",
    "as_of",
    "gt",
    "gte",
    "lt",
    "lte",
    "eq",
    "ne",
    "contains",
];

const RESERVED_WORDS: &[&str] = &["and", "or", "not"];

// Characters that can only appear in structured expressions
const GRAMMAR_CHARS: &[char] = &['@', '{', '}', '"', '\'', '<', '>', '=', '!', '(', ')'];

/// Parse a criteria expression.
///
/// Text made only of plain words that does not otherwise parse is taken as a
/// single token name, matching how bare concept names were always accepted.
/// Text using a conjunction, NOT or a method segment never falls back.
pub fn parse(text: &str) -> Result<LogicCriteria, CriteriaError> {
    let criteria = match expression.parse(text) {
        Ok(criteria) => criteria,
        Err(e) => match plain_token(text) {
            Some(criteria) => criteria,
            None => {
                let offset = e.offset();
                let mut message = e.inner().to_string();
                if message.is_empty() {
                    let near: String = text.get(offset..).unwrap_or("").chars().take(24).collect();
                    message = if near.is_empty() {
                        "unexpected end of expression".to_string()
                    } else {
                        format!("unexpected input near '{near}'")
                    };
                }
                return Err(CriteriaError::parse(text, offset, message));
            }
        },
    };
    criteria.validate()?;
    Ok(criteria)
}

fn plain_token(text: &str) -> Option<LogicCriteria> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains(GRAMMAR_CHARS) {
        return None;
    }
    let structured = trimmed.split_whitespace().any(|word| {
        RESERVED_WORDS
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(word))
            || word.split('.').skip(1).any(is_method_name)
    });
    if structured {
        return None;
    }
    Some(LogicCriteria::token(trimmed))
}

enum Condition {
    Compare(ComparisonOp, Operand),
    Date(DateConstraint),
    Between(DateRef, DateRef),
}

impl Condition {
    fn apply(self, criteria: LogicCriteria) -> LogicCriteria {
        match self {
            Condition::Compare(op, operand) => criteria.compare(op, operand),
            Condition::Date(constraint) => criteria.constrain(constraint),
            Condition::Between(start, end) => criteria.between(start, end),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

fn backtrack<T>() -> ModalResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_segment_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ',' | '/' | '%' | '#' | '&' | '+' | ':')
}

fn is_method_name(name: &str) -> bool {
    METHOD_NAMES
        .iter()
        .any(|method| method.eq_ignore_ascii_case(name))
}

/// Case-insensitive keyword that is not the prefix of a longer word
fn kw<'a>(keyword: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        let saved = *input;
        literal(Caseless(keyword)).parse_next(input)?;
        if input.starts_with(is_word_char) {
            *input = saved;
            return backtrack();
        }
        Ok(())
    }
}

fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., is_word_char).parse_next(input)
}

fn nonneg_integer(input: &mut &str) -> ModalResult<usize> {
    let saved = *input;
    let digits = digit1.parse_next(input)?;
    digits.parse::<usize>().map_err(|_| {
        *input = saved;
        ErrMode::Backtrack(ContextError::new())
    })
}

fn number_text<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let text = (opt(literal("-")), digit1, opt((literal("."), digit1)))
        .take()
        .parse_next(input)?;
    if input.starts_with(is_segment_char) {
        return backtrack();
    }
    Ok(text)
}

fn decimal_literal(input: &mut &str) -> ModalResult<Decimal> {
    let text = number_text(input)?;
    Decimal::from_str(text).map_err(|_| ErrMode::Cut(ContextError::new()))
}

fn float_literal(input: &mut &str) -> ModalResult<f64> {
    let text = number_text(input)?;
    text.parse::<f64>()
        .map_err(|_| ErrMode::Cut(ContextError::new()))
}

fn quoted(input: &mut &str, quote: char) -> ModalResult<String> {
    literal(quote).parse_next(input)?;
    let content = take_while(0.., move |c: char| c != quote).parse_next(input)?;
    cut_err(literal(quote))
        .context(expected("closing quote"))
        .parse_next(input)?;
    Ok(content.to_string())
}

fn braced(input: &mut &str) -> ModalResult<String> {
    literal("{").parse_next(input)?;
    let content = take_while(0.., |c: char| c != '}').parse_next(input)?;
    cut_err(literal("}"))
        .context(expected("'}'"))
        .parse_next(input)?;
    let key = content.trim();
    if key.is_empty() {
        return Err(ErrMode::Cut(ContextError::new()));
    }
    Ok(key.to_string())
}

fn close_paren(input: &mut &str) -> ModalResult<()> {
    multispace0.parse_next(input)?;
    cut_err(literal(")"))
        .context(expected("')'"))
        .void()
        .parse_next(input)
}

// ---------------------------------------------------------------------------
// Dates and operands
// ---------------------------------------------------------------------------

fn small_number(input: &mut &str) -> ModalResult<u32> {
    let digits = take_while(1..=2, |c: char| c.is_ascii_digit()).parse_next(input)?;
    digits
        .parse::<u32>()
        .map_err(|_| ErrMode::Cut(ContextError::new()))
}

fn date_literal(input: &mut &str) -> ModalResult<NaiveDateTime> {
    let year = take_while(4, |c: char| c.is_ascii_digit()).parse_next(input)?;
    literal("-").parse_next(input)?;
    let month = small_number(input)?;
    literal("-").parse_next(input)?;
    let day = small_number(input)?;

    let (mut hour, mut minute, mut second) = (0, 0, 0);
    if opt(literal("T")).parse_next(input)?.is_some() {
        hour = cut_err(small_number).context(expected("hour")).parse_next(input)?;
        cut_err(literal(":")).context(expected("':'")).parse_next(input)?;
        minute = cut_err(small_number).context(expected("minute")).parse_next(input)?;
        if opt(literal(":")).parse_next(input)?.is_some() {
            second = cut_err(small_number).context(expected("second")).parse_next(input)?;
        }
    }
    if input.starts_with(is_segment_char) {
        return backtrack();
    }

    let year: i32 = year.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| ErrMode::Cut(ContextError::new()))
}

fn date_ref(input: &mut &str) -> ModalResult<DateRef> {
    if opt(kw("today")).parse_next(input)?.is_some() {
        return Ok(DateRef::IndexDate);
    }
    let quote = opt(alt((literal('\''), literal('"')))).parse_next(input)?;
    let date = date_literal(input)?;
    if let Some(quote) = quote {
        cut_err(literal(quote))
            .context(expected("closing quote"))
            .parse_next(input)?;
    }
    Ok(DateRef::Fixed(date))
}

fn operand(input: &mut &str) -> ModalResult<Operand> {
    if let Some(date) = opt(date_literal).parse_next(input)? {
        return Ok(Operand::Datetime(date));
    }
    if let Some(number) = opt(decimal_literal).parse_next(input)? {
        return Ok(Operand::Numeric(number));
    }
    if input.starts_with('\'') {
        return quoted(input, '\'').map(Operand::Text);
    }
    if input.starts_with('"') {
        return quoted(input, '"').map(Operand::Text);
    }
    if opt(kw("true")).parse_next(input)?.is_some() {
        return Ok(Operand::Boolean(true));
    }
    if opt(kw("false")).parse_next(input)?.is_some() {
        return Ok(Operand::Boolean(false));
    }
    let word = take_while(1.., is_segment_char).parse_next(input)?;
    Ok(Operand::Text(word.to_string()))
}

// ---------------------------------------------------------------------------
// Boolean structure
// ---------------------------------------------------------------------------

fn expression(input: &mut &str) -> ModalResult<LogicCriteria> {
    multispace0.parse_next(input)?;
    let criteria = disjunction(input)?;
    multispace0.parse_next(input)?;
    Ok(criteria)
}

fn disjunction(input: &mut &str) -> ModalResult<LogicCriteria> {
    let mut criteria = conjunction(input)?;
    while opt((multispace0, kw("or"))).parse_next(input)?.is_some() {
        let rhs = cut_err(conjunction)
            .context(expected("criteria after OR"))
            .parse_next(input)?;
        criteria = criteria.or(rhs);
    }
    Ok(criteria)
}

fn conjunction(input: &mut &str) -> ModalResult<LogicCriteria> {
    let mut criteria = unary(input)?;
    while opt((multispace0, kw("and"))).parse_next(input)?.is_some() {
        let rhs = cut_err(unary)
            .context(expected("criteria after AND"))
            .parse_next(input)?;
        criteria = criteria.and(rhs);
    }
    Ok(criteria)
}

fn unary(input: &mut &str) -> ModalResult<LogicCriteria> {
    multispace0.parse_next(input)?;
    if opt(kw("not")).parse_next(input)?.is_some() {
        let inner = cut_err(unary)
            .context(expected("criteria after NOT"))
            .parse_next(input)?;
        return Ok(inner.not());
    }
    clause(input)
}

fn clause(input: &mut &str) -> ModalResult<LogicCriteria> {
    let criteria = if opt(literal("(")).parse_next(input)?.is_some() {
        let inner = expression(input)?;
        cut_err(literal(")"))
            .context(expected("')'"))
            .parse_next(input)?;
        inner
    } else if let Some(prefixed) = opt(prefixed_reference).parse_next(input)? {
        prefixed
    } else {
        reference(input)?
    };
    let criteria = methods(criteria, input)?;
    conditions(criteria, input)
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

fn prefix_word(input: &mut &str) -> ModalResult<Aggregate> {
    let saved = *input;
    let word = ident(input)?;
    let function = match word.to_ascii_lowercase().as_str() {
        "last" | "latest" => Aggregate::Last(1),
        "first" | "earliest" => Aggregate::First(1),
        "exists" | "exist" => Aggregate::Exists,
        "count" => Aggregate::Count,
        "average" | "avg" => Aggregate::Average,
        "distinct" => Aggregate::Distinct,
        _ => {
            *input = saved;
            return backtrack();
        }
    };
    Ok(function)
}

// `LAST 2 FROM {CD4 COUNT}`; the reference must be delimited so that keys
// such as `LAST VISIT DATE` stay plain keys.
fn prefixed_reference(input: &mut &str) -> ModalResult<LogicCriteria> {
    let mut function = prefix_word(input)?;
    if matches!(function, Aggregate::Last(_) | Aggregate::First(_)) {
        let n = opt((multispace1, nonneg_integer, multispace1, kw("from")).map(|(_, n, _, _)| n))
            .parse_next(input)?;
        if let Some(n) = n {
            function = match function {
                Aggregate::First(_) => Aggregate::First(n),
                _ => Aggregate::Last(n),
            };
        }
    }
    multispace1.parse_next(input)?;
    if !input.starts_with(['{', '"', '@']) {
        return backtrack();
    }
    let reference = reference(input)?;
    Ok(reference.aggregate(function))
}

fn reference(input: &mut &str) -> ModalResult<LogicCriteria> {
    if input.starts_with('{') {
        return braced(input).map(LogicCriteria::token);
    }
    if input.starts_with('"') {
        return quoted(input, '"').map(LogicCriteria::token);
    }
    if opt(literal("@")).parse_next(input)?.is_some() {
        return scoped_reference(input);
    }
    key_words(input).map(LogicCriteria::token)
}

// `@source key` or a lone `@key`
fn scoped_reference(input: &mut &str) -> ModalResult<LogicCriteria> {
    let name = cut_err(word)
        .context(expected("source or key after '@'"))
        .parse_next(input)?;
    let checkpoint = *input;
    if opt(multispace1).parse_next(input)?.is_some() && !at_key_boundary(input) {
        let key = if input.starts_with('"') {
            Some(quoted(input, '"')?)
        } else if input.starts_with('{') {
            Some(braced(input)?)
        } else if input.starts_with(is_segment_char) {
            Some(key_words(input)?)
        } else {
            None
        };
        if let Some(key) = key {
            return Ok(LogicCriteria::scoped(name, key));
        }
    }
    *input = checkpoint;
    Ok(LogicCriteria::token(name))
}

fn word(input: &mut &str) -> ModalResult<String> {
    let first = take_while(1.., is_segment_char).parse_next(input)?;
    let mut word = first.to_string();
    while continues_word(input) {
        literal(".").parse_next(input)?;
        let segment = take_while(1.., is_segment_char).parse_next(input)?;
        word.push('.');
        word.push_str(segment);
    }
    Ok(word)
}

fn continues_word(rest: &str) -> bool {
    let Some(after) = rest.strip_prefix('.') else {
        return false;
    };
    let end = after
        .find(|c: char| !is_segment_char(c))
        .unwrap_or(after.len());
    end > 0 && !is_method_name(&after[..end])
}

fn key_words(input: &mut &str) -> ModalResult<String> {
    let mut key = word(input)?;
    loop {
        let checkpoint = *input;
        if opt(multispace1).parse_next(input)?.is_none() {
            break;
        }
        if at_key_boundary(input) || !input.starts_with(is_segment_char) {
            *input = checkpoint;
            break;
        }
        let next = word(input)?;
        key.push(' ');
        key.push_str(&next);
    }
    Ok(key)
}

fn conjunction_keyword(input: &mut &str) -> ModalResult<()> {
    alt((kw("and"), kw("or"))).parse_next(input)
}

fn at_key_boundary(rest: &str) -> bool {
    if rest.is_empty() || rest.starts_with(')') {
        return true;
    }
    let mut probe = rest;
    if conjunction_keyword(&mut probe).is_ok() {
        return true;
    }
    let mut probe = rest;
    condition(&mut probe).is_ok()
}

// ---------------------------------------------------------------------------
// Methods and conditions
// ---------------------------------------------------------------------------

fn methods(mut criteria: LogicCriteria, input: &mut &str) -> ModalResult<LogicCriteria> {
    loop {
        let checkpoint = *input;
        if opt(literal(".")).parse_next(input)?.is_none() {
            return Ok(criteria);
        }
        let Some(name) = opt(ident).parse_next(input)? else {
            *input = checkpoint;
            return Ok(criteria);
        };
        criteria = method_call(criteria, &name.to_ascii_lowercase(), input)?;
    }
}

fn method_call(
    criteria: LogicCriteria,
    name: &str,
    input: &mut &str,
) -> ModalResult<LogicCriteria> {
    let criteria = match name {
        "last" => criteria.last_n(count_argument(input)?),
        "first" => criteria.first_n(count_argument(input)?),
        "latest" => {
            empty_arguments(input)?;
            criteria.last()
        }
        "earliest" => {
            empty_arguments(input)?;
            criteria.first()
        }
        "count" | "average" | "avg" | "exists" | "not_exists" | "distinct" => {
            empty_arguments(input)?;
            let function = match name {
                "count" => Aggregate::Count,
                "average" | "avg" => Aggregate::Average,
                "exists" => Aggregate::Exists,
                "not_exists" => Aggregate::NotExists,
                _ => Aggregate::Distinct,
            };
            criteria.aggregate(function)
        }
        "within" => {
            let (direction, duration) = within_arguments(input)?;
            criteria.within_direction(direction, duration)
        }
        "before" => criteria.before(date_argument(input)?),
        "after" => criteria.after(date_argument(input)?),
        "as_of" => criteria.as_of(date_argument(input)?),
        "gt" | "gte" | "lt" | "lte" | "eq" | "ne" | "contains" => {
            let op = match name {
                "gt" => ComparisonOp::Greater,
                "gte" => ComparisonOp::GreaterOrEqual,
                "lt" => ComparisonOp::Less,
                "lte" => ComparisonOp::LessOrEqual,
                "eq" => ComparisonOp::Equal,
                "ne" => ComparisonOp::NotEqual,
                _ => ComparisonOp::Contains,
            };
            cut_err(literal("("))
                .context(expected("'('"))
                .parse_next(input)?;
            multispace0.parse_next(input)?;
            let operand = cut_err(operand)
                .context(expected("comparison operand"))
                .parse_next(input)?;
            close_paren(input)?;
            criteria.compare(op, operand)
        }
        _ => {
            return Err(ErrMode::Cut(ContextError::new()));
        }
    };
    Ok(criteria)
}

fn count_argument(input: &mut &str) -> ModalResult<usize> {
    if opt(literal("(")).parse_next(input)?.is_none() {
        return Ok(1);
    }
    multispace0.parse_next(input)?;
    let n = if input.starts_with(')') {
        1
    } else {
        cut_err(nonneg_integer)
            .context(expected("node count"))
            .parse_next(input)?
    };
    close_paren(input)?;
    Ok(n)
}

fn empty_arguments(input: &mut &str) -> ModalResult<()> {
    if opt(literal("(")).parse_next(input)?.is_some() {
        close_paren(input)?;
    }
    Ok(())
}

fn date_argument(input: &mut &str) -> ModalResult<DateRef> {
    cut_err(literal("("))
        .context(expected("'('"))
        .parse_next(input)?;
    multispace0.parse_next(input)?;
    let date = cut_err(date_ref)
        .context(expected("date (YYYY-MM-DD) or today"))
        .parse_next(input)?;
    close_paren(input)?;
    Ok(date)
}

// `.within.past.days(330)`, `.within.months(6)`
fn within_arguments(input: &mut &str) -> ModalResult<(Direction, Duration)> {
    cut_err(literal("."))
        .context(expected("'.' after within"))
        .parse_next(input)?;
    let mut name = cut_err(ident)
        .context(expected("direction or duration unit"))
        .parse_next(input)?;
    let direction = match name.to_ascii_lowercase().as_str() {
        "past" => Some(Direction::Past),
        "future" => Some(Direction::Future),
        _ => None,
    };
    if direction.is_some() {
        cut_err(literal("."))
            .context(expected("'.' before duration unit"))
            .parse_next(input)?;
        name = cut_err(ident)
            .context(expected("duration unit"))
            .parse_next(input)?;
    }
    let units =
        DurationUnits::from_str(name).map_err(|_| ErrMode::Cut(ContextError::new()))?;
    cut_err(literal("("))
        .context(expected("'('"))
        .parse_next(input)?;
    multispace0.parse_next(input)?;
    let value = cut_err(float_literal)
        .context(expected("duration length"))
        .parse_next(input)?;
    close_paren(input)?;
    Ok((direction.unwrap_or_default(), Duration::new(value, units)))
}

fn symbol_operator(input: &mut &str) -> ModalResult<ComparisonOp> {
    alt((
        literal(">=").value(ComparisonOp::GreaterOrEqual),
        literal("<=").value(ComparisonOp::LessOrEqual),
        literal("<>").value(ComparisonOp::NotEqual),
        literal("!=").value(ComparisonOp::NotEqual),
        literal("==").value(ComparisonOp::Equal),
        literal("=").value(ComparisonOp::Equal),
        literal(">").value(ComparisonOp::Greater),
        literal("<").value(ComparisonOp::Less),
    ))
    .parse_next(input)
}

fn word_operator(input: &mut &str) -> ModalResult<ComparisonOp> {
    alt((
        kw("gte").value(ComparisonOp::GreaterOrEqual),
        kw("gt").value(ComparisonOp::Greater),
        kw("lte").value(ComparisonOp::LessOrEqual),
        kw("lt").value(ComparisonOp::Less),
        kw("eq").value(ComparisonOp::Equal),
        kw("ne").value(ComparisonOp::NotEqual),
        kw("contains").value(ComparisonOp::Contains),
    ))
    .parse_next(input)
}

fn within_condition(input: &mut &str) -> ModalResult<DateConstraint> {
    kw("within").parse_next(input)?;
    multispace1.parse_next(input)?;
    let mut direction = Direction::Past;
    if opt(kw("past")).parse_next(input)?.is_some() {
        multispace1.parse_next(input)?;
    } else if opt(kw("future")).parse_next(input)?.is_some() {
        direction = Direction::Future;
        multispace1.parse_next(input)?;
    }
    let value = float_literal(input)?;
    multispace1.parse_next(input)?;
    let unit = ident(input)?;
    let Ok(units) = DurationUnits::from_str(unit) else {
        return backtrack();
    };
    Ok(DateConstraint::Within {
        direction,
        duration: Duration::new(value, units),
    })
}

fn condition(input: &mut &str) -> ModalResult<Condition> {
    if let Some(op) = opt(symbol_operator).parse_next(input)? {
        multispace0.parse_next(input)?;
        let operand = cut_err(operand)
            .context(expected("comparison operand"))
            .parse_next(input)?;
        return Ok(Condition::Compare(op, operand));
    }
    if let Some(op) = opt(word_operator).parse_next(input)? {
        multispace1.parse_next(input)?;
        let operand = operand(input)?;
        return Ok(Condition::Compare(op, operand));
    }
    if let Some(constraint) = opt(within_condition).parse_next(input)? {
        return Ok(Condition::Date(constraint));
    }
    if opt(kw("before")).parse_next(input)?.is_some() {
        multispace1.parse_next(input)?;
        return date_ref(input).map(|d| Condition::Date(DateConstraint::Before(d)));
    }
    if opt(kw("after")).parse_next(input)?.is_some() {
        multispace1.parse_next(input)?;
        return date_ref(input).map(|d| Condition::Date(DateConstraint::After(d)));
    }
    if opt((kw("as"), multispace1, kw("of"))).parse_next(input)?.is_some() {
        multispace1.parse_next(input)?;
        return date_ref(input).map(|d| Condition::Date(DateConstraint::AsOf(d)));
    }
    kw("between").parse_next(input)?;
    multispace1.parse_next(input)?;
    let start = date_ref(input)?;
    (multispace1, kw("and"), multispace1).parse_next(input)?;
    let end = date_ref(input)?;
    Ok(Condition::Between(start, end))
}

fn conditions(mut criteria: LogicCriteria, input: &mut &str) -> ModalResult<LogicCriteria> {
    while let Some(condition) = opt(preceded(multispace0, condition)).parse_next(input)? {
        criteria = condition.apply(criteria);
    }
    Ok(criteria)
}

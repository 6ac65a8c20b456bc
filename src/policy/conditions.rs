// ABOUTME: Compiled rule conditions: time windows, IP ranges, device, MFA and attributes
// ABOUTME: Parsing happens at policy load so evaluation never fails
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::context::{lookup_path, EvaluationContext};
use super::document::{AttributeSource, ComparisonOp, Condition};
use chrono::{Datelike, Duration, FixedOffset, NaiveTime, Weekday};
use qtoken_core::errors::{AppError, AppResult};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// CIDR range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    /// Parse `addr/prefix` or a bare address
    ///
    /// # Errors
    ///
    /// Returns `policy-invalid` for unparseable input or out-of-range prefixes
    pub fn parse(cidr: &str) -> AppResult<Self> {
        let invalid = || AppError::policy_invalid(format!("invalid CIDR range '{cidr}'"));
        let (address, prefix) = match cidr.trim().split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (cidr.trim(), None),
        };
        let network: IpAddr = address.parse().map_err(|_| invalid())?;
        let max_prefix = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
            None => max_prefix,
        };
        if prefix > max_prefix {
            return Err(invalid());
        }
        Ok(Self { network, prefix })
    }

    /// Whether `ip` is inside the range; IPv4-mapped IPv6 addresses match IPv4 ranges
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
            IpAddr::V4(_) => ip,
        };
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                prefix_eq(u128::from(u32::from(net)), u128::from(u32::from(addr)), 32, self.prefix)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                prefix_eq(u128::from(net), u128::from(addr), 128, self.prefix)
            }
            _ => false,
        }
    }
}

fn prefix_eq(network: u128, address: u128, width: u8, prefix: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    let shift = u32::from(width - prefix);
    (network >> shift) == (address >> shift)
}

#[derive(Debug, Clone)]
struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
    days: Vec<Weekday>,
    offset: FixedOffset,
}

impl TimeWindow {
    fn holds(&self, context: &EvaluationContext) -> bool {
        let local = context.environment.time.with_timezone(&self.offset);
        let time = local.time();
        let today = local.weekday();

        let (inside, window_day) = if self.start <= self.end {
            (time >= self.start && time < self.end, today)
        } else if time >= self.start {
            (true, today)
        } else {
            // After midnight: the window opened the previous day
            (time < self.end, today.pred())
        };
        inside && (self.days.is_empty() || self.days.contains(&window_day))
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Plain(Value),
    Pattern(Regex),
}

/// How finely a condition reads the evaluation time
///
/// Ordered from coarsest to finest, so a policy's sensitivity is the maximum over its
/// conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeSensitivity {
    /// Outcome does not depend on the time
    #[default]
    Insensitive,
    /// Outcome can only change on a minute boundary
    Minute,
    /// Outcome may change at any instant
    Exact,
}

/// Condition ready for evaluation
#[derive(Debug, Clone)]
pub enum CompiledCondition {
    /// Time-of-day window
    TimeWindow(Box<TimeWindowCondition>),
    /// IP allow/deny ranges
    Ip {
        /// Allowed ranges, empty for any
        allow: Vec<IpRange>,
        /// Denied ranges
        deny: Vec<IpRange>,
    },
    /// Device requirements
    Device {
        /// Required trust state
        trusted: Option<bool>,
        /// Allowed platforms, lowercase
        platforms: Vec<String>,
        /// Required attribute values
        attributes: BTreeMap<String, Value>,
    },
    /// MFA requirements
    Mfa {
        /// MFA must be present
        required: bool,
        /// Allowed methods, lowercase
        methods: Vec<String>,
        /// Maximum MFA age
        max_age: Option<Duration>,
    },
    /// Attribute comparison
    Attribute(Box<AttributeCondition>),
}

/// Compiled time window
#[derive(Debug, Clone)]
pub struct TimeWindowCondition(TimeWindow);

/// Compiled attribute comparison
#[derive(Debug, Clone)]
pub struct AttributeCondition {
    source: AttributeSource,
    key: String,
    op: ComparisonOp,
    operand: Operand,
}

impl CompiledCondition {
    /// Compile a document condition
    ///
    /// # Errors
    ///
    /// Returns `policy-invalid` for bad times, offsets, days, CIDRs, regexes or operands
    pub fn compile(condition: &Condition) -> AppResult<Self> {
        match condition {
            Condition::TimeWindow {
                start,
                end,
                days,
                timezone,
            } => {
                let (start, end) = (parse_time(start)?, parse_time(end)?);
                if start == end {
                    return Err(AppError::policy_invalid(format!(
                        "time window starting and ending at {} is empty",
                        start.format("%H:%M")
                    )));
                }
                Ok(Self::TimeWindow(Box::new(TimeWindowCondition(TimeWindow {
                    start,
                    end,
                    days: days.iter().map(|d| parse_day(d)).collect::<AppResult<_>>()?,
                    offset: parse_offset(timezone.as_deref())?,
                }))))
            }
            Condition::Ip { allow, deny } => {
                if allow.is_empty() && deny.is_empty() {
                    return Err(AppError::policy_invalid(
                        "ip condition needs allow or deny ranges",
                    ));
                }
                Ok(Self::Ip {
                    allow: allow.iter().map(|c| IpRange::parse(c)).collect::<AppResult<_>>()?,
                    deny: deny.iter().map(|c| IpRange::parse(c)).collect::<AppResult<_>>()?,
                })
            }
            Condition::Device {
                trusted,
                platforms,
                attributes,
            } => Ok(Self::Device {
                trusted: *trusted,
                platforms: platforms.iter().map(|p| p.to_ascii_lowercase()).collect(),
                attributes: attributes.clone(),
            }),
            Condition::Mfa {
                required,
                methods,
                max_age_secs,
            } => Ok(Self::Mfa {
                required: *required,
                methods: methods.iter().map(|m| m.to_ascii_lowercase()).collect(),
                max_age: max_age_secs
                    .map(|secs| {
                        i64::try_from(secs)
                            .ok()
                            .and_then(Duration::try_seconds)
                            .ok_or_else(|| AppError::policy_invalid("mfa max_age_secs is too large"))
                    })
                    .transpose()?,
            }),
            Condition::Attribute {
                source,
                key,
                op,
                value,
            } => {
                if key.is_empty() {
                    return Err(AppError::policy_invalid("attribute condition needs a key"));
                }
                Ok(Self::Attribute(Box::new(AttributeCondition {
                    source: *source,
                    key: key.clone(),
                    op: *op,
                    operand: compile_operand(*op, value)?,
                })))
            }
        }
    }

    /// Time resolution this condition needs; windows are bounded in whole minutes
    #[must_use]
    pub const fn time_sensitivity(&self) -> TimeSensitivity {
        match self {
            Self::TimeWindow(_) => TimeSensitivity::Minute,
            Self::Mfa {
                max_age: Some(_), ..
            } => TimeSensitivity::Exact,
            _ => TimeSensitivity::Insensitive,
        }
    }

    /// Evaluate against a context; missing facts fail the condition
    #[must_use]
    pub fn holds(&self, context: &EvaluationContext) -> bool {
        match self {
            Self::TimeWindow(window) => window.0.holds(context),
            Self::Ip { allow, deny } => context.environment.ip.is_some_and(|ip| {
                !deny.iter().any(|range| range.contains(ip))
                    && (allow.is_empty() || allow.iter().any(|range| range.contains(ip)))
            }),
            Self::Device {
                trusted,
                platforms,
                attributes,
            } => device_holds(context, *trusted, platforms, attributes),
            Self::Mfa {
                required,
                methods,
                max_age,
            } => mfa_holds(context, *required, methods, *max_age),
            Self::Attribute(condition) => condition.holds(context),
        }
    }
}

fn device_holds(
    context: &EvaluationContext,
    trusted: Option<bool>,
    platforms: &[String],
    attributes: &BTreeMap<String, Value>,
) -> bool {
    if trusted.is_none() && platforms.is_empty() && attributes.is_empty() {
        return true;
    }
    let Some(device) = &context.environment.device else {
        return false;
    };
    let trust_ok = trusted.is_none_or(|required| device.trusted == required);
    let platform_ok = platforms.is_empty()
        || device
            .platform
            .as_ref()
            .is_some_and(|p| platforms.contains(&p.to_ascii_lowercase()));
    let attributes_ok = attributes
        .iter()
        .all(|(key, expected)| lookup_path(&device.attributes, key) == Some(expected));
    trust_ok && platform_ok && attributes_ok
}

fn mfa_holds(
    context: &EvaluationContext,
    required: bool,
    methods: &[String],
    max_age: Option<Duration>,
) -> bool {
    let Some(mfa) = &context.environment.mfa else {
        return !required;
    };
    let method_ok = methods.is_empty() || methods.contains(&mfa.method.to_ascii_lowercase());
    let age_ok = max_age.is_none_or(|limit| {
        let age = context.environment.time - mfa.authenticated_at;
        age >= Duration::zero() && age <= limit
    });
    method_ok && age_ok
}

impl AttributeCondition {
    fn holds(&self, context: &EvaluationContext) -> bool {
        let root = match self.source {
            AttributeSource::Subject => &context.subject.attributes,
            AttributeSource::Context => &context.attributes,
        };
        let actual = match lookup_path(root, &self.key) {
            Some(value) => value,
            // The subject id is addressable without being copied into attributes
            None if self.source == AttributeSource::Subject && self.key == "id" => {
                return compare(self.op, &Value::String(context.subject.id.clone()), &self.operand);
            }
            None => return false,
        };
        compare(self.op, actual, &self.operand)
    }
}

fn compare(op: ComparisonOp, actual: &Value, operand: &Operand) -> bool {
    match (op, operand) {
        (ComparisonOp::Matches, Operand::Pattern(regex)) => {
            actual.as_str().is_some_and(|s| regex.is_match(s))
        }
        (_, Operand::Pattern(_)) | (ComparisonOp::Matches, Operand::Plain(_)) => false,
        (ComparisonOp::Eq, Operand::Plain(expected)) => values_equal(actual, expected),
        (ComparisonOp::Ne, Operand::Plain(expected)) => !values_equal(actual, expected),
        (ComparisonOp::Gt, Operand::Plain(expected)) => {
            order(actual, expected) == Some(Ordering::Greater)
        }
        (ComparisonOp::Gte, Operand::Plain(expected)) => matches!(
            order(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        (ComparisonOp::Lt, Operand::Plain(expected)) => order(actual, expected) == Some(Ordering::Less),
        (ComparisonOp::Lte, Operand::Plain(expected)) => matches!(
            order(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        (ComparisonOp::In, Operand::Plain(Value::Array(options))) => {
            options.iter().any(|o| values_equal(actual, o))
        }
        (ComparisonOp::NotIn, Operand::Plain(Value::Array(options))) => {
            !options.iter().any(|o| values_equal(actual, o))
        }
        (ComparisonOp::In | ComparisonOp::NotIn, Operand::Plain(_)) => false,
        (ComparisonOp::Contains, Operand::Plain(expected)) => match actual {
            Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
            Value::String(haystack) => expected.as_str().is_some_and(|n| haystack.contains(n)),
            _ => false,
        },
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compile_operand(op: ComparisonOp, value: &Value) -> AppResult<Operand> {
    match op {
        ComparisonOp::Matches => {
            let pattern = value
                .as_str()
                .ok_or_else(|| AppError::policy_invalid("matches operand must be a string"))?;
            Regex::new(pattern)
                .map(Operand::Pattern)
                .map_err(|e| AppError::policy_invalid(format!("invalid regex '{pattern}': {e}")))
        }
        ComparisonOp::In | ComparisonOp::NotIn if !value.is_array() => Err(
            AppError::policy_invalid("in/not_in operand must be a list"),
        ),
        _ => Ok(Operand::Plain(value.clone())),
    }
}

fn parse_time(text: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .map_err(|_| AppError::policy_invalid(format!("invalid time '{text}', expected HH:MM")))
}

fn parse_day(text: &str) -> AppResult<Weekday> {
    text.trim()
        .parse::<Weekday>()
        .map_err(|_| AppError::policy_invalid(format!("invalid day of week '{text}'")))
}

fn parse_offset(timezone: Option<&str>) -> AppResult<FixedOffset> {
    let utc = FixedOffset::east_opt(0).ok_or_else(|| AppError::internal("zero offset"))?;
    let Some(raw) = timezone.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(utc);
    };
    if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
        return Ok(utc);
    }
    raw.parse::<FixedOffset>()
        .map_err(|_| AppError::policy_invalid(format!("invalid UTC offset '{raw}'")))
}

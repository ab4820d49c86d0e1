use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::data::HeaderValue;
use crate::error::QcError;

/// Acceptance policy for a single header keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptanceRule {
    /// Any value is acceptable; the keyword is reported but never judged.
    Unconstrained,
    /// Value must lie strictly inside the open interval (low, high).
    NumericRange { low: f64, high: f64 },
    /// Value must equal the expected string exactly.
    ExactMatch(String),
}

/// An ordered set of keyword acceptance rules, loaded from a YAML mapping.
///
/// The YAML shape is `KEYWORD: "None"` (unconstrained), `KEYWORD: [low, high]`
/// (open numeric range) or `KEYWORD: [expected]` (exact string match).
/// Declaration order is preserved and drives the order of the evaluation
/// output.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<(String, AcceptanceRule)>,
}

impl RuleSet {
    pub fn from_file(path: &Path) -> Result<Self, QcError> {
        let src = std::fs::read_to_string(path).map_err(|e| QcError::Params {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&src, path)
    }

    /// Parse a rule set from YAML text. `origin` is only used in error
    /// messages.
    pub fn from_yaml_str(src: &str, origin: &Path) -> Result<Self, QcError> {
        let params = |reason: String| QcError::Params {
            path: origin.to_path_buf(),
            reason,
        };

        let mapping: serde_yaml::Mapping =
            serde_yaml::from_str(src).map_err(|e| params(e.to_string()))?;

        let mut rules: Vec<(String, AcceptanceRule)> = Vec::with_capacity(mapping.len());
        for (key, value) in &mapping {
            let keyword = key
                .as_str()
                .ok_or_else(|| params(format!("non-string keyword: {:?}", key)))?
                .to_string();
            if rules.iter().any(|(k, _)| k == &keyword) {
                return Err(params(format!("duplicate keyword '{}'", keyword)));
            }
            let rule = parse_rule(value)
                .ok_or_else(|| params(format!("unsupported rule shape for '{}'", keyword)))?;
            rules.push((keyword, rule));
        }
        Ok(RuleSet { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, AcceptanceRule)> {
        self.rules.iter()
    }
}

fn parse_rule(value: &serde_yaml::Value) -> Option<AcceptanceRule> {
    use serde_yaml::Value;

    match value {
        // The historical rule files spell "no constraint" as the literal
        // string None; a YAML null means the same thing.
        Value::String(s) if s == "None" => Some(AcceptanceRule::Unconstrained),
        Value::Null => Some(AcceptanceRule::Unconstrained),
        Value::Sequence(seq) => match seq.as_slice() {
            [low, high] => Some(AcceptanceRule::NumericRange {
                low: low.as_f64()?,
                high: high.as_f64()?,
            }),
            [expected] => Some(AcceptanceRule::ExactMatch(expected.as_str()?.to_string())),
            _ => None,
        },
        _ => None,
    }
}

/// Outcome of judging one observed value against its rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    /// The rule is unconstrained or the value is absent.
    NotApplicable,
    /// The observed value's type disagrees with the declared rule shape.
    Mismatch,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "true",
            Verdict::Fail => "false",
            Verdict::NotApplicable => "N/A",
            Verdict::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of a header check table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub keyword: String,
    pub value: HeaderValue,
    pub verdict: Verdict,
}

impl CheckResult {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.keyword.clone(),
            self.value.to_string(),
            self.verdict.to_string(),
        ]
    }
}

/// Judge every keyword declared by `rules` against the observed header
/// values. Pure function: no I/O, output order follows rule declaration
/// order. Keywords missing from `observed` are treated as absent values.
pub fn evaluate(rules: &RuleSet, observed: &HashMap<String, HeaderValue>) -> Vec<CheckResult> {
    rules
        .iter()
        .map(|(keyword, rule)| {
            let value = observed
                .get(keyword)
                .cloned()
                .unwrap_or(HeaderValue::Missing);
            let verdict = apply_rule(rule, &value);
            CheckResult {
                keyword: keyword.clone(),
                value,
                verdict,
            }
        })
        .collect()
}

fn apply_rule(rule: &AcceptanceRule, value: &HeaderValue) -> Verdict {
    match rule {
        AcceptanceRule::Unconstrained => Verdict::NotApplicable,
        AcceptanceRule::NumericRange { low, high } => match value {
            // Open interval: values sitting exactly on a bound fail.
            HeaderValue::Number(v) => {
                if *low < *v && *v < *high {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                }
            }
            HeaderValue::Missing => Verdict::NotApplicable,
            HeaderValue::Text(_) => Verdict::Mismatch,
        },
        AcceptanceRule::ExactMatch(expected) => match value {
            HeaderValue::Text(s) => {
                if s == expected {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                }
            }
            HeaderValue::Missing => Verdict::NotApplicable,
            HeaderValue::Number(_) => Verdict::Mismatch,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_rules() -> RuleSet {
        RuleSet::from_yaml_str(
            "CCDTEMP: [-10, 50]\nDETECTOR: [RED]\n",
            Path::new("test.yml"),
        )
        .unwrap()
    }

    fn observed(pairs: &[(&str, HeaderValue)]) -> HashMap<String, HeaderValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_rule_shapes() {
        let rules = RuleSet::from_yaml_str(
            "EXPTIME: [0, 3600]\nOBSMODE: [LIFU]\nOBSERVER: \"None\"\nCOMMENT2:\n",
            Path::new("test.yml"),
        )
        .unwrap();
        let parsed: Vec<_> = rules.iter().cloned().collect();
        assert_eq!(
            parsed[0],
            (
                "EXPTIME".to_string(),
                AcceptanceRule::NumericRange {
                    low: 0.0,
                    high: 3600.0
                }
            )
        );
        assert_eq!(
            parsed[1],
            (
                "OBSMODE".to_string(),
                AcceptanceRule::ExactMatch("LIFU".to_string())
            )
        );
        assert_eq!(
            parsed[2],
            ("OBSERVER".to_string(), AcceptanceRule::Unconstrained)
        );
        assert_eq!(
            parsed[3],
            ("COMMENT2".to_string(), AcceptanceRule::Unconstrained)
        );
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(RuleSet::from_yaml_str("KEY: [1, 2, 3]\n", Path::new("t.yml")).is_err());
        assert!(RuleSet::from_yaml_str("KEY: 5\n", Path::new("t.yml")).is_err());
        assert!(RuleSet::from_yaml_str("KEY: [a, b]\n", Path::new("t.yml")).is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_keyword() {
        let err = RuleSet::from_yaml_str("KEY: [0, 1]\nKEY: [2, 3]\n", Path::new("t.yml"));
        assert!(err.is_err());
    }

    #[test]
    fn test_scenario_all_pass() {
        let rules = scenario_rules();
        let obs = observed(&[
            ("CCDTEMP", HeaderValue::Number(23.5)),
            ("DETECTOR", HeaderValue::Text("RED".to_string())),
        ]);
        let results = evaluate(&rules, &obs);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].keyword, "CCDTEMP");
        assert_eq!(results[0].verdict, Verdict::Pass);
        assert_eq!(results[1].keyword, "DETECTOR");
        assert_eq!(results[1].verdict, Verdict::Pass);
    }

    #[test]
    fn test_scenario_boundary_and_mismatch_fail() {
        let rules = scenario_rules();
        let obs = observed(&[
            ("CCDTEMP", HeaderValue::Number(50.0)),
            ("DETECTOR", HeaderValue::Text("BLUE".to_string())),
        ]);
        let results = evaluate(&rules, &obs);
        assert_eq!(results[0].verdict, Verdict::Fail);
        assert_eq!(results[1].verdict, Verdict::Fail);
    }

    #[test]
    fn test_open_interval_is_strict() {
        let rule = AcceptanceRule::NumericRange {
            low: -10.0,
            high: 50.0,
        };
        assert_eq!(
            apply_rule(&rule, &HeaderValue::Number(-10.0)),
            Verdict::Fail
        );
        assert_eq!(apply_rule(&rule, &HeaderValue::Number(50.0)), Verdict::Fail);
        assert_eq!(
            apply_rule(&rule, &HeaderValue::Number(-9.999)),
            Verdict::Pass
        );
        assert_eq!(
            apply_rule(&rule, &HeaderValue::Number(49.999)),
            Verdict::Pass
        );
        assert_eq!(apply_rule(&rule, &HeaderValue::Number(60.0)), Verdict::Fail);
    }

    #[test]
    fn test_unconstrained_is_always_not_applicable() {
        let rule = AcceptanceRule::Unconstrained;
        assert_eq!(
            apply_rule(&rule, &HeaderValue::Number(1e30)),
            Verdict::NotApplicable
        );
        assert_eq!(
            apply_rule(&rule, &HeaderValue::Text("anything".to_string())),
            Verdict::NotApplicable
        );
        assert_eq!(
            apply_rule(&rule, &HeaderValue::Missing),
            Verdict::NotApplicable
        );
    }

    #[test]
    fn test_type_mismatch_is_tagged_not_judged() {
        let range = AcceptanceRule::NumericRange {
            low: 0.0,
            high: 1.0,
        };
        assert_eq!(
            apply_rule(&range, &HeaderValue::Text("0.5".to_string())),
            Verdict::Mismatch
        );
        let exact = AcceptanceRule::ExactMatch("RED".to_string());
        assert_eq!(
            apply_rule(&exact, &HeaderValue::Number(3.0)),
            Verdict::Mismatch
        );
    }

    #[test]
    fn test_missing_value_is_not_applicable() {
        let rules = scenario_rules();
        let results = evaluate(&rules, &HashMap::new());
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| r.verdict == Verdict::NotApplicable && r.value == HeaderValue::Missing));
    }

    #[test]
    fn test_output_preserves_rule_order() {
        let rules = RuleSet::from_yaml_str(
            "ZKEY: [0, 1]\nAKEY: [0, 1]\nMKEY: [0, 1]\n",
            Path::new("t.yml"),
        )
        .unwrap();
        let results = evaluate(&rules, &HashMap::new());
        let order: Vec<_> = results.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(order, vec!["ZKEY", "AKEY", "MKEY"]);
    }

    #[test]
    fn test_check_result_row_shape() {
        let result = CheckResult {
            keyword: "CCDTEMP".to_string(),
            value: HeaderValue::Number(23.5),
            verdict: Verdict::Pass,
        };
        assert_eq!(result.to_row(), vec!["CCDTEMP", "23.5", "true"]);
    }
}

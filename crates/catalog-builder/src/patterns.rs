//! Filename pattern parsing.
//!
//! Model output filenames embed dates (`ocean_month.1991-01.nc`,
//! `iceh.057-daily.nc`) that differ between otherwise identical streams.
//! A [`PatternSet`] turns a filename into a stable grouping key (`file_id`)
//! by replacing every digit of the date spans with a fill character, and
//! reports the date text and a frequency hint on the way.
//!
//! Patterns are tried in order and the first match wins. Each pattern names
//! its capture groups and gives each a [`GroupRole`]: exactly one group is
//! the timestamp, any number are redact-only. Both kinds are redacted.

use regex::Regex;
use serde::{Deserialize, Serialize};

use catalog_common::Frequency;

use crate::error::{BuildError, Result};

/// Role of a named capture group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    /// Redacted and returned as the filename timestamp
    Timestamp,
    /// Redacted only
    RedactOnly,
}

/// A named capture group and its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternGroup {
    pub name: String,
    pub role: GroupRole,
}

/// Serializable form of a filename pattern, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub regex: String,
    pub groups: Vec<PatternGroup>,
}

impl PatternSpec {
    /// A pattern whose only group, `timestamp`, is the timestamp.
    pub fn timestamp(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            groups: vec![PatternGroup {
                name: "timestamp".to_string(),
                role: GroupRole::Timestamp,
            }],
        }
    }
}

/// Serializable frequency rule: a regex searched in the filename and the
/// frequency it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRuleSpec {
    pub regex: String,
    pub frequency: String,
}

/// A compiled filename pattern.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    regex: Regex,
    groups: Vec<PatternGroup>,
}

impl FilenamePattern {
    pub fn compile(spec: &PatternSpec) -> Result<Self> {
        let regex = Regex::new(&spec.regex)
            .map_err(|e| BuildError::InvalidPattern(format!("{}: {}", spec.regex, e)))?;

        let names: Vec<&str> = regex.capture_names().flatten().collect();
        for group in &spec.groups {
            if !names.contains(&group.name.as_str()) {
                return Err(BuildError::InvalidPattern(format!(
                    "{}: no capture group named '{}'",
                    spec.regex, group.name
                )));
            }
        }
        let timestamps = spec
            .groups
            .iter()
            .filter(|g| g.role == GroupRole::Timestamp)
            .count();
        if timestamps != 1 {
            return Err(BuildError::InvalidPattern(format!(
                "{}: expected exactly one timestamp group, found {}",
                spec.regex, timestamps
            )));
        }

        Ok(Self {
            regex,
            groups: spec.groups.clone(),
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// A compiled frequency rule.
#[derive(Debug, Clone)]
pub struct FrequencyRule {
    regex: Regex,
    frequency: Frequency,
}

impl FrequencyRule {
    pub fn compile(spec: &FrequencyRuleSpec) -> Result<Self> {
        let regex = Regex::new(&spec.regex)
            .map_err(|e| BuildError::InvalidPattern(format!("{}: {}", spec.regex, e)))?;
        let frequency = spec
            .frequency
            .parse()
            .map_err(|e| BuildError::InvalidPattern(format!("{}: {}", spec.regex, e)))?;
        Ok(Self { regex, frequency })
    }
}

/// Outcome of parsing one filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub file_id: String,
    pub timestamp: Option<String>,
    pub frequency: Option<Frequency>,
}

/// Ordered filename patterns, frequency rules and the fill character.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<FilenamePattern>,
    frequency_rules: Vec<FrequencyRule>,
    fill_char: char,
}

impl PatternSet {
    pub fn new(
        patterns: Vec<FilenamePattern>,
        frequency_rules: Vec<FrequencyRule>,
        fill_char: char,
    ) -> Result<Self> {
        if fill_char.is_ascii_digit() || matches!(fill_char, '-' | '.' | '_') {
            return Err(BuildError::InvalidPattern(format!(
                "fill character '{}' would not survive normalization",
                fill_char
            )));
        }
        Ok(Self {
            patterns,
            frequency_rules,
            fill_char,
        })
    }

    pub fn from_specs(
        patterns: &[PatternSpec],
        frequency_rules: &[FrequencyRuleSpec],
        fill_char: char,
    ) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(FilenamePattern::compile)
            .collect::<Result<Vec<_>>>()?;
        let frequency_rules = frequency_rules
            .iter()
            .map(FrequencyRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Self::new(patterns, frequency_rules, fill_char)
    }

    pub fn fill_char(&self) -> char {
        self.fill_char
    }

    pub fn parse(&self, filename: &str) -> ParsedFilename {
        parse_filename(filename, &self.patterns, &self.frequency_rules, self.fill_char)
    }
}

/// Derive `(file_id, timestamp, frequency)` from a filename.
pub fn parse_filename(
    filename: &str,
    patterns: &[FilenamePattern],
    frequency_rules: &[FrequencyRule],
    fill_char: char,
) -> ParsedFilename {
    let frequency = frequency_rules
        .iter()
        .find(|rule| rule.regex.is_match(filename))
        .map(|rule| rule.frequency);

    let mut redacted = filename.to_string();
    let mut timestamp = None;

    for pattern in patterns {
        let Some(caps) = pattern.regex.captures(filename) else {
            continue;
        };

        let mut spans: Vec<(usize, usize)> = Vec::new();
        for group in &pattern.groups {
            if let Some(m) = caps.name(&group.name) {
                spans.push((m.start(), m.end()));
                // an already redacted span is not a timestamp
                let dated = m.as_str().contains(|c: char| c.is_ascii_digit());
                if group.role == GroupRole::Timestamp && dated {
                    timestamp = Some(m.as_str().to_string());
                }
            }
        }
        redacted = redact_spans(filename, &spans, fill_char);
        break;
    }

    ParsedFilename {
        file_id: normalize_separators(&redacted),
        timestamp,
        frequency,
    }
}

fn redact_spans(text: &str, spans: &[(usize, usize)], fill_char: char) -> String {
    text.char_indices()
        .map(|(idx, c)| {
            let inside = spans.iter().any(|(start, end)| idx >= *start && idx < *end);
            if inside && c.is_ascii_digit() {
                fill_char
            } else {
                c
            }
        })
        .collect()
}

/// Replace `-` and `.` with `_`, collapse runs of `_` and trim `_` from
/// both ends.
pub fn normalize_separators(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c == '-' || c == '.' { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// Date spans most specific first: `YYYY-MM-DD`, `YYYY-MM`, 8 and 6 digit
/// compact dates, then bare 4, 3 and 2 digit runs. Each only matches a
/// run that is not part of a longer one, and the rightmost wins.
///
/// A run is made of digits or `fill_char`, so a redacted filename parses
/// back to itself.
pub fn default_patterns(fill_char: char) -> Vec<PatternSpec> {
    let fill = regex::escape(&fill_char.to_string());
    let d = format!("[0-9{}]", fill);
    let boundary = format!("[^0-9{}]", fill);
    [
        format!("{d}{{4}}[-_]{d}{{2}}[-_]{d}{{2}}"),
        format!("{d}{{4}}[-_]{d}{{2}}"),
        format!("{d}{{8}}"),
        format!("{d}{{6}}"),
        format!("{d}{{4}}"),
        format!("{d}{{3}}"),
        format!("{d}{{2}}"),
    ]
    .iter()
    .map(|span| {
        PatternSpec::timestamp(format!(
            "^(?:.*{b})?(?P<timestamp>{span})(?:{b}.*)?$",
            b = boundary,
            span = span
        ))
    })
    .collect()
}

pub fn default_frequency_rules() -> Vec<FrequencyRuleSpec> {
    [
        (r"(?i)3hr|3hourly|3-hourly", "3hr"),
        (r"(?i)6hr|6hourly|6-hourly", "6hr"),
        (r"(?i)daily|_dai\b|_1day\b", "1day"),
        (r"(?i)monthly|month|_mon\b|_m\.", "1mon"),
        (r"(?i)yearly|annual|_ann\b|_1yr\b", "1yr"),
    ]
    .iter()
    .map(|(regex, frequency)| FrequencyRuleSpec {
        regex: regex.to_string(),
        frequency: frequency.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_common::FrequencyUnit;

    fn defaults() -> PatternSet {
        PatternSet::from_specs(&default_patterns('X'), &default_frequency_rules(), 'X').unwrap()
    }

    #[test]
    fn test_iceh_example() {
        let set = PatternSet::from_specs(
            &[PatternSpec {
                regex: r"^iceh.*\.(?P<ts>\d{4}-\d{2})$".into(),
                groups: vec![PatternGroup {
                    name: "ts".into(),
                    role: GroupRole::Timestamp,
                }],
            }],
            &[],
            'X',
        )
        .unwrap();

        let parsed = set.parse("iceh.1991-01");
        assert_eq!(parsed.file_id, "iceh_XXXX_XX");
        assert_eq!(parsed.timestamp.as_deref(), Some("1991-01"));
        assert_eq!(parsed.frequency, None);
    }

    #[test]
    fn test_no_match_is_normalized_copy() {
        let set =
            PatternSet::from_specs(&[PatternSpec::timestamp(r"^(?P<timestamp>\d{4})$")], &[], 'X')
                .unwrap();
        let parsed = set.parse("-ocean..grid-1-");
        assert_eq!(parsed.file_id, "ocean_grid_1");
        assert_eq!(parsed.timestamp, None);
    }

    #[test]
    fn test_redact_only_groups() {
        let set = PatternSet::from_specs(
            &[PatternSpec {
                regex: r"^(?P<exp>[a-z]+\d+)\.pm(?P<date>\d{6})_mon$".into(),
                groups: vec![
                    PatternGroup {
                        name: "date".into(),
                        role: GroupRole::Timestamp,
                    },
                    PatternGroup {
                        name: "exp".into(),
                        role: GroupRole::RedactOnly,
                    },
                ],
            }],
            &default_frequency_rules(),
            'X',
        )
        .unwrap();

        let parsed = set.parse("bz687.pm107912_mon");
        assert_eq!(parsed.file_id, "bzXXX_pmXXXXXX_mon");
        assert_eq!(parsed.timestamp.as_deref(), Some("107912"));
        assert_eq!(
            parsed.frequency,
            Some(Frequency::periodic(1, FrequencyUnit::Month))
        );
    }

    #[test]
    fn test_default_patterns_on_model_output() {
        let set = defaults();
        let cases = [
            (
                "ocean-3d-v-1-monthly-pow02-ym_1958_04",
                "ocean_3d_v_1_monthly_pow02_ym_XXXX_XX",
                "1958_04",
            ),
            ("iceh.057-daily", "iceh_XXX_daily", "057"),
            (
                "oceanbgc-3d-caco3-1-yearly-mean-y_2015",
                "oceanbgc_3d_caco3_1_yearly_mean_y_XXXX",
                "2015",
            ),
            ("iceh_m.2014-06", "iceh_m_XXXX_XX", "2014-06"),
            ("ocean_daily.nc-02531231", "ocean_daily_nc_XXXXXXXX", "02531231"),
        ];
        for (filename, file_id, timestamp) in cases {
            let parsed = set.parse(filename);
            assert_eq!(parsed.file_id, file_id, "file_id of {}", filename);
            assert_eq!(parsed.timestamp.as_deref(), Some(timestamp), "timestamp of {}", filename);
        }
    }

    #[test]
    fn test_frequency_first_rule_wins() {
        let set = defaults();
        assert_eq!(
            set.parse("iceh.057-daily").frequency,
            Some(Frequency::periodic(1, FrequencyUnit::Day))
        );
        assert_eq!(
            set.parse("ocean_3hourly_monthly_means").frequency,
            Some(Frequency::periodic(3, FrequencyUnit::Hour))
        );
        assert_eq!(set.parse("ocean_grid").frequency, None);
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let set = defaults();
        for filename in [
            "iceh.1991-01",
            "ocean_month_1900_01_01",
            "ice_057",
            "plain",
            "ocean-3d-v-1-monthly-pow02-ym_1958_04",
            "bz687a.pm107912_mon",
            "ocean_daily.nc-02531231",
            "oceanbgc-3d-caco3-1-yearly-mean-y_2015",
        ] {
            let once = set.parse(filename).file_id;
            let twice = set.parse(&once);
            assert_eq!(once, twice.file_id, "redacting {} twice", filename);
            assert_eq!(twice.timestamp, None, "timestamp of {}", once);
        }
    }

    #[test]
    fn test_redaction_is_idempotent_with_custom_fill() {
        let set = PatternSet::from_specs(&default_patterns('#'), &default_frequency_rules(), '#')
            .unwrap();
        let once = set.parse("bz687a.pm107912_mon").file_id;
        assert_eq!(once, "bz687a_pm######_mon");
        assert_eq!(set.parse(&once).file_id, once);

        // the default 'X' class does not cover another fill char
        let mismatched =
            PatternSet::from_specs(&default_patterns('X'), &default_frequency_rules(), '#')
                .unwrap();
        assert_eq!(mismatched.parse(&once).file_id, "bz###a_pm######_mon");
    }

    #[test]
    fn test_redacted_spans_hold_no_digits() {
        let set = defaults();
        for filename in ["a1b2c3_2001-02-03", "x_123456", "run42_1999", "ocean_12"] {
            let parsed = set.parse(filename);
            let ts = parsed.timestamp.expect("default patterns match any 2+ digit run");
            let redacted: String = ts
                .chars()
                .map(|c| if c.is_ascii_digit() { 'X' } else { c })
                .collect();
            let redacted = normalize_separators(&redacted);
            assert!(parsed.file_id.contains(&redacted), "{} -> {}", filename, parsed.file_id);
        }
    }

    #[test]
    fn test_invalid_pattern_specs() {
        // no timestamp group
        let spec = PatternSpec {
            regex: r"^(?P<a>\d+)$".into(),
            groups: vec![PatternGroup {
                name: "a".into(),
                role: GroupRole::RedactOnly,
            }],
        };
        assert!(FilenamePattern::compile(&spec).is_err());

        // group not in regex
        let spec = PatternSpec::timestamp(r"^(?P<ts>\d+)$");
        assert!(FilenamePattern::compile(&spec).is_err());

        // fill char would be normalized away
        assert!(PatternSet::from_specs(&[], &[], '_').is_err());
        assert!(PatternSet::from_specs(&[], &[], '7').is_err());
    }

    #[test]
    fn test_normalize_separators() {
        assert_eq!(normalize_separators("__a--b..c__"), "a_b_c");
        assert_eq!(normalize_separators("abc"), "abc");
        assert_eq!(normalize_separators("---"), "");
    }
}

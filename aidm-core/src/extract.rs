//! Pulling structured values out of generated prose.
//!
//! Everything the engine learns from the generator (enemy stats, roll
//! options, rewards, character sheets) passes through here. The primitive
//! is [`extract`], a label/delimiter slice. On top of it sit tolerant,
//! line-oriented helpers that accept the usual decoration a model adds
//! (bullets, bold markers, `=` instead of `:`). None of them guess: a
//! value that is absent or not a number is an [`ExtractionError`].

use thiserror::Error;

/// Error type for field extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Label '{label}' not found")]
    MissingLabel { label: String },

    #[error("Value for '{label}' is empty")]
    EmptyValue { label: String },

    #[error("Value for '{label}' ends before it starts")]
    InvalidRange { label: String },

    #[error("Value for '{label}' is not a number: '{value}'")]
    NotANumber { label: String, value: String },

    #[error("'{attribute}' is not one of the game's attributes")]
    UnknownAttribute { attribute: String },

    #[error("No attribute named in parentheses")]
    MissingAttribute,

    #[error("No requirement number after '>'")]
    MissingRequirement,

    #[error("Section '{section}' not found")]
    MissingSection { section: String },
}

fn missing(label: &str) -> ExtractionError {
    ExtractionError::MissingLabel {
        label: label.to_string(),
    }
}

/// How [`extract_with`] finds the edges of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimit<'a> {
    /// Characters to skip after the label (2 skips `": "`).
    pub start_shift: usize,
    /// The value ends at the first occurrence of this after the start.
    pub end_delim: &'a str,
    /// Characters to move the end by, relative to the delimiter.
    pub end_shift: isize,
}

impl Default for Delimit<'_> {
    fn default() -> Self {
        Self {
            start_shift: 2,
            end_delim: "\n",
            end_shift: 0,
        }
    }
}

impl<'a> Delimit<'a> {
    pub fn start_shift(mut self, shift: usize) -> Self {
        self.start_shift = shift;
        self
    }

    pub fn end_delim(mut self, delim: &'a str) -> Self {
        self.end_delim = delim;
        self
    }

    pub fn end_shift(mut self, shift: isize) -> Self {
        self.end_shift = shift;
        self
    }
}

/// The substring after the first `label`, skipping `": "`, up to the end of the line.
pub fn extract<'t>(text: &'t str, label: &str) -> Result<&'t str, ExtractionError> {
    extract_with(text, label, Delimit::default())
}

/// The substring after the first `label`.
///
/// The start is `start_shift` characters past the end of the label; the end
/// is the first `end_delim` at or after the start, moved by `end_shift`
/// characters. When the delimiter never occurs the value runs to the end of
/// `text`. Shifts count characters, not bytes.
pub fn extract_with<'t>(
    text: &'t str,
    label: &str,
    delimit: Delimit<'_>,
) -> Result<&'t str, ExtractionError> {
    let found = text.find(label).ok_or_else(|| missing(label))?;
    let after = found + label.len();

    let invalid = || ExtractionError::InvalidRange {
        label: label.to_string(),
    };

    let start = advance(text, after, delimit.start_shift).ok_or_else(invalid)?;

    let delim_at = text[start..]
        .find(delimit.end_delim)
        .map(|i| start + i)
        .unwrap_or(text.len());

    let end = match delimit.end_shift {
        s if s >= 0 => advance(text, delim_at, s.unsigned_abs()).unwrap_or(text.len()),
        s => retreat(text, delim_at, s.unsigned_abs()).ok_or_else(invalid)?,
    };

    if end < start {
        return Err(invalid());
    }
    Ok(&text[start..end])
}

/// Byte offset `chars` characters after `from`, or `None` past the end.
fn advance(text: &str, from: usize, chars: usize) -> Option<usize> {
    let rest = &text[from..];
    match rest.char_indices().nth(chars) {
        Some((i, _)) => Some(from + i),
        None if rest.chars().count() == chars => Some(text.len()),
        None => None,
    }
}

/// Byte offset `chars` characters before `from`.
fn retreat(text: &str, from: usize, chars: usize) -> Option<usize> {
    if chars == 0 {
        return Some(from);
    }
    text[..from].char_indices().rev().nth(chars - 1).map(|(i, _)| i)
}

/// ASCII case-insensitive `find`.
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Lines of `text` paired with their byte offset.
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split('\n').map(move |line| {
        let start = offset;
        offset += line.len() + 1;
        (start, line.strip_suffix('\r').unwrap_or(line))
    })
}

/// Strip list bullets, quote markers, headings and emphasis from the start of a line.
fn undecorate(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '-' | '#' | '>' | '_' | '"' | '`' | '•')
    })
}

/// Whatever follows a label: optional emphasis, then `:` or `=`.
fn after_separator(rest: &str) -> Option<&str> {
    let rest = rest.trim_start_matches(|c: char| c == '*' || c == '_' || c == ' ' || c == '\t');
    let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('='))?;
    Some(rest.trim_start_matches(|c: char| c == '*' || c == '_'))
}

fn clean_value(value: &str) -> &str {
    value
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c == '"' || c == '`')
        .trim()
}

/// Value of the first line that starts with `label` followed by `:` or `=`.
///
/// The label match ignores ASCII case and leading decoration. Lines whose
/// value is empty are skipped in favor of a later non-empty one.
pub fn labeled_value<'t>(text: &'t str, label: &str) -> Result<&'t str, ExtractionError> {
    let mut saw_empty = false;

    for (_, line) in lines_with_offsets(text) {
        let line = undecorate(line);
        let Some(prefix) = line.get(..label.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(label) {
            continue;
        }
        let Some(value) = after_separator(&line[label.len()..]) else {
            continue;
        };
        let value = clean_value(value);
        if value.is_empty() {
            saw_empty = true;
            continue;
        }
        return Ok(value);
    }

    if saw_empty {
        Err(ExtractionError::EmptyValue {
            label: label.to_string(),
        })
    } else {
        Err(missing(label))
    }
}

/// The first signed integer at the start of `value`, e.g. `60` in `60 (thick hide)`.
pub fn leading_int(value: &str) -> Option<i32> {
    let value = value.trim_start();
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest.trim_start()),
        None => (1, value.strip_prefix('+').unwrap_or(value).trim_start()),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i32>().ok().map(|n| sign * n)
}

/// Integer value of a labeled line.
pub fn labeled_int(text: &str, label: &str) -> Result<i32, ExtractionError> {
    let value = labeled_value(text, label)?;
    leading_int(value).ok_or_else(|| ExtractionError::NotANumber {
        label: label.to_string(),
        value: value.to_string(),
    })
}

/// Non-negative integer value of a labeled line.
pub fn labeled_count(text: &str, label: &str) -> Result<u32, ExtractionError> {
    let n = labeled_int(text, label)?;
    u32::try_from(n).map_err(|_| ExtractionError::NotANumber {
        label: label.to_string(),
        value: n.to_string(),
    })
}

/// Text from the line containing `start` up to (not including) the line
/// containing `end`, or to the end of `text` if `end` never follows.
pub fn section<'t>(text: &'t str, start: &str, end: Option<&str>) -> Result<&'t str, ExtractionError> {
    let found = find_ignore_case(text, start).ok_or_else(|| ExtractionError::MissingSection {
        section: start.to_string(),
    })?;
    let begin = text[..found].rfind('\n').map(|i| i + 1).unwrap_or(0);

    let stop = end
        .and_then(|end| {
            let from = found + start.len();
            find_ignore_case(&text[from..], end).map(|i| from + i)
        })
        .map(|i| text[..i].rfind('\n').map(|nl| nl + 1).unwrap_or(i))
        .unwrap_or(text.len());

    Ok(text[begin..stop.max(begin)].trim())
}

/// Text before the first occurrence of `marker`, or all of `text`.
pub fn before<'t>(text: &'t str, marker: &str) -> &'t str {
    match find_ignore_case(text, marker) {
        Some(i) => &text[..i],
        None => text,
    }
}

/// A rollable option the generator proposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollOption {
    /// What the player attempts, without the attribute annotation.
    pub name: String,
    /// Canonical name of the attribute to roll.
    pub attribute: String,
    /// Number the roll must beat, when the option states one.
    pub requirement: Option<i32>,
}

/// Parse an option block such as:
///
/// ```text
/// Option: Charm the guard (Charisma)
/// Roll: Your dice total should be > 12
/// ```
///
/// The attribute is the first parenthesized name on the option line that
/// matches one of `attributes` (case-insensitively), falling back to any
/// parenthesized attribute in the text.
pub fn roll_option(text: &str, attributes: &[String]) -> Result<RollOption, ExtractionError> {
    let option_line = labeled_value(text, "Option").ok();

    let from_line = option_line.and_then(|line| match_attribute(line, attributes));
    let attribute = match from_line {
        Some(attr) => attr,
        None => match match_attribute(text, attributes) {
            Some(attr) => attr,
            None => {
                return Err(match first_parenthesized(option_line.unwrap_or(text)) {
                    Some(inner) => ExtractionError::UnknownAttribute {
                        attribute: inner.to_string(),
                    },
                    None => ExtractionError::MissingAttribute,
                })
            }
        },
    };

    let name = option_line
        .map(strip_parenthesized)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "your option".to_string());

    let requirement = match labeled_value(text, "Roll") {
        Ok(line) => requirement_in(line),
        Err(_) => None,
    }
    .or_else(|| requirement_in(text));

    Ok(RollOption {
        name,
        attribute,
        requirement,
    })
}

fn parenthesized(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || loop {
        let open = rest.find('(')?;
        let close = rest[open..].find(')').map(|i| open + i)?;
        let inner = rest[open + 1..close].trim();
        rest = &rest[close + 1..];
        if !inner.is_empty() {
            return Some(inner);
        }
    })
}

fn first_parenthesized(text: &str) -> Option<&str> {
    parenthesized(text).next()
}

fn match_attribute(text: &str, attributes: &[String]) -> Option<String> {
    parenthesized(text).find_map(|inner| {
        attributes
            .iter()
            .find(|attr| attr.eq_ignore_ascii_case(inner.trim_matches(|c: char| c == '*' || c == '_')))
            .cloned()
    })
}

fn strip_parenthesized(line: &str) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    for c in line.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    clean_value(&out).trim_end_matches(['.', ',', ':']).trim().to_string()
}

/// First integer after a `>` in `text`.
fn requirement_in(text: &str) -> Option<i32> {
    let mut rest = text;
    while rest.contains('>') {
        let value = extract_with(rest, ">", Delimit::default().start_shift(0)).ok()?;
        let candidate = value.trim_start_matches(|c: char| c == '=' || c.is_whitespace() || c == '*');
        if let Some(n) = leading_int(candidate) {
            return Some(n);
        }
        let at = rest.find('>')?;
        rest = &rest[at + 1..];
    }
    None
}

/// A resource a reward or penalty can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Golds,
    Hp,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Resource::Golds => "Golds",
            Resource::Hp => "HP",
        }
    }
}

/// Whether a section adds to or takes from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Gain,
    Loss,
}

impl Direction {
    fn apply(self, magnitude: i32) -> i32 {
        match self {
            Direction::Gain => magnitude,
            Direction::Loss => -magnitude,
        }
    }
}

/// A skill as described by the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillBlock {
    pub name: String,
    pub description: String,
    pub effect: String,
}

/// One state change found in a reward, penalty or trade section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Resource { resource: Resource, amount: i32 },
    Skill(SkillBlock),
}

const NEW_SKILL: &str = "New skill";

/// Every change listed on lines labeled `label` (e.g. `Reward:`, `You lose:`).
///
/// Amounts are taken from the labeled line itself with their sign set by
/// `direction`. A `New skill` entry is parsed as a full skill block from the
/// text that follows it. No labeled line means no changes.
pub fn section_changes(
    text: &str,
    label: &str,
    direction: Direction,
) -> Result<Vec<Change>, ExtractionError> {
    let mut changes = Vec::new();

    for (offset, line) in lines_with_offsets(text) {
        let Some(at) = find_ignore_case(line, label) else {
            continue;
        };
        let Some(value) = after_separator(&line[at + label.len()..]) else {
            continue;
        };
        let value_offset = offset + (value.as_ptr() as usize - line.as_ptr() as usize);

        let skill_at = find_ignore_case(value, NEW_SKILL);
        let amounts = match skill_at {
            Some(i) => &value[..i],
            None => value,
        };

        for resource in [Resource::Golds, Resource::Hp] {
            if let Some(magnitude) = resource_amount(amounts, resource)? {
                changes.push(Change::Resource {
                    resource,
                    amount: direction.apply(magnitude),
                });
            }
        }

        if let Some(i) = skill_at {
            changes.push(Change::Skill(skill_block(&text[value_offset + i..])?));
        }
    }

    Ok(changes)
}

/// Magnitude of `resource` mentioned in `text`, e.g. `Golds +50` or `HP: 20`.
fn resource_amount(text: &str, resource: Resource) -> Result<Option<i32>, ExtractionError> {
    let lower = text.to_ascii_lowercase();
    let Some((at, word_len)) = resource_word(&lower, resource) else {
        return Ok(None);
    };

    let rest = text[at + word_len..]
        .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '*');
    match leading_int(rest) {
        Some(n) => Ok(Some(n.abs())),
        None => Err(ExtractionError::NotANumber {
            label: resource.label().to_string(),
            value: rest.trim().to_string(),
        }),
    }
}

fn resource_word(lower: &str, resource: Resource) -> Option<(usize, usize)> {
    let is_word_char = |c: char| c.is_ascii_alphanumeric();
    let mut from = 0;
    let needle = match resource {
        Resource::Golds => "gold",
        Resource::Hp => "hp",
    };

    while let Some(i) = lower[from..].find(needle) {
        let at = from + i;
        from = at + needle.len();

        if lower[..at].chars().next_back().is_some_and(is_word_char) {
            continue;
        }
        let mut len = needle.len();
        if resource == Resource::Golds && lower[at + len..].starts_with('s') {
            len += 1;
        }
        if lower[at + len..].chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        return Some((at, len));
    }
    None
}

/// Parse a skill block beginning at `New skill`:
///
/// ```text
/// New skill: Pursue and Empower (Strength)
/// Description: You focus your rage into a single strike.
/// Effect: Add 6 points to your Strength rolls.
/// ```
pub fn skill_block(text: &str) -> Result<SkillBlock, ExtractionError> {
    let at = find_ignore_case(text, NEW_SKILL).ok_or_else(|| missing(NEW_SKILL))?;
    let rest = &text[at + NEW_SKILL.len()..];
    let header = rest.split('\n').next().unwrap_or(rest);

    let name = strip_parenthesized(header.trim_start_matches(|c: char| {
        c == ':' || c == '=' || c == '*' || c.is_whitespace()
    }));
    if name.is_empty() {
        return Err(ExtractionError::EmptyValue {
            label: NEW_SKILL.to_string(),
        });
    }

    // Description is optional; it runs up to the effect line.
    let description = extract_with(
        text,
        "Description",
        Delimit::default().start_shift(0).end_delim("Effect"),
    )
    .map(|d| {
        let d = d.trim_start_matches(|c: char| {
            c == ':' || c == '=' || c == '*' || c.is_whitespace()
        });
        // Save files keep one line per description.
        clean_value(d)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    })
    .unwrap_or_default();

    let effect = labeled_value(text, "Effect")?.to_string();

    Ok(SkillBlock {
        name,
        description,
        effect,
    })
}

/// HP restored by a healing line such as `You've successfully healed. HP +20`.
pub fn healing(text: &str) -> Option<i32> {
    let lower = text.to_ascii_lowercase();
    let mut from = 0;
    while let Some((at, len)) = resource_word(&lower[from..], Resource::Hp) {
        let start = from + at + len;
        from = start;
        let rest = text[start..].trim_start();
        if let Some(amount) = rest.strip_prefix('+').and_then(leading_int) {
            return Some(amount);
        }
    }
    None
}

/// Values for each of `attributes`, read from lines like `Strength: 4`.
pub fn attribute_values(
    text: &str,
    attributes: &[String],
) -> Result<Vec<(String, u32)>, ExtractionError> {
    attributes
        .iter()
        .map(|name| labeled_count(text, name).map(|v| (name.clone(), v)))
        .collect()
}

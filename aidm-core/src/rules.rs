//! Game rules: dice, attributes, success condition and free-form house rules.
//!
//! The rule object is live. Players may change it mid-game with `/rule`, and
//! its description is re-rendered into every prompt that needs it.

use crate::condition::{ConditionError, SuccessCondition};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Labels the extractor relies on. An attribute with one of these names
/// would be indistinguishable from a structural field in generated text.
pub const RESERVED_LABELS: &[&str] = &[
    "HP",
    "Golds",
    "Name",
    "Classtype",
    "Race",
    "Alignment",
    "Description",
    "Attributes",
    "Skills",
    "Damage",
    "Option",
    "Roll",
    "Effect",
    "Reward",
    "Penalty",
];

/// Largest die `/rule dice_sides` accepts.
pub const MAX_DICE_SIDES: u32 = 1_000;

/// Largest cap `/rule max_attribute_point` accepts.
pub const MAX_ATTRIBUTE_POINT: u32 = 100;

/// Error type for rule updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("'{key}' must be a positive integer, got '{value}'")]
    NotPositive { key: String, value: String },

    #[error("'{key}' must be at most {max}, got '{value}'")]
    TooLarge { key: String, value: String, max: u32 },

    #[error("Attributes are locked once a character exists")]
    AttributesLocked,

    #[error("At least one attribute is required")]
    NoAttributes,

    #[error("'{0}' is reserved and cannot be an attribute name")]
    ReservedAttribute(String),

    #[error("Attribute '{0}' is listed twice")]
    DuplicateAttribute(String),

    #[error("Invalid success condition: {0}")]
    Condition(#[from] ConditionError),

    #[error("Rule key must not be empty")]
    EmptyKey,

    #[error("Invalid rules file: {0}")]
    Json(String),
}

/// Value of a free-form house rule: integer when it parses as one, text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Integer(i64),
    Text(String),
}

impl RuleValue {
    pub fn coerce(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) => RuleValue::Integer(n),
            Err(_) => RuleValue::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::Integer(n) => write!(f, "{n}"),
            RuleValue::Text(s) => f.write_str(s),
        }
    }
}

/// A house rule the engine does not interpret itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub key: String,
    pub value: RuleValue,
}

/// How skills modify rolls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillImpact {
    pub kind: String,
    /// Template with `{value}` and `{attribute}` placeholders.
    pub format: String,
}

impl Default for SkillImpact {
    fn default() -> Self {
        Self {
            kind: "add_points".to_string(),
            format: "Add {value} points to your {attribute} rolls".to_string(),
        }
    }
}

/// The updated setting, as the player should see it acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleUpdate {
    pub key: String,
    pub value: String,
}

impl fmt::Display for RuleUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rules updated: {} = {}", self.key, self.value)
    }
}

/// Complete rule set for a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRule {
    dice_sides: u32,
    max_attribute_point: u32,
    attributes: Vec<String>,
    success_condition: SuccessCondition,
    skill_impact: SkillImpact,
    custom_rules: Vec<CustomRule>,
    #[serde(skip)]
    attributes_locked: bool,
}

impl Default for GameRule {
    fn default() -> Self {
        Self {
            dice_sides: 6,
            max_attribute_point: 6,
            attributes: ["Strength", "Intelligence", "Speed", "Charisma"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            success_condition: SuccessCondition::default(),
            skill_impact: SkillImpact::default(),
            custom_rules: Vec::new(),
            attributes_locked: false,
        }
    }
}

impl GameRule {
    /// Parse and validate a JSON rules file. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let rule: GameRule = serde_json::from_str(json).map_err(|e| RuleError::Json(e.to_string()))?;
        bounded("dice_sides", &rule.dice_sides.to_string(), MAX_DICE_SIDES)?;
        bounded(
            "max_attribute_point",
            &rule.max_attribute_point.to_string(),
            MAX_ATTRIBUTE_POINT,
        )?;
        validate_attribute_names(&rule.attributes)?;
        Ok(rule)
    }

    pub fn dice_sides(&self) -> u32 {
        self.dice_sides
    }

    pub fn max_attribute_point(&self) -> u32 {
        self.max_attribute_point
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn success_condition(&self) -> &SuccessCondition {
        &self.success_condition
    }

    pub fn skill_impact(&self) -> &SkillImpact {
        &self.skill_impact
    }

    pub fn custom_rules(&self) -> &[CustomRule] {
        &self.custom_rules
    }

    pub fn attributes_locked(&self) -> bool {
        self.attributes_locked
    }

    /// Freeze the attribute list. Called once the player character exists.
    pub fn lock_attributes(&mut self) {
        self.attributes_locked = true;
    }

    /// Canonical spelling of an attribute, matched case-insensitively.
    pub fn canonical_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.eq_ignore_ascii_case(name.trim()))
            .map(String::as_str)
    }

    /// Replace the attribute list with one read from a save, and lock it.
    ///
    /// Names must already have passed [`validate_attribute_names`].
    pub fn restore_attributes(&mut self, names: Vec<String>) {
        self.attributes = names;
        self.attributes_locked = true;
    }

    /// Apply `/rule <key> <value>`.
    ///
    /// Unknown keys become custom rules; the value is stored as an integer
    /// when it parses as one. On error the rule set is unchanged.
    pub fn update(&mut self, key: &str, raw: &str) -> Result<RuleUpdate, RuleError> {
        let key = key.trim();
        let raw = raw.trim();
        if key.is_empty() {
            return Err(RuleError::EmptyKey);
        }

        let value = match key {
            "dice_sides" => {
                self.dice_sides = bounded(key, raw, MAX_DICE_SIDES)?;
                self.dice_sides.to_string()
            }
            "max_attribute_point" => {
                self.max_attribute_point = bounded(key, raw, MAX_ATTRIBUTE_POINT)?;
                self.max_attribute_point.to_string()
            }
            "attributes" => {
                if self.attributes_locked {
                    return Err(RuleError::AttributesLocked);
                }
                let names: Vec<String> = raw
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                validate_attribute_names(&names)?;
                self.attributes = names;
                self.attributes.join(", ")
            }
            "success_condition" => {
                self.success_condition = SuccessCondition::parse(raw)?;
                self.success_condition.to_string()
            }
            "skill_impact" => {
                self.skill_impact.format = raw.to_string();
                raw.to_string()
            }
            _ => {
                let value = RuleValue::coerce(raw);
                let shown = value.to_string();
                match self.custom_rules.iter_mut().find(|r| r.key == key) {
                    Some(existing) => existing.value = value,
                    None => self.custom_rules.push(CustomRule {
                        key: key.to_string(),
                        value,
                    }),
                }
                shown
            }
        };

        Ok(RuleUpdate {
            key: key.to_string(),
            value,
        })
    }

    /// Natural-language description used in prompts.
    pub fn describe(&self) -> String {
        let sides = self.dice_sides;
        let mut out = format!(
            "The player has {} attributes: {}. Each attribute value is between 0 and {}. \
             To resolve an action, pick the attribute that fits it and roll that many {sides}-sided dice, \
             summing the faces: a character with 4 in an attribute rolls 4d{sides}. \
             A roll succeeds when: {}. \
             Skills modify rolls this way: {}.",
            self.attributes.len(),
            self.attributes.join(", "),
            self.max_attribute_point,
            self.success_condition,
            self.skill_impact.format,
        );

        if self.custom_rules.is_empty() {
            out.push_str(" There are no house rules.");
        } else {
            out.push_str(" House rules:");
            for rule in &self.custom_rules {
                out.push_str(&format!(" {} = {};", rule.key, rule.value));
            }
        }
        out
    }
}

fn bounded(key: &str, raw: &str, max: u32) -> Result<u32, RuleError> {
    match raw.parse::<u64>() {
        Ok(n) if n > u64::from(max) => Err(RuleError::TooLarge {
            key: key.to_string(),
            value: raw.to_string(),
            max,
        }),
        Ok(n) if n > 0 => Ok(n as u32),
        _ => Err(RuleError::NotPositive {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Reject empty lists, reserved labels and duplicates (all case-insensitive).
pub fn validate_attribute_names(names: &[String]) -> Result<(), RuleError> {
    if names.is_empty() {
        return Err(RuleError::NoAttributes);
    }
    for (i, name) in names.iter().enumerate() {
        if RESERVED_LABELS.iter().any(|r| r.eq_ignore_ascii_case(name)) {
            return Err(RuleError::ReservedAttribute(name.clone()));
        }
        if names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(RuleError::DuplicateAttribute(name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let rule = GameRule::default();
        assert_eq!(rule.dice_sides(), 6);
        assert_eq!(rule.max_attribute_point(), 6);
        assert_eq!(
            rule.attributes(),
            &["Strength", "Intelligence", "Speed", "Charisma"]
        );
        assert_eq!(rule.success_condition().as_str(), "total > requirement");
        assert!(!rule.attributes_locked());
    }

    #[test]
    fn test_update_dice_sides() {
        let mut rule = GameRule::default();
        let update = rule.update("dice_sides", "10").unwrap();
        assert_eq!(update.to_string(), "Rules updated: dice_sides = 10");
        assert_eq!(rule.dice_sides(), 10);
        assert!(rule.describe().contains("10-sided"));
    }

    #[test]
    fn test_update_rejects_bad_numbers() {
        let mut rule = GameRule::default();
        assert!(matches!(
            rule.update("dice_sides", "0"),
            Err(RuleError::NotPositive { .. })
        ));
        assert!(matches!(
            rule.update("max_attribute_point", "lots"),
            Err(RuleError::NotPositive { .. })
        ));
        assert_eq!(rule, GameRule::default());
    }

    #[test]
    fn test_update_rejects_huge_dice() {
        let mut rule = GameRule::default();
        assert!(matches!(
            rule.update("dice_sides", "4000000000"),
            Err(RuleError::TooLarge { max: MAX_DICE_SIDES, .. })
        ));
        assert!(matches!(
            rule.update("max_attribute_point", "101"),
            Err(RuleError::TooLarge { .. })
        ));
        assert_eq!(rule.update("dice_sides", "1000").unwrap().value, "1000");
        assert!(GameRule::from_json(r#"{"dice_sides": 5000}"#).is_err());
    }

    #[test]
    fn test_unknown_key_becomes_custom_rule() {
        let mut rule = GameRule::default();
        rule.update("mana_cap", "12").unwrap();
        rule.update("weather", "always raining").unwrap();
        assert_eq!(
            rule.custom_rules(),
            &[
                CustomRule {
                    key: "mana_cap".into(),
                    value: RuleValue::Integer(12)
                },
                CustomRule {
                    key: "weather".into(),
                    value: RuleValue::Text("always raining".into())
                },
            ]
        );
        rule.update("mana_cap", "20").unwrap();
        assert_eq!(rule.custom_rules()[0].value, RuleValue::Integer(20));
        assert!(rule.describe().contains("mana_cap = 20"));
    }

    #[test]
    fn test_attributes_until_locked() {
        let mut rule = GameRule::default();
        rule.update("attributes", "Might, Wits, Luck").unwrap();
        assert_eq!(rule.attributes(), &["Might", "Wits", "Luck"]);

        rule.lock_attributes();
        assert_eq!(
            rule.update("attributes", "Strength"),
            Err(RuleError::AttributesLocked)
        );
        assert_eq!(rule.attributes(), &["Might", "Wits", "Luck"]);
    }

    #[test]
    fn test_reserved_attribute_names() {
        let mut rule = GameRule::default();
        assert_eq!(
            rule.update("attributes", "Strength, hp"),
            Err(RuleError::ReservedAttribute("hp".into()))
        );
        assert_eq!(
            rule.update("attributes", "Luck luck"),
            Err(RuleError::DuplicateAttribute("luck".into()))
        );
    }

    #[test]
    fn test_success_condition_update() {
        let mut rule = GameRule::default();
        rule.update("success_condition", "total >= requirement").unwrap();
        assert!(rule.success_condition().evaluate(4, 4).unwrap());
        assert!(matches!(
            rule.update("success_condition", "exit() > 0"),
            Err(RuleError::Condition(_))
        ));
        assert_eq!(rule.success_condition().as_str(), "total >= requirement");
    }

    #[test]
    fn test_canonical_attribute() {
        let rule = GameRule::default();
        assert_eq!(rule.canonical_attribute("strength"), Some("Strength"));
        assert_eq!(rule.canonical_attribute("Mana"), None);
    }

    #[test]
    fn test_from_json() {
        let rule = GameRule::from_json(
            r#"{"dice_sides": 8, "attributes": ["Might", "Wits"], "success_condition": "total >= requirement"}"#,
        )
        .unwrap();
        assert_eq!(rule.dice_sides(), 8);
        assert_eq!(rule.max_attribute_point(), 6);
        assert_eq!(rule.attributes(), &["Might", "Wits"]);

        assert!(GameRule::from_json(r#"{"attributes": ["Name"]}"#).is_err());
        assert!(GameRule::from_json(r#"{"success_condition": "import os"}"#).is_err());
    }
}

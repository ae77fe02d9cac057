//! Matching internal entities to external records.

use std::fmt;

use record_provider::models::record::ExternalRecord;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::models::EntityOutline;

/// How the external key value is compared with the internal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchOperator {
    /// Exact equality.
    Equal,
    /// Equality ignoring case.
    EqualIgnoreCase,
    /// The external value contains the internal value.
    Contains,
    /// Like [`MatchOperator::Contains`], ignoring case.
    ContainsIgnoreCase,
    /// The internal value contains the external value, ignoring case.
    InverseContainsIgnoreCase,
}

impl MatchOperator {
    /// Applies the operator to a resolved pair of values.
    pub fn matches(self, external: &str, internal: &str) -> bool {
        match self {
            MatchOperator::Equal => external == internal,
            MatchOperator::EqualIgnoreCase => external.to_lowercase() == internal.to_lowercase(),
            MatchOperator::Contains => external.contains(internal),
            MatchOperator::ContainsIgnoreCase => {
                external.to_lowercase().contains(&internal.to_lowercase())
            }
            MatchOperator::InverseContainsIgnoreCase => {
                internal.to_lowercase().contains(&external.to_lowercase())
            }
        }
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchOperator::Equal => "equal",
            MatchOperator::EqualIgnoreCase => "equal-ignore-case",
            MatchOperator::Contains => "contains",
            MatchOperator::ContainsIgnoreCase => "contains-ignore-case",
            MatchOperator::InverseContainsIgnoreCase => "inverse-contains-ignore-case",
        };
        f.write_str(s)
    }
}

/// Which keys to compare, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Dotted attribute path on the external record.
    pub external_key: String,
    /// Comparison operator.
    pub operator: MatchOperator,
    /// `name`, `guid`, `accountId`, or a tag key on the internal entity.
    pub internal_key: String,
}

/// Resolves `key` on an internal entity.
///
/// `name`, `guid` and `accountId` (any case) address entity fields. Any other
/// key is looked up among the tags, case-insensitively, and yields the first
/// value of the first matching tag. Empty values count as absent.
pub fn key_value(entity: &EntityOutline, key: &str) -> Option<String> {
    let value = if key.eq_ignore_ascii_case("name") {
        Some(entity.name.clone())
    } else if key.eq_ignore_ascii_case("guid") {
        Some(entity.guid.clone())
    } else if key.eq_ignore_ascii_case("accountId") {
        Some(entity.account_id.to_string())
    } else {
        entity
            .tags
            .iter()
            .find(|t| t.key.eq_ignore_ascii_case(key))
            .and_then(|t| t.first_value())
            .map(str::to_string)
    };
    value.filter(|v| !v.is_empty())
}

/// Returns the first record in `records` that matches `entity` under `rule`.
pub fn find_match<'a>(
    entity: &EntityOutline,
    rule: &MatchRule,
    records: &'a [ExternalRecord],
) -> Option<&'a ExternalRecord> {
    let Some(internal) = key_value(entity, &rule.internal_key) else {
        trace!(
            guid = %entity.guid,
            key = %rule.internal_key,
            "entity has no value for match key"
        );
        return None;
    };

    records.iter().find(|record| {
        let Some(external) = record.text(&rule.external_key) else {
            trace!(
                record = %record.id,
                key = %rule.external_key,
                "record has no text value for match key"
            );
            return false;
        };
        rule.operator.matches(external, &internal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tag;
    use proptest::prelude::*;
    use record_provider::models::record::AttributeValue;

    fn entity() -> EntityOutline {
        EntityOutline {
            guid: "g1".into(),
            name: "Web-01".into(),
            account_id: 42,
            tags: vec![
                Tag {
                    key: "ExternalId".into(),
                    values: vec!["X1".into(), "X9".into()],
                },
                Tag::single("blank", ""),
            ],
            ..Default::default()
        }
    }

    fn rule(external_key: &str, operator: MatchOperator, internal_key: &str) -> MatchRule {
        MatchRule {
            external_key: external_key.into(),
            operator,
            internal_key: internal_key.into(),
        }
    }

    #[test]
    fn operators() {
        assert!(MatchOperator::Equal.matches("abc", "abc"));
        assert!(!MatchOperator::Equal.matches("ABC", "abc"));
        assert!(MatchOperator::EqualIgnoreCase.matches("ABC", "abc"));
        assert!(MatchOperator::Contains.matches("hello-world", "world"));
        assert!(!MatchOperator::Contains.matches("hello-World", "world"));
        assert!(MatchOperator::ContainsIgnoreCase.matches("hello-World", "world"));
        assert!(MatchOperator::InverseContainsIgnoreCase.matches("abc", "ABCDEF"));
        assert!(!MatchOperator::InverseContainsIgnoreCase.matches("ABCDEF", "abc"));
    }

    #[test]
    fn operator_names_round_trip_through_serde() {
        let op: MatchOperator =
            serde_json::from_str("\"inverse-contains-ignore-case\"").unwrap();
        assert_eq!(op, MatchOperator::InverseContainsIgnoreCase);
        assert_eq!(op.to_string(), "inverse-contains-ignore-case");
    }

    #[test]
    fn well_known_keys_and_tags() {
        let e = entity();
        assert_eq!(key_value(&e, "NAME").as_deref(), Some("Web-01"));
        assert_eq!(key_value(&e, "guid").as_deref(), Some("g1"));
        assert_eq!(key_value(&e, "accountid").as_deref(), Some("42"));
        assert_eq!(key_value(&e, "externalid").as_deref(), Some("X1"));
        assert_eq!(key_value(&e, "blank"), None);
        assert_eq!(key_value(&e, "missing"), None);
    }

    #[test]
    fn first_satisfying_record_wins() {
        let records = vec![
            ExternalRecord::new("r0"),
            ExternalRecord::new("r1").with_attribute("id", ""),
            ExternalRecord::new("r2").with_attribute("id", "X1"),
            ExternalRecord::new("r3").with_attribute("id", "X1"),
        ];
        let found = find_match(&entity(), &rule("id", MatchOperator::Equal, "externalId"), &records);
        assert_eq!(found.map(|r| r.id.as_str()), Some("r2"));
    }

    #[test]
    fn nested_paths_must_end_in_text() {
        let mut location = indexmap::IndexMap::new();
        location.insert("name".to_string(), AttributeValue::from("web-01"));
        let records = vec![
            ExternalRecord::new("list").with_attribute("location", AttributeValue::List(vec!["web-01".into()])),
            ExternalRecord::new("map").with_attribute("location", AttributeValue::Map(location)),
        ];
        let found = find_match(
            &entity(),
            &rule("location.name", MatchOperator::EqualIgnoreCase, "name"),
            &records,
        );
        assert_eq!(found.map(|r| r.id.as_str()), Some("map"));
    }

    #[test]
    fn unmatchable_entity_short_circuits() {
        let records = vec![ExternalRecord::new("r").with_attribute("id", "X1")];
        let found = find_match(&entity(), &rule("id", MatchOperator::Equal, "nope"), &records);
        assert!(found.is_none());
    }

    proptest! {
        #[test]
        fn equal_ignore_case_is_symmetric_in_case(s in "[a-zA-Z0-9]{1,12}") {
            let wrapped = format!("pre-{}-post", s);
            let outer = format!("X{}X", s);
            prop_assert!(MatchOperator::EqualIgnoreCase.matches(&s.to_uppercase(), &s.to_lowercase()));
            prop_assert!(MatchOperator::ContainsIgnoreCase.matches(&wrapped, &s.to_uppercase()));
            prop_assert!(MatchOperator::InverseContainsIgnoreCase.matches(&s.to_lowercase(), &outer));
        }
    }
}

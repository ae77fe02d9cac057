use std::fmt;

use indexmap::IndexSet;
use record_provider::models::record::ExternalRecord;

use crate::{
    models::{EntityOutline, Tag},
    tags::FieldMapping,
};

/// What needs to change to make the entity's tags mirror the record.
///
/// A key present in both `delete` and `add` is a replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Tag keys to remove entirely.
    pub delete: IndexSet<String>,
    /// Tags to add, in mapping order.
    pub add: Vec<Tag>,
}

impl TagDiff {
    /// True if the entity already matches the record.
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty() && self.add.is_empty()
    }

    fn is_replace(&self, tag: &Tag) -> bool {
        self.delete.contains(&tag.key)
    }
}

impl fmt::Display for TagDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // helper: section header with underline
        let mut wrote_any = false;
        let mut section = |title: &str,
                           body: &mut dyn FnMut(&mut fmt::Formatter<'_>) -> fmt::Result|
         -> fmt::Result {
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "{title}")?;
            writeln!(f, "{}", "-".repeat(title.len()))?;
            body(f)?;
            wrote_any = true;
            Ok(())
        };

        let replaced: Vec<&Tag> = self.add.iter().filter(|t| self.is_replace(t)).collect();
        let added: Vec<&Tag> = self.add.iter().filter(|t| !self.is_replace(t)).collect();
        let deleted: Vec<&String> = self
            .delete
            .iter()
            .filter(|k| !replaced.iter().any(|t| &t.key == *k))
            .collect();

        if !deleted.is_empty() {
            section("Tags (DELETE)", &mut |f| {
                for key in &deleted {
                    writeln!(f, "- {key}")?;
                }
                Ok(())
            })?;
        }
        if !replaced.is_empty() {
            section("Tags (REPLACE)", &mut |f| {
                for tag in &replaced {
                    writeln!(f, "~ {} = {}", tag.key, tag.values.join(", "))?;
                }
                Ok(())
            })?;
        }
        if !added.is_empty() {
            section("Tags (ADD)", &mut |f| {
                for tag in &added {
                    writeln!(f, "+ {} = {}", tag.key, tag.values.join(", "))?;
                }
                Ok(())
            })?;
        }

        if !wrote_any {
            write!(f, "No changes")
        } else {
            Ok(())
        }
    }
}

/// Computes the tag changes `mapping` implies for `entity` given the matched
/// `record`.
///
/// For each `external path -> tag key` pair, in mapping order:
/// - no external value, tag present: delete the tag
/// - external value, tag absent: add it
/// - external value not among the tag's values: delete and re-add with the
///   external value only
/// - external value already among the tag's values: nothing
///
/// Tag keys are compared exactly.
pub fn make_diff(mapping: &FieldMapping, record: &ExternalRecord, entity: &EntityOutline) -> TagDiff {
    let mut d = TagDiff::default();

    for (external_key, tag_key) in mapping {
        let external = record.text(external_key);
        let internal = entity.tag_values(tag_key);

        match (external, internal) {
            (None, Some(_)) => {
                d.delete.insert(tag_key.clone());
            }
            (Some(value), None) => d.add.push(Tag::single(tag_key, value)),
            (Some(value), Some(values)) if !values.iter().any(|v| v == value) => {
                d.delete.insert(tag_key.clone());
                d.add.push(Tag::single(tag_key, value));
            }
            _ => {}
        }
    }

    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapping(pairs: &[(&str, &str)]) -> FieldMapping {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn entity(tags: Vec<Tag>) -> EntityOutline {
        EntityOutline {
            guid: "g1".into(),
            name: "web-01".into(),
            tags,
            ..Default::default()
        }
    }

    /// Applies a diff the way the directory would.
    fn applied(mut e: EntityOutline, d: &TagDiff) -> EntityOutline {
        e.tags.retain(|t| !d.delete.contains(&t.key));
        for tag in &d.add {
            match e.tags.iter_mut().find(|t| t.key == tag.key) {
                Some(existing) => existing.values.extend(tag.values.clone()),
                None => e.tags.push(tag.clone()),
            }
        }
        e
    }

    #[test]
    fn adds_missing_tag() {
        let record = ExternalRecord::new("X1").with_attribute("status", "active");
        let d = make_diff(&mapping(&[("status", "syncStatus")]), &record, &entity(vec![]));
        assert!(d.delete.is_empty());
        assert_eq!(d.add, vec![Tag::single("syncStatus", "active")]);
    }

    #[test]
    fn deletes_tag_when_record_has_no_value() {
        let record = ExternalRecord::new("X1").with_attribute("status", "");
        let e = entity(vec![Tag::single("syncStatus", "active")]);
        let d = make_diff(&mapping(&[("status", "syncStatus"), ("owner", "owner")]), &record, &e);
        assert_eq!(d.delete.iter().collect::<Vec<_>>(), vec!["syncStatus"]);
        assert!(d.add.is_empty());
    }

    #[test]
    fn replaces_changed_value_wholesale() {
        let record = ExternalRecord::new("X1").with_attribute("status", "retired");
        let e = entity(vec![Tag {
            key: "syncStatus".into(),
            values: vec!["active".into(), "manual".into()],
        }]);
        let d = make_diff(&mapping(&[("status", "syncStatus")]), &record, &e);
        assert!(d.delete.contains("syncStatus"));
        assert_eq!(d.add, vec![Tag::single("syncStatus", "retired")]);
        assert_eq!(applied(e, &d).tag_values("syncStatus").unwrap(), ["retired"]);
    }

    #[test]
    fn value_among_many_is_unchanged() {
        let record = ExternalRecord::new("X1").with_attribute("status", "manual");
        let e = entity(vec![Tag {
            key: "syncStatus".into(),
            values: vec!["active".into(), "manual".into()],
        }]);
        assert!(make_diff(&mapping(&[("status", "syncStatus")]), &record, &e).is_noop());
    }

    #[test]
    fn tag_keys_are_case_sensitive() {
        let record = ExternalRecord::new("X1").with_attribute("status", "active");
        let e = entity(vec![Tag::single("syncstatus", "active")]);
        let d = make_diff(&mapping(&[("status", "syncStatus")]), &record, &e);
        assert_eq!(d.add, vec![Tag::single("syncStatus", "active")]);
    }

    #[test]
    fn display_no_changes() {
        assert_eq!(TagDiff::default().to_string(), "No changes");
    }

    #[test]
    fn display_sections() {
        let record = ExternalRecord::new("X1")
            .with_attribute("status", "active")
            .with_attribute("env", "prod");
        let e = entity(vec![
            Tag::single("owner", "alice"),
            Tag::single("environment", "stage"),
        ]);
        let d = make_diff(
            &mapping(&[("status", "syncStatus"), ("env", "environment"), ("owner", "owner")]),
            &record,
            &e,
        );

        insta::assert_snapshot!(d.to_string().trim_end(), @r"
        Tags (DELETE)
        -------------
        - owner

        Tags (REPLACE)
        --------------
        ~ environment = prod

        Tags (ADD)
        ----------
        + syncStatus = active
        ");
    }

    proptest! {
        #[test]
        fn applying_a_diff_makes_the_next_diff_a_noop(
            external in proptest::collection::vec(proptest::option::of("[a-c]{0,2}"), 3),
            internal in proptest::collection::vec(proptest::collection::vec("[a-c]{1,2}", 0..3), 3),
        ) {
            let keys = ["k0", "k1", "k2"];
            let mut record = ExternalRecord::new("r");
            for (key, value) in keys.iter().zip(&external) {
                if let Some(value) = value {
                    record = record.with_attribute(*key, value.as_str());
                }
            }
            let tags = keys
                .iter()
                .zip(&internal)
                .filter(|(_, values)| !values.is_empty())
                .map(|(key, values)| Tag { key: format!("t{key}"), values: values.clone() })
                .collect();
            let m = mapping(&[("k0", "tk0"), ("k1", "tk1"), ("k2", "tk2")]);

            let e = entity(tags);
            let d = make_diff(&m, &record, &e);
            let after = applied(e, &d);
            prop_assert!(make_diff(&m, &record, &after).is_noop());
        }
    }
}

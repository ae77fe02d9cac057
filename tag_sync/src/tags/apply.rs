use tracing::trace;

use crate::{
    directory::EntityDirectory,
    error::{DirectoryError, MutationError, MutationKind},
    models::EntityOutline,
    tags::TagDiff,
};

/// Sends `diff` to the directory for `entity`.
///
/// Deletes go first so a replace ends with the new value in place. The add
/// is attempted even when the delete fails. Every failed call is returned;
/// an empty vector means the entity is up to date.
pub async fn apply_diff(
    directory: &dyn EntityDirectory,
    entity: &EntityOutline,
    diff: &TagDiff,
) -> Vec<MutationError> {
    let mut errors = Vec::new();
    let failed = |kind: MutationKind, source: DirectoryError| MutationError {
        kind,
        guid: entity.guid.clone(),
        name: entity.name.clone(),
        source,
    };

    if !diff.delete.is_empty() {
        let keys: Vec<String> = diff.delete.iter().cloned().collect();
        trace!(guid = %entity.guid, ?keys, "deleting tags");
        if let Err(e) = directory.delete_tags(&entity.guid, &keys).await {
            errors.push(failed(MutationKind::Delete, e));
        }
    }

    if !diff.add.is_empty() {
        trace!(guid = %entity.guid, tags = diff.add.len(), "adding tags");
        if let Err(e) = directory.add_tags(&entity.guid, &diff.add).await {
            errors.push(failed(MutationKind::Add, e));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{EntitySearchPage, Tag},
        tags::make_diff,
    };
    use async_trait::async_trait;
    use record_provider::models::record::ExternalRecord;

    /// Rejects every mutation.
    struct Rejecting;

    #[async_trait]
    impl EntityDirectory for Rejecting {
        async fn search(
            &self,
            _query: &str,
            _cursor: Option<&str>,
        ) -> Result<EntitySearchPage, DirectoryError> {
            Ok(EntitySearchPage::default())
        }

        async fn delete_tags(&self, _guid: &str, _keys: &[String]) -> Result<(), DirectoryError> {
            Err(DirectoryError::Malformed("delete rejected".into()))
        }

        async fn add_tags(&self, _guid: &str, _tags: &[Tag]) -> Result<(), DirectoryError> {
            Err(DirectoryError::Malformed("add rejected".into()))
        }

        async fn replace_tags(&self, _guid: &str, _tags: &[Tag]) -> Result<(), DirectoryError> {
            Err(DirectoryError::Malformed("replace rejected".into()))
        }
    }

    #[tokio::test]
    async fn failed_replace_reports_delete_and_add() {
        let entity = EntityOutline {
            guid: "g1".into(),
            name: "web-01".into(),
            tags: vec![Tag::single("syncStatus", "retired")],
            ..Default::default()
        };
        let record = ExternalRecord::new("X1").with_attribute("status", "active");
        let mapping = [("status".to_string(), "syncStatus".to_string())]
            .into_iter()
            .collect();
        let diff = make_diff(&mapping, &record, &entity);

        let errors = apply_diff(&Rejecting, &entity, &diff).await;

        let kinds: Vec<MutationKind> = errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![MutationKind::Delete, MutationKind::Add]);
        assert_eq!(
            errors[0].to_string(),
            "deleting tags on entity web-01 (g1) failed: unexpected directory response: delete rejected"
        );
    }
}

use std::sync::Arc;

use super::{RetentionWindow, SchemaRegistry, TableResolver};
use crate::models::{DeleteOperation, KeyFilter, TableJoin};

/// Turns selected versions into delete operations across every table a
/// class's rows occupy.
pub struct DeletionPlanner {
    registry: Arc<SchemaRegistry>,
    resolver: TableResolver,
}

impl DeletionPlanner {
    pub fn new(registry: Arc<SchemaRegistry>, resolver: TableResolver) -> Self {
        Self { registry, resolver }
    }

    /// Version tables for a class, root class first.
    pub fn tables_for(&self, class_name: &str) -> Vec<String> {
        let mut tables = Vec::new();
        for class in self.registry.ancestry(class_name) {
            if !class.versioned {
                continue;
            }
            tables.push(self.resolver.versions_table(class));
            if let Some(localised) = self.resolver.localised_versions_table(class) {
                tables.push(localised);
            }
        }
        tables
    }

    /// A single delete of `versions` of `record_id`; `None` if there is
    /// nothing to delete or nowhere to delete it from.
    pub fn plan_deletion(
        &self,
        class_name: &str,
        record_id: i64,
        versions: &[i64],
    ) -> Option<DeleteOperation> {
        if versions.is_empty() {
            return None;
        }
        let mut tables = self.tables_for(class_name).into_iter();
        let base = tables.next()?;
        let joins = tables
            .map(|table| TableJoin::on_version_key(table, base.clone()))
            .collect();

        Some(DeleteOperation {
            table: base,
            filter: KeyFilter::Versions {
                record_id,
                versions: versions.to_vec(),
            },
            joins,
        })
    }

    /// Deletes of at most `deletion_version_limit` versions each, at most
    /// `query_limit` of them. Versions beyond that wait for the next pass.
    pub fn plan_batches(
        &self,
        class_name: &str,
        record_id: i64,
        versions: &[i64],
        window: &RetentionWindow,
    ) -> Vec<DeleteOperation> {
        let chunk = window.deletion_version_limit.max(1) as usize;
        versions
            .chunks(chunk)
            .take(window.query_limit as usize)
            .filter_map(|batch| self.plan_deletion(class_name, record_id, batch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::{EntityClassConfig, LocalisationConfig, SchemaConfig};

    fn class(name: &str, parent: Option<&str>, localised: bool) -> EntityClassConfig {
        EntityClassConfig {
            name: name.into(),
            table: None,
            parent: parent.map(Into::into),
            versioned: true,
            localised,
        }
    }

    fn planner(resolver: TableResolver) -> DeletionPlanner {
        let registry = SchemaRegistry::from_config(&SchemaConfig {
            classes: vec![
                class("Ship", None, true),
                class("CargoShip", Some("Ship"), false),
            ],
        });
        DeletionPlanner::new(Arc::new(registry), resolver)
    }

    #[test]
    fn test_base_class_single_table() {
        let op = planner(TableResolver::Plain)
            .plan_deletion("Ship", 1, &[1, 2, 3])
            .unwrap();
        assert_eq!(op.table, "Ship_Versions");
        assert!(op.joins.is_empty());
        assert_eq!(
            op.filter,
            KeyFilter::Versions {
                record_id: 1,
                versions: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn test_subclass_joins_ancestry() {
        let op = planner(TableResolver::Plain)
            .plan_deletion("CargoShip", 7, &[4])
            .unwrap();
        assert_eq!(op.table, "Ship_Versions");
        assert_eq!(
            op.joins,
            vec![TableJoin::on_version_key("CargoShip_Versions", "Ship_Versions")]
        );
    }

    #[test]
    fn test_localised_tables_joined() {
        let resolver = TableResolver::from_config(&LocalisationConfig {
            enabled: true,
            ..Default::default()
        });
        let op = planner(resolver).plan_deletion("CargoShip", 7, &[4]).unwrap();
        let tables: Vec<_> = op.tables().collect();
        assert_eq!(
            tables,
            vec!["Ship_Versions", "Ship_Localised_Versions", "CargoShip_Versions"]
        );
    }

    #[test]
    fn test_nothing_to_plan() {
        let p = planner(TableResolver::Plain);
        assert!(p.plan_deletion("Ship", 1, &[]).is_none());
        assert!(p.plan_deletion("Ghost", 1, &[1]).is_none());
    }

    #[test]
    fn test_batches_cover_all_versions_once() {
        let window = RetentionWindow {
            deletion_version_limit: 100,
            ..Default::default()
        };
        let versions: Vec<i64> = (1..=300).collect();
        let ops = planner(TableResolver::Plain).plan_batches("Ship", 1, &versions, &window);
        assert_eq!(ops.len(), 3);

        let mut seen = HashSet::new();
        for op in &ops {
            let KeyFilter::Versions { versions, .. } = &op.filter else {
                panic!("expected version filter");
            };
            assert!(versions.len() <= 100);
            for v in versions {
                assert!(seen.insert(*v), "version {v} planned twice");
            }
        }
        assert_eq!(seen.len(), 300);
    }

    #[test]
    fn test_batches_capped_by_query_limit() {
        let window = RetentionWindow {
            deletion_version_limit: 2,
            query_limit: 2,
            ..Default::default()
        };
        let versions: Vec<i64> = (1..=7).collect();
        let ops = planner(TableResolver::Plain).plan_batches("Ship", 1, &versions, &window);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].key_count(), 2);
    }
}

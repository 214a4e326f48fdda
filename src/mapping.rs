//! Rewrites of host logical operators into operators of this platform.
use std::fmt::Debug;
use std::sync::Arc;

use crate::operators::{ExecutionOperator, PageRankOperator};
use crate::platform::PLATFORM_NAME;

/// Optimizer epoch a replacement was produced at.
pub type Epoch = u32;

/// Host operators the mappings can look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalOperator {
    PageRank { num_iterations: usize },
    Other { name: String },
}

impl LogicalOperator {
    pub fn name(&self) -> &str {
        match self {
            Self::PageRank { .. } => "PageRank",
            Self::Other { name } => name,
        }
    }
}

/// Matches single logical operators.
#[derive(Clone, Copy)]
pub struct OperatorPattern {
    name: &'static str,
    predicate: fn(&LogicalOperator) -> bool,
}

impl OperatorPattern {
    pub const fn new(name: &'static str, predicate: fn(&LogicalOperator) -> bool) -> Self {
        Self { name, predicate }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, operator: &LogicalOperator) -> bool {
        (self.predicate)(operator)
    }
}

impl Debug for OperatorPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorPattern")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

type ReplacementFactory = fn(&LogicalOperator) -> Option<Arc<dyn ExecutionOperator>>;

/// An execution operator standing in for a matched logical operator.
#[derive(Clone)]
pub struct Replacement {
    pub operator: Arc<dyn ExecutionOperator>,
    pub platform: &'static str,
    pub epoch: Epoch,
}

impl Debug for Replacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replacement")
            .field("operator", &self.operator.name())
            .field("platform", &self.platform)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanTransformation {
    pattern: OperatorPattern,
    factory: ReplacementFactory,
    platform: &'static str,
}

impl PlanTransformation {
    pub const fn new(
        pattern: OperatorPattern,
        factory: ReplacementFactory,
        platform: &'static str,
    ) -> Self {
        Self {
            pattern,
            factory,
            platform,
        }
    }

    pub fn pattern(&self) -> &OperatorPattern {
        &self.pattern
    }

    pub fn platform(&self) -> &'static str {
        self.platform
    }

    pub fn apply(&self, operator: &LogicalOperator, epoch: Epoch) -> Option<Replacement> {
        if !self.pattern.matches(operator) {
            return None;
        }

        (self.factory)(operator).map(|replacement| Replacement {
            operator: replacement,
            platform: self.platform,
            epoch,
        })
    }
}

pub trait Mapping: Send + Sync {
    fn transformations(&self) -> Vec<PlanTransformation>;
}

/// Maps logical PageRank operators onto [`PageRankOperator`], keeping the
/// iteration count.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRankMapping;

impl Mapping for PageRankMapping {
    fn transformations(&self) -> Vec<PlanTransformation> {
        let pattern = OperatorPattern::new("pageRank", |op| {
            matches!(op, LogicalOperator::PageRank { .. })
        });

        vec![PlanTransformation::new(
            pattern,
            |op| match op {
                LogicalOperator::PageRank { num_iterations } => {
                    Some(Arc::new(PageRankOperator::new(*num_iterations)) as Arc<dyn ExecutionOperator>)
                }
                LogicalOperator::Other { .. } => None,
            },
            PLATFORM_NAME,
        )]
    }
}

/// Every mapping this crate ships.
pub fn all() -> Vec<Arc<dyn Mapping>> {
    vec![Arc::new(PageRankMapping)]
}

/// Collects the transformations of several mappings and applies them in
/// registration order.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    transformations: Vec<PlanTransformation>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mappings<'a>(mappings: impl IntoIterator<Item = &'a Arc<dyn Mapping>>) -> Self {
        let mut registry = Self::new();
        for mapping in mappings {
            registry.register(mapping.as_ref());
        }
        registry
    }

    pub fn register(&mut self, mapping: &dyn Mapping) -> &mut Self {
        self.transformations.extend(mapping.transformations());
        self
    }

    pub fn len(&self) -> usize {
        self.transformations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    /// First replacement any transformation offers for `operator`.
    pub fn apply(&self, operator: &LogicalOperator, epoch: Epoch) -> Option<Replacement> {
        let replacement = self
            .transformations
            .iter()
            .find_map(|t| t.apply(operator, epoch));

        match &replacement {
            Some(r) => tracing::debug!(
                "Mapped {} to {} on {} at epoch {epoch}",
                operator.name(),
                r.operator.name(),
                r.platform
            ),
            None => tracing::debug!("No mapping for {}", operator.name()),
        }

        replacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagerank_mapping_keeps_iterations() {
        let registry = MappingRegistry::from_mappings(&all());
        assert_eq!(registry.len(), 1);

        let replacement = registry
            .apply(&LogicalOperator::PageRank { num_iterations: 9 }, 3)
            .unwrap();
        assert_eq!(replacement.operator.name(), "PageRank");
        assert_eq!(replacement.platform, "ShardGraph");
        assert_eq!(replacement.epoch, 3);
        assert_eq!(replacement.operator.num_inputs(), 1);
        assert_eq!(replacement.operator.num_outputs(), 1);
    }

    #[test]
    fn test_other_operators_are_not_mapped() {
        let registry = MappingRegistry::from_mappings(&all());
        let op = LogicalOperator::Other {
            name: "Filter".into(),
        };
        assert!(registry.apply(&op, 0).is_none());
        assert_eq!(op.name(), "Filter");
    }

    #[test]
    fn test_first_matching_transformation_wins() {
        struct Shadow;

        impl Mapping for Shadow {
            fn transformations(&self) -> Vec<PlanTransformation> {
                vec![PlanTransformation::new(
                    OperatorPattern::new("any", |_| true),
                    |_| Some(Arc::new(PageRankOperator::new(1)) as Arc<dyn ExecutionOperator>),
                    "Shadow",
                )]
            }
        }

        let mut registry = MappingRegistry::new();
        registry.register(&Shadow).register(&PageRankMapping);

        let replacement = registry
            .apply(&LogicalOperator::PageRank { num_iterations: 4 }, 0)
            .unwrap();
        assert_eq!(replacement.platform, "Shadow");

        let mut registry = MappingRegistry::new();
        registry.register(&PageRankMapping).register(&Shadow);
        let replacement = registry
            .apply(&LogicalOperator::PageRank { num_iterations: 4 }, 0)
            .unwrap();
        assert_eq!(replacement.platform, "ShardGraph");
    }
}

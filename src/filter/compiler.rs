//! Filter tree → [`Predicate`].
//!
//! Depth-first, pure and deterministic. A group becomes `{"$op": [...]}` with
//! its children compiled in order; a nested `{filters: ...}` wrapper compiles
//! in place at its position among its siblings.

use tracing::debug;

use super::ast::{Filter, FilterGroup, FilterNode, FilterOperation, NestedFilters, Operator};
use super::coerce::ValueCoercer;
use super::predicate::Predicate;
use super::FilterError;

pub struct FilterCompiler;

impl FilterCompiler {
    /// Compile one group.
    pub fn compile(group: &FilterGroup) -> Result<Predicate, FilterError> {
        let mut children = Vec::with_capacity(group.filter.len());
        for node in &group.filter {
            Self::compile_into(node, &mut children)?;
        }
        Ok(Predicate::Group { operator: group.operator, children })
    }

    /// Compile a list of independent groups.
    ///
    /// Empty groups are skipped. Groups sharing one operator are merged into
    /// a single `$and`/`$or`; groups with different operators each keep their
    /// own predicate under an outer `$and`.
    pub fn compile_all(groups: &[FilterGroup]) -> Result<Predicate, FilterError> {
        let mut compiled = Vec::with_capacity(groups.len());
        for group in groups {
            let predicate = Self::compile(group)?;
            if !predicate.is_empty() {
                compiled.push(predicate);
            }
        }

        let Some(first) = compiled.first() else {
            return Ok(Predicate::empty());
        };
        let first_operator = match first {
            Predicate::Group { operator, .. } => *operator,
            Predicate::Field { .. } => Operator::And,
        };
        let same_operator = compiled
            .iter()
            .all(|p| matches!(p, Predicate::Group { operator, .. } if *operator == first_operator));

        if same_operator {
            let children = compiled
                .into_iter()
                .flat_map(|p| match p {
                    Predicate::Group { children, .. } => children,
                    field => vec![field],
                })
                .collect();
            Ok(Predicate::Group { operator: first_operator, children })
        } else {
            debug!(groups = compiled.len(), "Mixed filter group operators, wrapping in $and");
            Ok(Predicate::Group { operator: Operator::And, children: compiled })
        }
    }

    /// Compile any node as a root. A bare leaf compiles to its comparison.
    pub fn compile_node(node: &FilterNode) -> Result<Predicate, FilterError> {
        match node {
            FilterNode::Nested(NestedFilters::One(group)) | FilterNode::Group(group) => Self::compile(group),
            FilterNode::Nested(NestedFilters::Many(groups)) => Self::compile_all(groups),
            FilterNode::Leaf(filter) => Ok(Self::compile_leaf(filter)?.unwrap_or_else(Predicate::empty)),
        }
    }

    fn compile_into(node: &FilterNode, out: &mut Vec<Predicate>) -> Result<(), FilterError> {
        match node {
            FilterNode::Leaf(filter) => {
                if let Some(predicate) = Self::compile_leaf(filter)? {
                    out.push(predicate);
                }
            }
            FilterNode::Group(group) | FilterNode::Nested(NestedFilters::One(group)) => {
                out.push(Self::compile(group)?);
            }
            FilterNode::Nested(NestedFilters::Many(groups)) => {
                for group in groups {
                    out.push(Self::compile(group)?);
                }
            }
        }
        Ok(())
    }

    /// `None` when the leaf has no value. An omitted operation means `eq`.
    fn compile_leaf(filter: &Filter) -> Result<Option<Predicate>, FilterError> {
        let Some(raw) = filter.value.as_deref() else {
            debug!(field = %filter.field, "Skipping filter leaf without value");
            return Ok(None);
        };
        let value = ValueCoercer::coerce(filter, raw)?;
        let operation = filter.operation.clone().unwrap_or(FilterOperation::Eq);
        Ok(Some(Predicate::field(filter.field.clone(), operation, value)))
    }
}

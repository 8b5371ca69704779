//! Explain output for operator trees
//!
//! Deterministic: the same tree always renders the same text.

use std::fmt;

use serde::Serialize;

use crate::operators::{Operator, PlanOp};

use super::errors::PlannerError;

/// One operator in the explain tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainNode {
    pub operator: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    fn from_op(op: &PlanOp) -> Self {
        Self {
            operator: op.name().to_string(),
            description: op.short_description(),
            inputs: op.inputs().into_iter().map(ExplainNode::from_op).collect(),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        if self.description.is_empty() {
            writeln!(f, "{}{}", pad, self.operator)?;
        } else {
            writeln!(f, "{}{}: {}", pad, self.operator, self.description)?;
        }
        for input in &self.inputs {
            input.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Explain plan output
#[derive(Debug, Clone, Serialize)]
pub struct ExplainPlan {
    /// Whether planning succeeded
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<ExplainNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    /// Explains a planned operator tree
    pub fn from_op(root: &PlanOp) -> Self {
        Self {
            accepted: true,
            tree: Some(ExplainNode::from_op(root)),
            rejection_code: None,
            rejection_reason: None,
        }
    }

    /// Explains why planning failed
    pub fn from_error(err: &PlannerError) -> Self {
        Self {
            accepted: false,
            tree: None,
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(err.message().to_string()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            if let Some(tree) = &self.tree {
                tree.write_indented(f, 0)?;
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }

        Ok(())
    }
}

use persica_core::{Error, Result};

use crate::param::ParameterMapping;

/// The recursive dynamic-SQL AST (spec §3/§4.2). Each variant's rendering
/// behavior is implemented in `render.rs`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlNode {
    StaticText(String),
    /// Unresolved `${token}` substitution; marks the owning statement dynamic.
    DynamicText(String),
    If {
        test: String,
        child: Box<SqlNode>,
    },
    Choose {
        when: Vec<(String, SqlNode)>,
        otherwise: Option<Box<SqlNode>>,
    },
    Where(Box<SqlNode>),
    Set(Box<SqlNode>),
    Trim {
        child: Box<SqlNode>,
        prefix: Option<String>,
        suffix: Option<String>,
        prefix_overrides: Vec<String>,
        suffix_overrides: Vec<String>,
    },
    ForEach {
        collection: String,
        item: Option<String>,
        index: Option<String>,
        open: Option<String>,
        close: Option<String>,
        separator: Option<String>,
        child: Box<SqlNode>,
    },
    Bind {
        name: String,
        expr: String,
    },
    VariableRef(ParameterMapping),
    Mixed(Vec<SqlNode>),
    /// Resolved at configuration time into the referenced fragment's node
    /// tree; never appears in a frozen `CompiledStatement`'s AST (spec §3).
    Include(String),
}

impl SqlNode {
    pub fn mixed(nodes: Vec<SqlNode>) -> SqlNode {
        if nodes.len() == 1 {
            nodes.into_iter().next().unwrap()
        } else {
            SqlNode::Mixed(nodes)
        }
    }
}

/// Replaces every `Include(fragment_id)` node with a clone of the named
/// fragment's tree, recursively. Run once at configuration time, before a
/// statement is handed to the registry (spec §3's "pre-resolved" note).
pub fn resolve_includes(
    node: SqlNode,
    fragments: &ahash::AHashMap<String, SqlNode>,
) -> Result<SqlNode> {
    resolve_includes_inner(node, fragments, &mut Vec::new())
}

fn resolve_includes_inner(
    node: SqlNode,
    fragments: &ahash::AHashMap<String, SqlNode>,
    visiting: &mut Vec<String>,
) -> Result<SqlNode> {
    Ok(match node {
        SqlNode::Include(id) => {
            if visiting.contains(&id) {
                return Err(Error::Configuration(format!(
                    "cyclic <include> reference through fragment `{id}`"
                )));
            }
            let fragment = fragments.get(&id).cloned().ok_or_else(|| {
                Error::Configuration(format!("unknown sql fragment `{id}` referenced by <include>"))
            })?;
            visiting.push(id);
            let resolved = resolve_includes_inner(fragment, fragments, visiting)?;
            visiting.pop();
            resolved
        }
        SqlNode::If { test, child } => SqlNode::If {
            test,
            child: Box::new(resolve_includes_inner(*child, fragments, visiting)?),
        },
        SqlNode::Choose { when, otherwise } => SqlNode::Choose {
            when: when
                .into_iter()
                .map(|(test, n)| Ok((test, resolve_includes_inner(n, fragments, visiting)?)))
                .collect::<Result<_>>()?,
            otherwise: otherwise
                .map(|n| resolve_includes_inner(*n, fragments, visiting).map(Box::new))
                .transpose()?,
        },
        SqlNode::Where(child) => {
            SqlNode::Where(Box::new(resolve_includes_inner(*child, fragments, visiting)?))
        }
        SqlNode::Set(child) => {
            SqlNode::Set(Box::new(resolve_includes_inner(*child, fragments, visiting)?))
        }
        SqlNode::Trim {
            child,
            prefix,
            suffix,
            prefix_overrides,
            suffix_overrides,
        } => SqlNode::Trim {
            child: Box::new(resolve_includes_inner(*child, fragments, visiting)?),
            prefix,
            suffix,
            prefix_overrides,
            suffix_overrides,
        },
        SqlNode::ForEach {
            collection,
            item,
            index,
            open,
            close,
            separator,
            child,
        } => SqlNode::ForEach {
            collection,
            item,
            index,
            open,
            close,
            separator,
            child: Box::new(resolve_includes_inner(*child, fragments, visiting)?),
        },
        SqlNode::Mixed(nodes) => SqlNode::Mixed(
            nodes
                .into_iter()
                .map(|n| resolve_includes_inner(n, fragments, visiting))
                .collect::<Result<_>>()?,
        ),
        leaf => leaf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_single_level_include() {
        let mut fragments = ahash::AHashMap::default();
        fragments.insert(
            "cols".to_string(),
            SqlNode::StaticText("id, name".to_string()),
        );
        let root = SqlNode::Mixed(vec![
            SqlNode::StaticText("SELECT ".to_string()),
            SqlNode::Include("cols".to_string()),
        ]);
        let resolved = resolve_includes(root, &fragments).unwrap();
        assert_eq!(
            resolved,
            SqlNode::Mixed(vec![
                SqlNode::StaticText("SELECT ".to_string()),
                SqlNode::StaticText("id, name".to_string()),
            ])
        );
    }

    #[test]
    fn cyclic_include_is_rejected() {
        let mut fragments = ahash::AHashMap::default();
        fragments.insert("a".to_string(), SqlNode::Include("b".to_string()));
        fragments.insert("b".to_string(), SqlNode::Include("a".to_string()));
        let err = resolve_includes(SqlNode::Include("a".to_string()), &fragments).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}

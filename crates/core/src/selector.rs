//! Match specifications and the object selector built from them.
//!
//! A match specification is a list of field names, optionally followed by
//! the operators `&`, `|` and `~`. Without operators every field must match.
//! With operators the list is read as a postfix expression, so
//! `a b & c ~ d & |` means `(a AND b) OR (NOT c AND d)`.

use std::fmt;

use crate::error::CoreError;
use crate::fields::FieldMap;
use crate::predicate::Predicate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchToken {
    Field(String),
    And,
    Or,
    Not,
}

impl MatchToken {
    pub fn parse(token: &str) -> Self {
        match token {
            "&" => MatchToken::And,
            "|" => MatchToken::Or,
            "~" => MatchToken::Not,
            name => MatchToken::Field(name.to_string()),
        }
    }

    pub fn is_operator(&self) -> bool {
        !matches!(self, MatchToken::Field(_))
    }
}

impl fmt::Display for MatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchToken::Field(name) => write!(f, "{name}"),
            MatchToken::And => write!(f, "&"),
            MatchToken::Or => write!(f, "|"),
            MatchToken::Not => write!(f, "~"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSpec {
    tokens: Vec<MatchToken>,
}

impl MatchSpec {
    /// Whitespace-delimited tokens, as found in a record's match column.
    pub fn parse(spec: &str) -> Self {
        Self::from_tokens(spec.split_whitespace())
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| MatchToken::parse(t.as_ref()))
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[MatchToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn has_operators(&self) -> bool {
        self.tokens.iter().any(MatchToken::is_operator)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            MatchToken::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// The predicate locating a record's target object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSelector {
    spec: MatchSpec,
    predicate: Predicate,
}

impl ObjectSelector {
    pub fn new(spec: &MatchSpec, fields: &FieldMap) -> Result<Self, CoreError> {
        if spec.is_empty() {
            return Err(CoreError::InvalidSelector(
                "match specification is empty".into(),
            ));
        }
        if let Some(missing) = spec.field_names().find(|name| !fields.contains_key(name)) {
            return Err(CoreError::MissingMatchField(missing.to_string()));
        }

        let predicate = if spec.has_operators() {
            evaluate_postfix(spec, fields)?
        } else {
            Predicate::all(spec.field_names().map(|name| leaf(name, fields)))
        };

        Ok(Self {
            spec: spec.clone(),
            predicate,
        })
    }

    pub fn spec(&self) -> &MatchSpec {
        &self.spec
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl fmt::Display for ObjectSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.predicate)
    }
}

fn leaf(name: &str, fields: &FieldMap) -> Predicate {
    Predicate::eq(name, fields.get(name).unwrap_or_default())
}

fn evaluate_postfix(spec: &MatchSpec, fields: &FieldMap) -> Result<Predicate, CoreError> {
    let mut stack: Vec<Predicate> = Vec::new();
    for token in spec.tokens() {
        match token {
            MatchToken::Field(name) => stack.push(leaf(name, fields)),
            MatchToken::And | MatchToken::Or => {
                let operator = if *token == MatchToken::And { '&' } else { '|' };
                let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                    return Err(CoreError::InsufficientOperands { operator });
                };
                stack.push(if operator == '&' {
                    lhs.and(rhs)
                } else {
                    lhs.or(rhs)
                });
            }
            MatchToken::Not => {
                let operand = stack
                    .pop()
                    .ok_or(CoreError::InsufficientOperands { operator: '~' })?;
                stack.push(operand.negate());
            }
        }
    }

    match (stack.pop(), stack.len()) {
        (Some(predicate), 0) => Ok(predicate),
        (popped, remaining) => Err(CoreError::InsufficientOperators {
            remaining: remaining + usize::from(popped.is_some()),
        }),
    }
}

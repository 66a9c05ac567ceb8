use std::cmp::Ordering;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Lt { field: String, value: Value },
}

impl Filter {
    fn matches(&self, document: &Value) -> bool {
        match self {
            Self::Eq { field, value } => {
                compare_values(field_value(document, field), value) == Some(Ordering::Equal)
            }
            // A missing field is "not equal" to anything.
            Self::Ne { field, value } => {
                compare_values(field_value(document, field), value) != Some(Ordering::Equal)
            }
            Self::Gt { field, value } => {
                compare_values(field_value(document, field), value) == Some(Ordering::Greater)
            }
            Self::Lt { field, value } => {
                compare_values(field_value(document, field), value) == Some(Ordering::Less)
            }
        }
    }
}

/// Filters, projection and ordering evaluated against a collection on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub projection: Option<Vec<String>>,
    /// Fields to order by, ascending, in priority order.
    pub sort: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort_ascending(mut self, field: impl Into<String>) -> Self {
        self.sort.push(field.into());
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(document))
    }

    /// Filters, sorts (stable) and projects `documents`.
    pub fn apply<'a, I>(&self, documents: I) -> Vec<Value>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut matched: Vec<&Value> = documents
            .into_iter()
            .filter(|document| self.matches(document))
            .collect();

        if !self.sort.is_empty() {
            matched.sort_by(|left, right| self.compare_for_sort(left, right));
        }

        matched
            .into_iter()
            .map(|document| self.project(document))
            .collect()
    }

    fn compare_for_sort(&self, left: &Value, right: &Value) -> Ordering {
        for field in &self.sort {
            let ordering = compare_values(field_value(left, field), field_value(right, field))
                .unwrap_or(Ordering::Equal);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn project(&self, document: &Value) -> Value {
        let (Some(fields), Value::Object(object)) = (&self.projection, document) else {
            return document.clone();
        };
        let projected: Map<String, Value> = fields
            .iter()
            .filter_map(|field| object.get(field).map(|v| (field.clone(), v.clone())))
            .collect();
        Value::Object(projected)
    }
}

fn field_value<'a>(document: &'a Value, field: &str) -> &'a Value {
    document.get(field).unwrap_or(&Value::Null)
}

enum Scalar<'a> {
    Int(i128),
    Float(f64),
    Text(&'a str),
    Bool(bool),
    Null,
}

fn scalar(value: &Value) -> Option<Scalar<'_>> {
    match value {
        Value::Null => Some(Scalar::Null),
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Scalar::Int(i128::from(i)))
            } else if let Some(u) = n.as_u64() {
                Some(Scalar::Int(i128::from(u)))
            } else {
                n.as_f64().map(Scalar::Float)
            }
        }
        // Amounts and ids are frequently stored as numeric strings.
        Value::String(s) => Some(match s.parse::<i128>() {
            Ok(i) => Scalar::Int(i),
            Err(_) => Scalar::Text(s),
        }),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Loose ordering between JSON scalars. `None` when the values are not comparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (scalar(left)?, scalar(right)?) {
        (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(&b)),
        (Scalar::Int(a), Scalar::Float(b)) => (a as f64).partial_cmp(&b),
        (Scalar::Float(a), Scalar::Int(b)) => a.partial_cmp(&(b as f64)),
        (Scalar::Float(a), Scalar::Float(b)) => a.partial_cmp(&b),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(&b)),
        (Scalar::Null, Scalar::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

//! Typed query specification for listing entities.
//!
//! Callers describe *which* rows they want in terms of a per-entity field
//! enum. Column names come only from [`Field::column`], so nothing a client
//! sends can reach SQL text; values are always bound as parameters.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Hard ceiling on a single page.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Page size used when the caller does not provide one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// The value kind a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Bool,
    Integer,
}

/// A filterable, sortable column of one entity.
pub trait Field: Copy + Eq + core::fmt::Debug + Send + Sync + 'static {
    /// Column name in the backing table.
    fn column(self) -> &'static str;

    fn kind(self) -> FieldKind;

    /// Text fields that free-text search spans by default.
    fn searchable() -> &'static [Self];

    /// Ordering applied when the caller asks for none (the primary key).
    fn primary() -> Self;
}

/// Read access to field values, used by stores that evaluate queries in memory.
pub trait Queryable<F: Field> {
    fn value_of(&self, field: F) -> Value;
}

/// A scalar bound into a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::Text,
            Self::Bool(_) => FieldKind::Bool,
            Self::Integer(_) => FieldKind::Integer,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            // Mixed kinds never occur for a validated spec; keep the order total anyway.
            (a, b) => (a.kind() as u8).cmp(&(b.kind() as u8)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    /// Substring match, case-insensitive for ASCII. Text fields only.
    Contains,
}

impl Operator {
    fn accepts(self, kind: FieldKind) -> bool {
        match self {
            Self::Eq | Self::Ne => true,
            Self::Contains => kind == FieldKind::Text,
        }
    }
}

/// `field <op> value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition<F> {
    pub field: F,
    pub op: Operator,
    pub value: Value,
}

/// Free-text term matched (OR) against several text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search<F> {
    pub term: String,
    pub fields: Vec<F>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<F> {
    pub field: F,
    pub direction: Direction,
}

/// Page-number pagination. `page` is 1-based; page 0 disables paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::all()
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> Self {
        let size = match page_size {
            Some(0) | None => default_size,
            Some(n) => n,
        };
        Self {
            page: page.unwrap_or(0),
            page_size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Every row, unpaged.
    pub fn all() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn is_paged(&self) -> bool {
        self.page > 0
    }

    pub fn limit(&self) -> Option<u32> {
        self.is_paged().then_some(self.page_size)
    }

    pub fn offset(&self) -> u64 {
        if self.is_paged() {
            u64::from(self.page - 1) * u64::from(self.page_size)
        } else {
            0
        }
    }
}

/// One page of rows plus the number of rows matching the query overall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Complete description of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec<F> {
    pub conditions: Vec<Condition<F>>,
    pub search: Option<Search<F>>,
    pub sort: Vec<Sort<F>>,
    pub pagination: Pagination,
}

impl<F: Field> Default for QuerySpec<F> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            search: None,
            sort: Vec::new(),
            pagination: Pagination::all(),
        }
    }
}

impl<F: Field> QuerySpec<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: F, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field,
            op,
            value: value.into(),
        });
        self
    }

    /// Search the entity's default searchable fields. Blank terms are ignored.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        if term.trim().is_empty() {
            self.search = None;
        } else {
            self.search = Some(Search {
                term: term.trim().to_string(),
                fields: F::searchable().to_vec(),
            });
        }
        self
    }

    pub fn order_by(mut self, field: F, direction: Direction) -> Self {
        self.sort.push(Sort { field, direction });
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Sort keys, falling back to the primary key so paging is stable.
    pub fn effective_sort(&self) -> Vec<Sort<F>> {
        let mut sort = self.sort.clone();
        if !sort.iter().any(|s| s.field == F::primary()) {
            sort.push(Sort {
                field: F::primary(),
                direction: Direction::Asc,
            });
        }
        sort
    }

    /// Reject operator/value combinations that do not fit the field.
    pub fn validate(&self) -> DomainResult<()> {
        for cond in &self.conditions {
            let kind = cond.field.kind();
            if cond.value.kind() != kind {
                return Err(DomainError::malformed(format!(
                    "field '{}' expects a {:?} value",
                    cond.field.column(),
                    kind
                )));
            }
            if !cond.op.accepts(kind) {
                return Err(DomainError::malformed(format!(
                    "operator {:?} is not supported on field '{}'",
                    cond.op,
                    cond.field.column()
                )));
            }
        }
        if let Some(search) = &self.search {
            if let Some(field) = search.fields.iter().find(|f| f.kind() != FieldKind::Text) {
                return Err(DomainError::malformed(format!(
                    "field '{}' is not searchable",
                    field.column()
                )));
            }
        }
        Ok(())
    }

    /// In-memory evaluation of conditions and search.
    pub fn matches<R: Queryable<F>>(&self, row: &R) -> bool {
        let conditions = self.conditions.iter().all(|cond| {
            let actual = row.value_of(cond.field);
            match cond.op {
                Operator::Eq => actual == cond.value,
                Operator::Ne => actual != cond.value,
                Operator::Contains => contains(&actual, &cond.value),
            }
        });
        if !conditions {
            return false;
        }

        match &self.search {
            None => true,
            Some(search) => {
                let needle = Value::Text(search.term.clone());
                search
                    .fields
                    .iter()
                    .any(|field| contains(&row.value_of(*field), &needle))
            }
        }
    }

    pub fn compare<R: Queryable<F>>(&self, a: &R, b: &R) -> Ordering {
        for key in self.effective_sort() {
            let ord = a.value_of(key.field).compare(&b.value_of(key.field));
            let ord = match key.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Filter, sort and page an in-memory collection.
    pub fn apply<'a, R>(&self, rows: impl IntoIterator<Item = &'a R>) -> Page<R>
    where
        R: Queryable<F> + Clone + 'a,
    {
        let mut matched: Vec<&R> = rows.into_iter().filter(|r| self.matches(*r)).collect();
        matched.sort_by(|a, b| self.compare(*a, *b));

        let total = matched.len() as u64;
        let offset = usize::try_from(self.pagination.offset()).unwrap_or(usize::MAX);
        let limit = self
            .pagination
            .limit()
            .map(|l| l as usize)
            .unwrap_or(usize::MAX);

        Page {
            items: matched
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            total,
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Text(h), Value::Text(n)) => h.to_ascii_lowercase().contains(&n.to_ascii_lowercase()),
        _ => false,
    }
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

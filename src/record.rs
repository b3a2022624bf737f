//! Record model of the storage boundary: named collections of typed
//! records, addressed through field filters.
use crate::error::{MarketError, Result};
use crate::model::TimeStamp;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Named collections, one sled tree each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Inventory,
    Orders,
    OrderLines,
    Users,
    Admins,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Inventory => "inventory",
            Collection::Orders => "orders",
            Collection::OrderLines => "order_lines",
            Collection::Users => "users",
            Collection::Admins => "admins",
        }
    }
}

/// A field value as seen by filters, patches and sorts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Text(String),
    Number(u64),
    Time(TimeStamp<Utc>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self, field: &str) -> Result<String> {
        match self {
            Value::Text(text) => Ok(text),
            other => Err(type_mismatch(field, "text", &other)),
        }
    }

    pub fn into_number(self, field: &str) -> Result<u64> {
        match self {
            Value::Number(n) => Ok(n),
            other => Err(type_mismatch(field, "number", &other)),
        }
    }
}

fn type_mismatch(field: &str, expected: &str, got: &Value) -> MarketError {
    MarketError::InvalidOperation(format!("field {field} expects a {expected}, got {got:?}"))
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value)
    }
}

impl From<TimeStamp<Utc>> for Value {
    fn from(value: TimeStamp<Utc>) -> Self {
        Value::Time(value)
    }
}

/// A typed record persisted as CBOR under its key in its collection.
pub trait Record:
    minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> + Clone + Debug + Send + Sync + 'static
{
    const COLLECTION: Collection;
    /// Every field a filter, patch or sort may name.
    const FIELDS: &'static [&'static str];
    /// Field whose text value alone forms the key, if the key is not composite.
    const KEY_FIELD: Option<&'static str>;

    fn key(&self) -> Vec<u8>;

    fn field(&self, name: &str) -> Option<Value>;

    fn assign(&mut self, name: &str, value: Value) -> Result<()>;

    /// Exact key implied by a filter, allowing a point lookup.
    fn key_for(filter: &Filter) -> Option<Vec<u8>> {
        let field = Self::KEY_FIELD?;
        filter
            .get(field)
            .and_then(Value::as_text)
            .map(|text| text.as_bytes().to_vec())
    }

    /// Key prefix implied by a filter, allowing a range scan.
    fn prefix_for(_filter: &Filter) -> Option<Vec<u8>> {
        None
    }

    fn encode_record(&self) -> Result<Vec<u8>> {
        minicbor::to_vec(self).map_err(MarketError::codec)
    }

    fn decode_record(bytes: &[u8]) -> Result<Self> {
        minicbor::decode(bytes).map_err(MarketError::codec)
    }
}

/// Field name to expected value. A record matches when every entry is equal;
/// the empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate<R: Record>(&self) -> Result<()> {
        for field in self.0.keys() {
            ensure_field::<R>(field)?;
        }
        Ok(())
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| record.field(field).as_ref() == Some(expected))
    }
}

/// Partial update: field assignments applied in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch(Vec<(String, Value)>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.push((field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate<R: Record>(&self) -> Result<()> {
        for (field, _) in &self.0 {
            ensure_field::<R>(field)?;
            if R::KEY_FIELD == Some(field.as_str()) {
                return Err(MarketError::InvalidOperation(format!(
                    "key field {field} of {} cannot be patched",
                    R::COLLECTION.name()
                )));
            }
        }
        Ok(())
    }

    pub fn apply<R: Record>(&self, record: &mut R) -> Result<()> {
        for (field, value) in &self.0 {
            record.assign(field, value.clone())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortBy {
    pub field: String,
    pub descending: bool,
}

impl SortBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }

    /// Stable sort; records missing the field order first.
    pub fn sort<R: Record>(&self, records: &mut [R]) -> Result<()> {
        ensure_field::<R>(&self.field)?;
        records.sort_by(|a, b| self.compare(a, b));
        Ok(())
    }

    pub fn compare<R: Record>(&self, a: &R, b: &R) -> Ordering {
        let ord = a.field(&self.field).cmp(&b.field(&self.field));
        if self.descending { ord.reverse() } else { ord }
    }
}

fn ensure_field<R: Record>(field: &str) -> Result<()> {
    if R::FIELDS.contains(&field) {
        Ok(())
    } else {
        Err(MarketError::InvalidOperation(format!(
            "unknown field {field} on {}",
            R::COLLECTION.name()
        )))
    }
}

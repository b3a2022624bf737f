//! Marketplace records and the values exchanged with callers
use crate::error::{MarketError, Result};
use crate::record::{Collection, Filter, Record, Value};
use crate::utils::{child_key, parent_prefix};
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

// `Utc` itself is not `Ord`, so ordering is implemented on the instant
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

// stored as nanoseconds since the epoch so a round trip is exact
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A catalog entry. Prices are whole currency units.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Product {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub category: String,
    #[n(2)]
    pub price: u64,
}

/// Stock level of one product, keyed by product name.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct InventoryRecord {
    #[n(0)]
    pub product_name: String,
    #[n(1)]
    pub quantity_in_stock: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Order {
    #[n(0)]
    pub order_id: String,
    #[n(1)]
    pub customer_id: String,
    #[n(2)]
    pub total_cost: u64,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

/// One product of an order. Keyed by `order_id 0x00 product_name`.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct OrderLine {
    #[n(0)]
    pub order_id: String,
    #[n(1)]
    pub product_name: String,
    #[n(2)]
    pub quantity: u64,
}

/// A registered account. The password hash is produced outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct User {
    #[n(0)]
    pub username: String,
    #[n(1)]
    pub email: String,
    #[n(2)]
    pub password_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Admin {
    #[n(0)]
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

/// An authenticated caller. Built by [`crate::accounts::Accounts::principal`]
/// once the transport has verified the session, then passed explicitly to
/// every marketplace call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Rejects a principal without a username.
    pub fn require_authenticated(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(MarketError::Unauthorized(
                "caller has no username".to_string(),
            ));
        }
        Ok(())
    }

    pub fn require_admin(&self) -> Result<()> {
        self.require_authenticated()?;
        if self.is_admin() {
            Ok(())
        } else {
            Err(MarketError::Unauthorized(format!(
                "{} is not an admin",
                self.username
            )))
        }
    }
}

/// Order as returned to callers: the order joined with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub order_id: String,
    pub customer_id: String,
    pub total_cost: u64,
    /// (product name, quantity), ordered by product name
    pub lines: Vec<(String, u64)>,
    pub created_at: TimeStamp<Utc>,
}

impl OrderView {
    pub fn new(order: Order, lines: impl IntoIterator<Item = OrderLine>) -> Self {
        let mut lines: Vec<(String, u64)> = lines
            .into_iter()
            .map(|line| (line.product_name, line.quantity))
            .collect();
        lines.sort();
        Self {
            order_id: order.order_id,
            customer_id: order.customer_id,
            total_cost: order.total_cost,
            lines,
            created_at: order.created_at,
        }
    }

    pub fn contains(&self, product_name: &str) -> bool {
        self.lines.iter().any(|(name, _)| name == product_name)
    }
}

fn no_such_field(collection: Collection, field: &str) -> MarketError {
    MarketError::InvalidOperation(format!("unknown field {field} on {}", collection.name()))
}

impl Record for Product {
    const COLLECTION: Collection = Collection::Products;
    const FIELDS: &'static [&'static str] = &["name", "category", "price"];
    const KEY_FIELD: Option<&'static str> = Some("name");

    fn key(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(&self.name)),
            "category" => Some(Value::from(&self.category)),
            "price" => Some(Value::from(self.price)),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "name" => self.name = value.into_text(name)?,
            "category" => self.category = value.into_text(name)?,
            "price" => self.price = value.into_number(name)?,
            _ => return Err(no_such_field(Self::COLLECTION, name)),
        }
        Ok(())
    }
}

impl Record for InventoryRecord {
    const COLLECTION: Collection = Collection::Inventory;
    const FIELDS: &'static [&'static str] = &["product_name", "quantity_in_stock"];
    const KEY_FIELD: Option<&'static str> = Some("product_name");

    fn key(&self) -> Vec<u8> {
        self.product_name.as_bytes().to_vec()
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "product_name" => Some(Value::from(&self.product_name)),
            "quantity_in_stock" => Some(Value::from(self.quantity_in_stock)),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "product_name" => self.product_name = value.into_text(name)?,
            "quantity_in_stock" => self.quantity_in_stock = value.into_number(name)?,
            _ => return Err(no_such_field(Self::COLLECTION, name)),
        }
        Ok(())
    }
}

impl Record for Order {
    const COLLECTION: Collection = Collection::Orders;
    const FIELDS: &'static [&'static str] = &["order_id", "customer_id", "total_cost", "created_at"];
    const KEY_FIELD: Option<&'static str> = Some("order_id");

    fn key(&self) -> Vec<u8> {
        self.order_id.as_bytes().to_vec()
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "order_id" => Some(Value::from(&self.order_id)),
            "customer_id" => Some(Value::from(&self.customer_id)),
            "total_cost" => Some(Value::from(self.total_cost)),
            "created_at" => Some(Value::from(self.created_at.clone())),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match (name, value) {
            ("order_id", value) => self.order_id = value.into_text(name)?,
            ("customer_id", value) => self.customer_id = value.into_text(name)?,
            ("total_cost", value) => self.total_cost = value.into_number(name)?,
            ("created_at", Value::Time(ts)) => self.created_at = ts,
            ("created_at", other) => {
                return Err(MarketError::InvalidOperation(format!(
                    "field created_at expects a time, got {other:?}"
                )));
            }
            _ => return Err(no_such_field(Self::COLLECTION, name)),
        }
        Ok(())
    }
}

impl Record for OrderLine {
    const COLLECTION: Collection = Collection::OrderLines;
    const FIELDS: &'static [&'static str] = &["order_id", "product_name", "quantity"];
    const KEY_FIELD: Option<&'static str> = None;

    fn key(&self) -> Vec<u8> {
        child_key(&self.order_id, &self.product_name)
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "order_id" => Some(Value::from(&self.order_id)),
            "product_name" => Some(Value::from(&self.product_name)),
            "quantity" => Some(Value::from(self.quantity)),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "order_id" | "product_name" => Err(MarketError::InvalidOperation(format!(
                "{name} is part of the order_lines key"
            ))),
            "quantity" => {
                self.quantity = value.into_number(name)?;
                Ok(())
            }
            _ => Err(no_such_field(Self::COLLECTION, name)),
        }
    }

    fn key_for(filter: &Filter) -> Option<Vec<u8>> {
        let order_id = filter.get("order_id").and_then(Value::as_text)?;
        let product = filter.get("product_name").and_then(Value::as_text)?;
        Some(child_key(order_id, product))
    }

    fn prefix_for(filter: &Filter) -> Option<Vec<u8>> {
        filter
            .get("order_id")
            .and_then(Value::as_text)
            .map(parent_prefix)
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;
    const FIELDS: &'static [&'static str] = &["username", "email"];
    const KEY_FIELD: Option<&'static str> = Some("username");

    fn key(&self) -> Vec<u8> {
        self.username.as_bytes().to_vec()
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "username" => Some(Value::from(&self.username)),
            "email" => Some(Value::from(&self.email)),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "username" => self.username = value.into_text(name)?,
            "email" => self.email = value.into_text(name)?,
            _ => return Err(no_such_field(Self::COLLECTION, name)),
        }
        Ok(())
    }
}

impl Record for Admin {
    const COLLECTION: Collection = Collection::Admins;
    const FIELDS: &'static [&'static str] = &["username"];
    const KEY_FIELD: Option<&'static str> = Some("username");

    fn key(&self) -> Vec<u8> {
        self.username.as_bytes().to_vec()
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "username" => Some(Value::from(&self.username)),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "username" => self.username = value.into_text(name)?,
            _ => return Err(no_such_field(Self::COLLECTION, name)),
        }
        Ok(())
    }
}

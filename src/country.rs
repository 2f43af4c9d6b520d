use rusqlite::types::{FromSql, FromSqlResult, Null, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;

/// A single stored attribute value
///
/// Numeric columns are declared as integers, but ingestion passes cells that
/// cannot be coerced straight through, so a stored value may also be a real
/// number or text.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view used by the chart generator; text and null are missing
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(r) => ToSqlOutput::from(*r),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Value::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}

/// The optional numeric attributes of a country, in table column order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Population,
    Area,
    JoinYear,
    Gdp,
    AvgIncome,
    BorderLength,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::Population,
        Attribute::Area,
        Attribute::JoinYear,
        Attribute::Gdp,
        Attribute::AvgIncome,
        Attribute::BorderLength,
    ];

    /// Column name in the table and in source headers
    pub fn column(self) -> &'static str {
        match self {
            Attribute::Population => "population",
            Attribute::Area => "area",
            Attribute::JoinYear => "join_year",
            Attribute::Gdp => "gdp",
            Attribute::AvgIncome => "avg_income",
            Attribute::BorderLength => "border_length",
        }
    }
}

/// Name of the required text column
pub const NAME_COLUMN: &str = "name";

/// A country row that has not been stored yet
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewCountry {
    pub name: String,
    pub population: Value,
    pub area: Value,
    pub join_year: Value,
    pub gdp: Value,
    pub avg_income: Value,
    pub border_length: Value,
}

impl NewCountry {
    pub fn named(name: impl Into<String>) -> Self {
        NewCountry {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, attribute: Attribute) -> &Value {
        match attribute {
            Attribute::Population => &self.population,
            Attribute::Area => &self.area,
            Attribute::JoinYear => &self.join_year,
            Attribute::Gdp => &self.gdp,
            Attribute::AvgIncome => &self.avg_income,
            Attribute::BorderLength => &self.border_length,
        }
    }

    pub fn set(&mut self, attribute: Attribute, value: Value) {
        let slot = match attribute {
            Attribute::Population => &mut self.population,
            Attribute::Area => &mut self.area,
            Attribute::JoinYear => &mut self.join_year,
            Attribute::Gdp => &mut self.gdp,
            Attribute::AvgIncome => &mut self.avg_income,
            Attribute::BorderLength => &mut self.border_length,
        };
        *slot = value;
    }

    /// Builder-style setter, mostly for fixtures
    pub fn with(mut self, attribute: Attribute, value: impl Into<Value>) -> Self {
        self.set(attribute, value.into());
        self
    }
}

/// A stored country record
///
/// `id` is assigned by the record store and never changes afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Country {
    pub id: i64,
    #[serde(flatten)]
    pub fields: NewCountry,
}

impl Country {
    pub fn name(&self) -> &str {
        &self.fields.name
    }

    pub fn get(&self, attribute: Attribute) -> &Value {
        self.fields.get(attribute)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_is_not_numeric() {
        assert_eq!(Value::Text("n/a".into()).as_f64(), None);
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Real(f64::NAN).as_f64(), None);
    }

    #[test]
    fn country_serializes_flat() {
        let country = Country {
            id: 7,
            fields: NewCountry::named("Latvia").with(Attribute::AvgIncome, 1200),
        };
        let json = serde_json::to_value(&country).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Latvia");
        assert_eq!(json["avg_income"], 1200);
        assert!(json["gdp"].is_null());
    }
}

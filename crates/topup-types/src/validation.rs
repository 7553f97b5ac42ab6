//! Configuration validation utilities.
//!
//! Backend implementations describe the TOML table they expect with a
//! [`Schema`]; the service validates every backend table against its schema
//! before any factory is invoked.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	/// Qualifies the offending field with the table it was found in.
	fn within(self, parent: &str) -> Self {
		match self {
			Self::MissingField(field) => Self::MissingField(format!("{}.{}", parent, field)),
			Self::InvalidValue { field, message } => Self::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			Self::TypeMismatch {
				field,
				expected,
				actual,
			} => Self::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
		}
	}
}

/// Expected shape of a configuration value.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// A string restricted to a fixed set of values.
	OneOf(Vec<&'static str>),
	/// An integer within optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Array(Box<FieldType>),
	Table(Schema),
}

impl FieldType {
	fn check(&self, name: &str, value: &toml::Value) -> Result<(), ValidationError> {
		match self {
			FieldType::String => {
				expect(name, "string", value, value.as_str())?;
			}
			FieldType::OneOf(allowed) => {
				let s = expect(name, "string", value, value.as_str())?;
				if !allowed.contains(&s) {
					return Err(invalid(name, format!("'{}' is not one of {:?}", s, allowed)));
				}
			}
			FieldType::Integer { min, max } => {
				let n = expect(name, "integer", value, value.as_integer())?;
				if let Some(min) = min.filter(|min| n < *min) {
					return Err(invalid(name, format!("{} is below the minimum of {}", n, min)));
				}
				if let Some(max) = max.filter(|max| n > *max) {
					return Err(invalid(name, format!("{} is above the maximum of {}", n, max)));
				}
			}
			FieldType::Array(item) => {
				let items = expect(name, "array", value, value.as_array())?;
				for (i, element) in items.iter().enumerate() {
					item.check(&format!("{}[{}]", name, i), element)?;
				}
			}
			FieldType::Table(schema) => {
				schema.validate(value).map_err(|e| e.within(name))?;
			}
		}
		Ok(())
	}
}

fn expect<T>(
	name: &str,
	expected: &str,
	value: &toml::Value,
	typed: Option<T>,
) -> Result<T, ValidationError> {
	typed.ok_or_else(|| ValidationError::TypeMismatch {
		field: name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	})
}

fn invalid(name: &str, message: String) -> ValidationError {
	ValidationError::InvalidValue {
		field: name.to_string(),
		message,
	}
}

type Validator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field with its expected type and an optional extra check.
pub struct Field {
	name: String,
	field_type: FieldType,
	validator: Option<Validator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a check that runs once the value has the expected type.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(&self.name, value)?;

		match &self.validator {
			Some(validator) => validator(value).map_err(|message| invalid(&self.name, message)),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	required: Vec<Field>,
	optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let Some(table) = config.as_table() else {
			return Err(ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			});
		};

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.check(value)?,
				None => return Err(ValidationError::MissingField(field.name.clone())),
			}
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}
		Ok(())
	}
}

/// Implemented by every configurable backend.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

//! Catalog declared inline in the configuration file.

use crate::{CatalogError, CatalogInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use topup_types::{
	ConfigSchema, Field, FieldType, Product, Provider, Schema, ValidationError,
};

pub struct StaticCatalog {
	products: HashMap<u64, Product>,
	providers: Vec<Provider>,
}

impl StaticCatalog {
	pub fn new(products: Vec<Product>, providers: Vec<Provider>) -> Self {
		Self {
			products: products.into_iter().map(|p| (p.id, p)).collect(),
			providers,
		}
	}
}

#[async_trait]
impl CatalogInterface for StaticCatalog {
	async fn get_product_by_id(&self, id: u64) -> Result<Product, CatalogError> {
		self.products
			.get(&id)
			.cloned()
			.ok_or(CatalogError::ProductNotFound(id))
	}

	async fn get_providers_with_suppliers(&self) -> Result<Vec<Provider>, CatalogError> {
		Ok(self.providers.clone())
	}
}

pub struct StaticCatalogSchema;

impl ConfigSchema for StaticCatalogSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let product = Schema::new(
			vec![
				Field::new(
					"id",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new(
					"price",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new("supplier_code", FieldType::String),
				Field::new(
					"cash_back",
					FieldType::Table(Schema::new(
						vec![
							Field::new("type", FieldType::OneOf(vec!["percentage", "fixed"])),
							Field::new(
								"value",
								FieldType::Integer {
									min: Some(0),
									max: None,
								},
							),
						],
						vec![],
					)),
				),
			],
			vec![Field::new("name", FieldType::String)],
		);

		let provider = Schema::new(
			vec![
				Field::new("code", FieldType::String),
				Field::new("type", FieldType::String),
				Field::new("address", FieldType::String),
				Field::new(
					"weight",
					FieldType::Integer {
						min: Some(0),
						max: Some(u32::MAX as i64),
					},
				),
				Field::new("suppliers", FieldType::Array(Box::new(FieldType::String))),
			],
			vec![Field::new("name", FieldType::String)],
		);

		Schema::new(
			vec![],
			vec![
				Field::new("products", FieldType::Array(Box::new(FieldType::Table(product)))),
				Field::new("providers", FieldType::Array(Box::new(FieldType::Table(provider)))),
			],
		)
		.validate(config)
	}
}

fn parse_list<T: serde::de::DeserializeOwned>(
	config: &toml::Value,
	name: &str,
) -> Result<Vec<T>, CatalogError> {
	match config.get(name) {
		Some(value) => value
			.clone()
			.try_into()
			.map_err(|e| CatalogError::Configuration(format!("Invalid {}: {}", name, e))),
		None => Ok(Vec::new()),
	}
}

/// Factory function to create a static catalog from configuration.
///
/// Configuration parameters:
/// - `products`: array of `{ id, name, price, supplier_code, cash_back = { type, value } }`
/// - `providers`: array of `{ code, name, type, address, weight, suppliers }`
pub fn create_catalog(config: &toml::Value) -> Result<Box<dyn CatalogInterface>, CatalogError> {
	let products: Vec<Product> = parse_list(config, "products")?;
	let providers: Vec<Provider> = parse_list(config, "providers")?;

	if let Some(product) = products
		.iter()
		.find(|p| p.cash_back.compute(p.price).is_none())
	{
		return Err(CatalogError::Configuration(format!(
			"Cash back of product {} overflows at price {}",
			product.id, product.price
		)));
	}

	tracing::debug!(
		products = products.len(),
		providers = providers.len(),
		"Loaded static catalog"
	);
	Ok(Box::new(StaticCatalog::new(products, providers)))
}

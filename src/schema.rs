//! # Container Schema Module
//!
//! This module extracts and displays the schema of a NetCDF container: its
//! global attributes, dimensions and variables, all kept in file order. The
//! schema is what a subset must preserve, so it doubles as the comparison
//! target in transcoding checks.

use crate::error::AoiResult;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A named attribute with its value rendered for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub value: String,
}

/// Information about a NetCDF dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Information about a NetCDF variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub attributes: Vec<AttributeInfo>,
}

/// Ordered schema of a NetCDF container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSchema {
    pub path: String,
    pub global_attributes: Vec<AttributeInfo>,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
}

impl ContainerSchema {
    /// Reads the schema of an open file.
    pub fn from_file(file: &netcdf::File) -> AoiResult<Self> {
        let dimensions = file
            .dimensions()
            .map(|dim| DimensionInfo {
                name: dim.name(),
                length: dim.len(),
                is_unlimited: dim.is_unlimited(),
            })
            .collect();

        let mut variables = Vec::new();
        for var in file.variables() {
            variables.push(VariableInfo {
                name: var.name(),
                data_type: format_variable_type(&var.vartype()),
                dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
                shape: var.dimensions().iter().map(|d| d.len()).collect(),
                attributes: collect_attributes(var.attributes())?,
            });
        }

        Ok(ContainerSchema {
            path: crate::grid::file_label(file),
            global_attributes: collect_attributes(file.attributes())?,
            dimensions,
            variables,
        })
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionInfo> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn global_attribute(&self, name: &str) -> Option<&str> {
        self.global_attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// The schema a subset of this container is expected to have: `site`
    /// resized to `sites`, `dropped` variable attributes removed, and the
    /// `title` attribute left out of the comparison.
    pub fn expected_subset(&self, site: &str, sites: usize, dropped: &[String]) -> Self {
        let mut expected = self.clone();
        expected.global_attributes.retain(|a| a.name != "title");
        for dim in &mut expected.dimensions {
            if dim.name == site {
                dim.length = sites;
            }
        }
        for var in &mut expected.variables {
            for (name, len) in var.dimensions.iter().zip(var.shape.iter_mut()) {
                if name == site {
                    *len = sites;
                }
            }
            var.attributes.retain(|a| !dropped.contains(&a.name));
        }
        expected
    }

    /// Same schema with the generated `title` attribute and the path removed.
    pub fn without_title(&self) -> Self {
        let mut schema = self.clone();
        schema.path.clear();
        schema.global_attributes.retain(|a| a.name != "title");
        schema
    }
}

fn collect_attributes<'a>(
    attributes: impl Iterator<Item = netcdf::Attribute<'a>>,
) -> AoiResult<Vec<AttributeInfo>> {
    let mut out = Vec::new();
    for attr in attributes {
        out.push(AttributeInfo {
            name: attr.name().to_string(),
            value: format_attribute_value(&attr.value()?),
        });
    }
    Ok(out)
}

/// Extract the schema of a NetCDF file, optionally for a single variable
pub fn get_container_schema<P: AsRef<Path>>(
    file_path: P,
    variable: Option<&str>,
) -> Result<ContainerSchema> {
    let path = file_path.as_ref();
    debug!("Opening NetCDF file: {}", path.display());
    let file = netcdf::open(path)
        .with_context(|| format!("Failed to open NetCDF file: {}", path.display()))?;

    let mut schema = ContainerSchema::from_file(&file)
        .with_context(|| format!("Failed to read schema of {}", path.display()))?;
    schema.path = path.display().to_string();
    if let Some(name) = variable {
        schema.variables.retain(|v| v.name == name);
        if schema.variables.is_empty() {
            anyhow::bail!("Variable '{}' not found in {}", name, path.display());
        }
    }

    file.close().context("Failed to close NetCDF file")?;
    Ok(schema)
}

/// Format netcdf attribute value for display
pub fn format_attribute_value(value: &netcdf::AttributeValue) -> String {
    match value {
        netcdf::AttributeValue::Str(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

/// Format netcdf variable type for display
pub fn format_variable_type(var_type: &netcdf::types::NcVariableType) -> String {
    format!("{:?}", var_type)
}

/// Print the schema in human-readable format
pub fn print_schema_human(schema: &ContainerSchema) {
    println!("NetCDF Container Schema:");
    println!("  Path: {}", schema.path);
    if let Ok(metadata) = std::fs::metadata(&schema.path) {
        println!("  File Size: {:.2} MB", metadata.len() as f64 / 1_048_576.0);
    }
    println!("  Dimensions: {} total", schema.dimensions.len());
    for dim in &schema.dimensions {
        println!(
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        );
    }
    println!("  Variables: {} total", schema.variables.len());
    for var in &schema.variables {
        println!(
            "    {} ({}) - dimensions: [{}]",
            var.name,
            var.data_type,
            var.dimensions.join(", ")
        );
        for attr in &var.attributes {
            println!("      @{}: {}", attr.name, attr.value);
        }
    }
    if !schema.global_attributes.is_empty() {
        println!("  Global Attributes:");
        for attr in &schema.global_attributes {
            println!("    @{}: {}", attr.name, attr.value);
        }
    }
}

/// Print the schema in JSON format
pub fn print_schema_json(schema: &ContainerSchema) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(schema)?);
    Ok(())
}

/// Print the schema in YAML format
pub fn print_schema_yaml(schema: &ContainerSchema) -> Result<()> {
    let yaml = serde_yaml::to_string(schema).context("Failed to serialize schema to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Print the schema in CSV format (variables only)
pub fn print_schema_csv(schema: &ContainerSchema) -> Result<()> {
    println!("{}", schema_csv(schema));
    Ok(())
}

fn schema_csv(schema: &ContainerSchema) -> String {
    let mut lines = vec!["variable_name,data_type,dimensions,shape,attributes_count".to_string()];
    for var in &schema.variables {
        let shape = var
            .shape
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(";");
        lines.push(format!(
            "{},{},\"{}\",\"{}\",{}",
            var.name,
            var.data_type,
            var.dimensions.join(";"),
            shape,
            var.attributes.len()
        ));
    }
    lines.join("\n")
}

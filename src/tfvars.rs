//! Rendering of Terraform variable files.
//!
//! Values are rendered in input order so the same variable set always produces
//! byte-identical output.
use crate::util::write_atomic;
use anyhow::Result;
use std::fmt;
use std::path::Path;

pub const TFVARS_FILE: &str = "terraform.tfvars";

/// A single Terraform variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum TfValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for TfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TfValue::Null => f.write_str("null"),
            TfValue::Bool(value) => write!(f, "{value}"),
            TfValue::Int(value) => write!(f, "{value}"),
            TfValue::Float(value) => write!(f, "{value}"),
            TfValue::Str(value) => write!(f, "\"{}\"", value.replace('"', "\\\"")),
        }
    }
}

impl From<bool> for TfValue {
    fn from(value: bool) -> Self {
        TfValue::Bool(value)
    }
}

impl From<i64> for TfValue {
    fn from(value: i64) -> Self {
        TfValue::Int(value)
    }
}

impl From<u32> for TfValue {
    fn from(value: u32) -> Self {
        TfValue::Int(i64::from(value))
    }
}

impl From<f64> for TfValue {
    fn from(value: f64) -> Self {
        TfValue::Float(value)
    }
}

impl From<&str> for TfValue {
    fn from(value: &str) -> Self {
        TfValue::Str(value.to_string())
    }
}

impl From<&String> for TfValue {
    fn from(value: &String) -> Self {
        TfValue::Str(value.clone())
    }
}

impl From<String> for TfValue {
    fn from(value: String) -> Self {
        TfValue::Str(value)
    }
}

impl<T: Into<TfValue>> From<Option<T>> for TfValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TfValue::Null, Into::into)
    }
}

pub type TfVar = (&'static str, TfValue);

pub fn render_tfvars(items: &[TfVar]) -> String {
    let mut out = String::new();
    for (name, value) in items {
        out.push_str(&format!("{name} = {value}\n"));
    }
    out
}

/// Render `items` and atomically replace the file at `path`.
pub fn write_tfvars(path: &Path, items: &[TfVar]) -> Result<()> {
    write_atomic(path, render_tfvars(items).as_bytes())
}

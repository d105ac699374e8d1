//! Per-asset records produced by the parse step.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use catalog_common::{CatalogRow, Cell};

/// Catalog column holding the asset path.
pub const PATH_COLUMN: &str = "path";
/// Catalog column holding the variable names.
pub const VARIABLE_COLUMN: &str = "variable";

/// Preferred column order of the saved table.
pub const COLUMN_ORDER: &[&str] = &[
    PATH_COLUMN,
    "realm",
    VARIABLE_COLUMN,
    "frequency",
    "start_date",
    "end_date",
    "member",
    "variable_long_name",
    "variable_standard_name",
    "variable_cell_methods",
    "variable_units",
    "filename",
    "file_id",
    "timestamp",
];

/// A catalog-eligible variable of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub long_name: String,
    #[serde(default)]
    pub standard_name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub cell_methods: String,
}

/// Metadata of one successfully parsed asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub path: PathBuf,
    pub filename: String,
    pub file_id: String,
    pub timestamp: Option<String>,
    pub frequency: String,
    pub start_date: String,
    pub end_date: String,
    pub realm: Option<String>,
    pub member: Option<String>,
    pub variables: Vec<VariableDescriptor>,
}

impl AssetRecord {
    /// Flatten into a table row; variable attributes become parallel lists.
    pub fn to_row(&self) -> CatalogRow {
        let column = |f: fn(&VariableDescriptor) -> &str| -> Cell {
            Cell::list(self.variables.iter().map(|v| f(v).to_string()))
        };

        let mut row = CatalogRow::new();
        row.insert(PATH_COLUMN.into(), Cell::text(self.path.to_string_lossy()));
        row.insert("realm".into(), Cell::from(self.realm.clone()));
        row.insert(VARIABLE_COLUMN.into(), column(|v| v.name.as_str()));
        row.insert("frequency".into(), Cell::text(&self.frequency));
        row.insert("start_date".into(), Cell::text(&self.start_date));
        row.insert("end_date".into(), Cell::text(&self.end_date));
        if let Some(member) = &self.member {
            row.insert("member".into(), Cell::text(member));
        }
        row.insert("variable_long_name".into(), column(|v| v.long_name.as_str()));
        row.insert("variable_standard_name".into(), column(|v| v.standard_name.as_str()));
        row.insert("variable_cell_methods".into(), column(|v| v.cell_methods.as_str()));
        row.insert("variable_units".into(), column(|v| v.units.as_str()));
        row.insert("filename".into(), Cell::text(&self.filename));
        row.insert("file_id".into(), Cell::text(&self.file_id));
        if let Some(timestamp) = &self.timestamp {
            row.insert("timestamp".into(), Cell::text(timestamp));
        }
        row
    }
}

/// Stand-in for an asset whose parse failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidAsset {
    #[serde(rename = "INVALID_ASSET")]
    pub path: PathBuf,
    #[serde(rename = "TRACEBACK")]
    pub traceback: String,
}

/// Outcome of parsing one discovered path.
#[derive(Debug, Clone)]
pub enum ParsedAsset {
    Valid(AssetRecord),
    Invalid(InvalidAsset),
}

impl ParsedAsset {
    pub fn path(&self) -> &std::path::Path {
        match self {
            ParsedAsset::Valid(record) => &record.path,
            ParsedAsset::Invalid(invalid) => &invalid.path,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ParsedAsset::Valid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lists_are_parallel() {
        let record = AssetRecord {
            path: "/data/ocean.nc".into(),
            filename: "ocean".into(),
            file_id: "ocean".into(),
            timestamp: None,
            frequency: "1mon".into(),
            start_date: "1900-01-01, 00:00:00".into(),
            end_date: "1900-02-01, 00:00:00".into(),
            realm: Some("ocean".into()),
            member: None,
            variables: vec![
                VariableDescriptor {
                    name: "temp".into(),
                    long_name: "Temperature".into(),
                    standard_name: "sea_water_temperature".into(),
                    units: "K".into(),
                    cell_methods: String::new(),
                },
                VariableDescriptor {
                    name: "salt".into(),
                    long_name: "Salinity".into(),
                    standard_name: String::new(),
                    units: "psu".into(),
                    cell_methods: "time: mean".into(),
                },
            ],
        };
        let row = record.to_row();
        assert_eq!(row["variable"], Cell::list(["temp", "salt"]));
        assert_eq!(row["variable_standard_name"], Cell::list(["sea_water_temperature", ""]));
        assert_eq!(row["variable_cell_methods"], Cell::list(["", "time: mean"]));
        assert!(!row.contains_key("member"));
        assert!(!row.contains_key("timestamp"));

        let dated = AssetRecord {
            timestamp: Some("1900-01".into()),
            ..record
        };
        assert_eq!(dated.to_row()["timestamp"], Cell::text("1900-01"));
    }

    #[test]
    fn test_invalid_asset_json_keys() {
        let invalid = InvalidAsset {
            path: "/data/bad.nc".into(),
            traceback: "boom".into(),
        };
        let json = serde_json::to_value(&invalid).unwrap();
        assert_eq!(json["INVALID_ASSET"], "/data/bad.nc");
        assert_eq!(json["TRACEBACK"], "boom");
    }
}

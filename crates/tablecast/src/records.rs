//! Decoded row types for the monitored catalog tables.
//!
//! These mirror the JSON row images the triggers serialize into the change
//! log. Only the identity fields are required; everything else defaults so
//! that partial images (older trigger versions, trimmed pre-images) still
//! decode.

use serde::{Deserialize, Serialize};

/// A row of the `tables` catalog table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Catalog id of the table
    pub id:           i64,
    /// Table name, unique within its namespace
    pub name:         String,
    /// Owning namespace id
    #[serde(default)]
    pub namespace_id: i64,
    /// Storage format (e.g. "parquet")
    #[serde(default)]
    pub format:       Option<String>,
    /// Root location of the table's data files
    #[serde(default)]
    pub location:     Option<String>,
    /// Creation instant, as recorded by the catalog
    #[serde(default)]
    pub created_at:   Option<String>,
    /// Last update instant, as recorded by the catalog
    #[serde(default)]
    pub updated_at:   Option<String>,
}

/// A row of the `table_files` catalog table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFileRecord {
    /// Catalog id of the file entry
    pub id:              i64,
    /// Owning table id
    #[serde(default)]
    pub table_id:        i64,
    /// Path of the data file relative to the table location
    #[serde(default)]
    pub file_path:       String,
    /// File size in bytes
    #[serde(default)]
    pub file_size_bytes: i64,
    /// Number of rows in the file
    #[serde(default)]
    pub row_count:       i64,
    /// Partition spec the file belongs to, if any
    #[serde(default)]
    pub partition:       Option<String>,
    /// When the file was committed to the table
    #[serde(default)]
    pub added_at:        Option<String>,
}

/// A row of the `table_metadata` catalog table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadataRecord {
    /// Catalog id of the metadata entry
    pub id:       i64,
    /// Owning table id
    #[serde(default)]
    pub table_id: i64,
    /// Metadata version, monotonically increasing per table
    #[serde(default)]
    pub version:  i64,
    /// The metadata document itself (schema, properties, snapshots)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A row of the `table_statistics` catalog table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStatisticsRecord {
    /// Catalog id of the statistics entry
    pub id:               i64,
    /// Owning table id
    #[serde(default)]
    pub table_id:         i64,
    /// Total row count across live files
    #[serde(default)]
    pub row_count:        i64,
    /// Number of live data files
    #[serde(default)]
    pub file_count:       i64,
    /// Total bytes across live files
    #[serde(default)]
    pub total_size_bytes: i64,
    /// When the statistics were last collected
    #[serde(default)]
    pub collected_at:     Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_record_minimal_image() {
        let record: TableRecord = serde_json::from_value(json!({"id": 10, "name": "t"}))
            .expect("minimal image decodes");
        assert_eq!(record.id, 10);
        assert_eq!(record.name, "t");
        assert_eq!(record.namespace_id, 0);
        assert!(record.format.is_none());
    }

    #[test]
    fn test_table_record_requires_identity() {
        // `name` is mandatory; a payload without it must not decode.
        assert!(serde_json::from_value::<TableRecord>(json!({"id": 10})).is_err());
    }

    #[test]
    fn test_table_file_record_full_image() {
        let record: TableFileRecord = serde_json::from_value(json!({
            "id": 3,
            "table_id": 10,
            "file_path": "data/00000-0.parquet",
            "file_size_bytes": 4096,
            "row_count": 128,
            "partition": "ds=2026-07-01"
        }))
        .expect("full image decodes");
        assert_eq!(record.table_id, 10);
        assert_eq!(record.row_count, 128);
        assert_eq!(record.partition.as_deref(), Some("ds=2026-07-01"));
    }

    #[test]
    fn test_table_metadata_record_carries_document() {
        let record: TableMetadataRecord = serde_json::from_value(json!({
            "id": 5,
            "table_id": 10,
            "version": 2,
            "metadata": {"schema": {"fields": []}}
        }))
        .expect("metadata image decodes");
        assert_eq!(record.version, 2);
        assert!(record.metadata.get("schema").is_some());
    }
}

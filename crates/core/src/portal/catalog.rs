//! Fixed option lists for discovery without reading the live form.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::PortalError;
use super::traits::{check_parents, OptionSource};
use super::types::DropdownLevel;

type Talukas = BTreeMap<String, Vec<String>>;
type Districts = BTreeMap<String, Talukas>;

/// Cascading options loaded from JSON:
///
/// ```json
/// { "2024": { "Pune": { "Haveli": ["Hadapsar", "Wagholi"] } } }
/// ```
///
/// Keys enumerate in sorted order; villages keep file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog {
    years: BTreeMap<String, Districts>,
}

impl StaticCatalog {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub async fn load(path: &Path) -> Result<Self, PortalError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PortalError::CatalogLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_json(&raw).map_err(|e| PortalError::CatalogLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Number of (year, district, taluka, village) combinations.
    pub fn len(&self) -> usize {
        self.years
            .values()
            .flat_map(|districts| districts.values())
            .flat_map(|talukas| talukas.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lookup(&self, level: DropdownLevel, parents: &[String]) -> Vec<String> {
        match (level, parents) {
            (DropdownLevel::Year, []) => self.years.keys().cloned().collect(),
            (DropdownLevel::District, [year]) => self
                .years
                .get(year)
                .map(|d| d.keys().cloned().collect())
                .unwrap_or_default(),
            (DropdownLevel::Taluka, [year, district]) => self
                .years
                .get(year)
                .and_then(|d| d.get(district))
                .map(|t| t.keys().cloned().collect())
                .unwrap_or_default(),
            (DropdownLevel::Village, [year, district, taluka]) => self
                .years
                .get(year)
                .and_then(|d| d.get(district))
                .and_then(|t| t.get(taluka))
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl OptionSource for StaticCatalog {
    async fn options(
        &self,
        level: DropdownLevel,
        parents: &[String],
    ) -> Result<Vec<String>, PortalError> {
        check_parents(level, parents)?;
        Ok(self.lookup(level, parents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "2024": {
            "Pune": { "Haveli": ["Hadapsar", "Wagholi"], "Mulshi": ["Paud"] },
            "Thane": { "Bhiwandi": ["Kalher"] }
        },
        "2023": { "Pune": { "Haveli": ["Hadapsar"] } }
    }"#;

    fn parents(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cascading_lookup() {
        let catalog = StaticCatalog::from_json(CATALOG).unwrap();

        assert_eq!(
            catalog.options(DropdownLevel::Year, &[]).await.unwrap(),
            ["2023", "2024"]
        );
        assert_eq!(
            catalog
                .options(DropdownLevel::District, &parents(&["2024"]))
                .await
                .unwrap(),
            ["Pune", "Thane"]
        );
        assert_eq!(
            catalog
                .options(DropdownLevel::Village, &parents(&["2024", "Pune", "Haveli"]))
                .await
                .unwrap(),
            ["Hadapsar", "Wagholi"]
        );
        assert!(catalog
            .options(DropdownLevel::Taluka, &parents(&["2022", "Pune"]))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(catalog.len(), 5);
    }

    #[tokio::test]
    async fn test_wrong_parent_count_is_rejected() {
        let catalog = StaticCatalog::from_json(CATALOG).unwrap();
        let err = catalog
            .options(DropdownLevel::Village, &parents(&["2024"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InvalidParents { expected: 3, actual: 1, .. }));
    }

    #[tokio::test]
    async fn test_load_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let err = StaticCatalog::load(&path).await.unwrap_err();
        assert!(matches!(err, PortalError::CatalogLoad { .. }));
    }
}

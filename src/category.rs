// src/category.rs
//! Категории поверхности (биомы) и правила их сравнения.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::error::ConfigError;

/// Категория поверхности в точке, например `"plains"` или `"deep_ocean"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Self("unknown".to_string())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Правила сравнения категорий: группы «похожих» биомов и признаки воды.
#[derive(Debug, Clone, Default)]
pub struct CategoryRules {
    groups: HashMap<Category, String>,
    water_patterns: Vec<String>,
}

impl CategoryRules {
    pub fn new(
        groups: &BTreeMap<String, String>,
        water_patterns: &[String],
    ) -> Result<Self, ConfigError> {
        let mut resolved = HashMap::with_capacity(groups.len());
        for (name, group) in groups {
            if name.trim().is_empty() {
                return Err(ConfigError::UnresolvableCategory(name.clone()));
            }
            if group.trim().is_empty() {
                return Err(ConfigError::UnresolvableCategory(format!(
                    "{name} (empty group key)"
                )));
            }
            resolved.insert(Category::new(name.trim()), group.clone());
        }

        let mut patterns = Vec::with_capacity(water_patterns.len());
        for pattern in water_patterns {
            let pattern = pattern.trim().to_lowercase();
            if pattern.is_empty() {
                return Err(ConfigError::UnresolvableCategory(
                    "empty water category pattern".to_string(),
                ));
            }
            patterns.push(pattern);
        }

        Ok(Self {
            groups: resolved,
            water_patterns: patterns,
        })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self, ConfigError> {
        Self::new(&config.similar_category_groups, &config.water_categories)
    }

    /// Водная категория: имя содержит один из шаблонов (`ocean`, `river`, ...).
    #[must_use]
    pub fn is_water(&self, category: &Category) -> bool {
        self.water_patterns
            .iter()
            .any(|p| category.as_str().contains(p.as_str()))
    }

    /// Категории совпадают или входят в одну группу.
    #[must_use]
    pub fn similar(&self, a: &Category, b: &Category) -> bool {
        if a == b {
            return true;
        }
        match (self.groups.get(a), self.groups.get(b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> CategoryRules {
        let mut groups = BTreeMap::new();
        groups.insert("plains".to_string(), "flat".to_string());
        groups.insert("Meadow".to_string(), "flat".to_string());
        groups.insert("taiga".to_string(), "cold".to_string());
        CategoryRules::new(&groups, &["ocean".to_string(), "river".to_string()]).unwrap()
    }

    #[test]
    fn same_group_is_similar() {
        let rules = rules();
        assert!(rules.similar(&"plains".into(), &"meadow".into()));
        assert!(rules.similar(&"desert".into(), &"desert".into()));
        assert!(!rules.similar(&"plains".into(), &"taiga".into()));
        assert!(!rules.similar(&"plains".into(), &"desert".into()));
    }

    #[test]
    fn water_detected_by_substring() {
        let rules = rules();
        assert!(rules.is_water(&"deep_ocean".into()));
        assert!(rules.is_water(&"frozen_river".into()));
        assert!(!rules.is_water(&"plains".into()));
    }

    #[test]
    fn empty_group_key_is_rejected() {
        let mut groups = BTreeMap::new();
        groups.insert("plains".to_string(), " ".to_string());
        let err = CategoryRules::new(&groups, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvableCategory(_)));
    }
}

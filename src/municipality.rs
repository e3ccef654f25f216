//! Input JSON data model and seed selection (§3, §4.7).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Municipality {
    pub prefecture: String,
    pub city: String,
    #[serde(default)]
    pub parent: HashMap<String, u64>,
    #[serde(default)]
    pub grand_parent: HashMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct SeedTask {
    pub prefecture: String,
    pub city: String,
    pub seed_url: String,
}

/// Sums `parent` values; if the sum meets `threshold`, seeds are drawn from
/// `parent.keys()`, else from `grand_parent.keys()`. Skips municipalities
/// where both maps are empty (§4.7).
pub fn select_seeds(municipality: &Municipality, threshold: u64) -> Vec<SeedTask> {
    let parent_sum: u64 = municipality.parent.values().sum();
    let keys: Vec<&String> = if parent_sum >= threshold {
        municipality.parent.keys().collect()
    } else {
        municipality.grand_parent.keys().collect()
    };

    if municipality.parent.is_empty() && municipality.grand_parent.is_empty() {
        return Vec::new();
    }

    keys.into_iter()
        .map(|url| SeedTask {
            prefecture: municipality.prefecture.clone(),
            city: municipality.city.clone(),
            seed_url: url.clone(),
        })
        .collect()
}

pub fn load_municipalities(path: &std::path::Path) -> Result<Vec<Municipality>, crate::error::CrawlError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        crate::error::CrawlError::Config(format!("reading --input {}: {e}", path.display()))
    })?;
    let municipalities: Vec<Municipality> = serde_json::from_str(&text)
        .map_err(|e| crate::error::CrawlError::Config(format!("parsing --input {}: {e}", path.display())))?;
    Ok(municipalities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn municipality(parent: &[(&str, u64)], grand_parent: &[(&str, u64)]) -> Municipality {
        Municipality {
            prefecture: "Tokyo".into(),
            city: "Chiyoda".into(),
            parent: parent.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            grand_parent: grand_parent.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn uses_grand_parent_when_parent_sum_below_threshold() {
        let m = municipality(&[("https://a.example/idx", 3)], &[("https://b.example/idx", 1)]);
        let seeds = select_seeds(&m, 5);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].seed_url, "https://b.example/idx");
    }

    #[test]
    fn uses_parent_when_threshold_lowered() {
        let m = municipality(&[("https://a.example/idx", 3)], &[("https://b.example/idx", 1)]);
        let seeds = select_seeds(&m, 2);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].seed_url, "https://a.example/idx");
    }

    #[test]
    fn empty_maps_produce_no_seeds() {
        let m = municipality(&[], &[]);
        assert!(select_seeds(&m, 5).is_empty());
    }
}

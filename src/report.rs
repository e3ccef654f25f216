//! Denial Report Aggregator (§4.9): turns the manifest's `robots_denied`
//! events into a JSONL dump, a top-N summary, and three CSV breakdowns.

use crate::error::CrawlError;
use crate::manifest::{DenialRecord, ManifestStore};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

const TOP_N: usize = 20;

#[derive(Serialize)]
struct DenialLine<'a> {
    prefecture: &'a str,
    city: &'a str,
    host: &'a str,
    path_prefix: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
struct GroupCount<'a> {
    key: &'a str,
    count: usize,
}

#[derive(Serialize)]
struct Summary {
    total_denials: usize,
    top_by_city: Vec<(String, usize)>,
    top_by_host: Vec<(String, usize)>,
    top_by_path_prefix: Vec<(String, usize)>,
}

fn to_fs_err(path: &Path, source: std::io::Error) -> CrawlError {
    CrawlError::Filesystem {
        path: path.display().to_string(),
        source,
    }
}

/// Writes `robots_disallow_urls.jsonl`, `robots_disallow_summary.json`, and
/// the three `robots_disallow_by_*.csv` breakdowns under `report_dir`.
pub fn write(report_dir: &Path, manifest: &ManifestStore) -> Result<(), CrawlError> {
    std::fs::create_dir_all(report_dir).map_err(|e| to_fs_err(report_dir, e))?;
    let denials = manifest.denials_snapshot();

    write_jsonl(report_dir, &denials)?;

    let by_city = count_by(&denials, |d| format!("{}/{}", d.prefecture, d.city));
    let by_host = count_by(&denials, |d| d.host.clone());
    let by_path_prefix = count_by(&denials, |d| d.path_prefix.clone());

    write_csv(report_dir, "robots_disallow_by_city.csv", &by_city)?;
    write_csv(report_dir, "robots_disallow_by_domain.csv", &by_host)?;
    write_csv(report_dir, "robots_disallow_by_path_prefix.csv", &by_path_prefix)?;

    write_summary(report_dir, denials.len(), &by_city, &by_host, &by_path_prefix)?;
    Ok(())
}

fn write_jsonl(report_dir: &Path, denials: &[DenialRecord]) -> Result<(), CrawlError> {
    let path = report_dir.join("robots_disallow_urls.jsonl");
    let mut out = String::new();
    for d in denials {
        let line = DenialLine {
            prefecture: &d.prefecture,
            city: &d.city,
            host: &d.host,
            path_prefix: &d.path_prefix,
            url: &d.url,
        };
        out.push_str(&serde_json::to_string(&line).unwrap_or_default());
        out.push('\n');
    }
    std::fs::write(&path, out).map_err(|e| to_fs_err(&path, e))
}

fn count_by(denials: &[DenialRecord], key_of: impl Fn(&DenialRecord) -> String) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for d in denials {
        *counts.entry(key_of(d)).or_insert(0) += 1;
    }
    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs
}

fn write_csv(report_dir: &Path, filename: &str, counts: &[(String, usize)]) -> Result<(), CrawlError> {
    let path = report_dir.join(filename);
    let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_err(&path, e))?;
    for (key, count) in counts {
        writer
            .serialize(GroupCount { key, count: *count })
            .map_err(|e| csv_err(&path, e))?;
    }
    writer.flush().map_err(|e| to_fs_err(&path, e))
}

fn csv_err(path: &Path, source: csv::Error) -> CrawlError {
    match source.into_kind() {
        csv::ErrorKind::Io(io_err) => to_fs_err(path, io_err),
        other => CrawlError::Filesystem {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        },
    }
}

fn write_summary(
    report_dir: &Path,
    total: usize,
    by_city: &[(String, usize)],
    by_host: &[(String, usize)],
    by_path_prefix: &[(String, usize)],
) -> Result<(), CrawlError> {
    let summary = Summary {
        total_denials: total,
        top_by_city: by_city.iter().take(TOP_N).cloned().collect(),
        top_by_host: by_host.iter().take(TOP_N).cloned().collect(),
        top_by_path_prefix: by_path_prefix.iter().take(TOP_N).cloned().collect(),
    };
    let path = report_dir.join("robots_disallow_summary.json");
    let json = serde_json::to_string_pretty(&summary).unwrap_or_default();
    std::fs::write(&path, json).map_err(|e| to_fs_err(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denial(prefecture: &str, city: &str, host: &str, path_prefix: &str) -> DenialRecord {
        DenialRecord {
            prefecture: prefecture.to_string(),
            city: city.to_string(),
            host: host.to_string(),
            path_prefix: path_prefix.to_string(),
            url: format!("https://{host}{path_prefix}/doc.pdf"),
        }
    }

    #[test]
    fn counts_group_and_sort_descending() {
        let denials = vec![
            denial("Tokyo", "Chiyoda", "a.example", "/private"),
            denial("Tokyo", "Chiyoda", "a.example", "/private"),
            denial("Tokyo", "Minato", "b.example", "/secret"),
        ];
        let by_host = count_by(&denials, |d| d.host.clone());
        assert_eq!(by_host[0], ("a.example".to_string(), 2));
        assert_eq!(by_host[1], ("b.example".to_string(), 1));
    }

    #[test]
    fn writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let denials = vec![denial("Tokyo", "Chiyoda", "a.example", "/private")];
        write_jsonl(dir.path(), &denials).unwrap();
        assert!(dir.path().join("robots_disallow_urls.jsonl").exists());

        let by_host = count_by(&denials, |d| d.host.clone());
        write_csv(dir.path(), "robots_disallow_by_domain.csv", &by_host).unwrap();
        assert!(dir.path().join("robots_disallow_by_domain.csv").exists());

        write_summary(dir.path(), denials.len(), &[], &by_host, &[]).unwrap();
        assert!(dir.path().join("robots_disallow_summary.json").exists());
    }
}

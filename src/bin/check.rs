use anyhow::{Context, Result, bail};
use nft_metadata_host::config::Config;
use nft_metadata_host::metadata::{Attribute, is_compliant, missing_required_fields};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn main() -> Result<()> {
    let cfg = Config::load("config.yaml").ok();
    let data_dir = cfg
        .as_ref()
        .map(|c| c.store.data_dir.clone())
        .unwrap_or_else(|| "public/metadata".to_string());
    let data_dir = Path::new(&data_dir);

    let files = collect_json_files(data_dir)
        .with_context(|| format!("metadata ディレクトリが読めません: {:?}", data_dir))?;

    let mut total = 0usize;
    let mut stats: HashMap<String, HashMap<String, usize>> = HashMap::new();
    let mut violation_count = 0usize;
    let mut violation_examples: Vec<(String, String)> = Vec::new();
    let max_examples = 20usize;

    for path in files {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("JSON 読み込み失敗: {:?}", path))?;

        total += 1;

        let file = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>")
            .to_string();

        // 壊れたJSONもホストはそのまま抱えるため、ここで違反として数える
        let Ok(doc) = serde_json::from_str::<Value>(&text) else {
            violation_count += 1;
            if violation_examples.len() < max_examples {
                violation_examples.push((file, "not valid JSON".to_string()));
            }
            continue;
        };

        if !is_compliant(&doc) {
            violation_count += 1;
            if violation_examples.len() < max_examples {
                let missing = match doc.as_object() {
                    Some(map) => missing_required_fields(map),
                    None => vec!["name", "description", "image"],
                };
                violation_examples.push((file, format!("missing fields: {}", missing.join(", "))));
            }
        }

        let Some(attributes) = doc.get("attributes").and_then(Value::as_array) else {
            continue;
        };
        for raw in attributes {
            let Ok(attr) = serde_json::from_value::<Attribute>(raw.clone()) else {
                continue;
            };
            let value_map = stats.entry(attr.trait_type).or_insert_with(HashMap::new);
            *value_map.entry(attr.value).or_insert(0) += 1;
        }
    }

    println!("==============================");
    println!(" NFT Metadata Check");
    println!(" Total documents: {}", total);
    if let Some(counter) = read_counter(data_dir) {
        println!(" Counter: {}", counter);
    }
    println!("==============================\n");

    for (trait_type, values) in stats {
        println!("▶ Trait: {}", trait_type);

        let mut sorted: Vec<_> = values.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        for (value, count) in sorted {
            let ratio = count as f64 / total as f64 * 100.0;
            println!("  {:30} {:5} ({:.2}%)", value, count, ratio);
        }
        println!();
    }

    println!("==============================");
    println!(" Schema Check");
    println!(" Violations(documents): {}", violation_count);
    println!("==============================");

    if violation_count == 0 {
        println!("✅ スキーマ違反は見つかりませんでした");
    } else {
        println!("❌ スキーマ違反が見つかりました（最大 {} 件表示）:", max_examples);
        for (file, msg) in &violation_examples {
            println!("  - {} : {}", file, msg);
        }
    }

    if violation_count > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// データディレクトリ以下の JSON ファイルを列挙（counter は拡張子無しなので外れる）
fn collect_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("ディレクトリがありません: {:?}", dir);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.into_path();
        if let Some(ext) = path.extension() {
            if ext.eq_ignore_ascii_case("json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn read_counter(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join("counter"))
        .ok()
        .map(|text| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir(tag: &str) -> PathBuf {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        std::env::temp_dir().join(format!(
            "nft-metadata-host-check-{tag}-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[test]
    fn missing_data_dir_is_an_error() {
        let dir = temp_dir("missing");
        assert!(collect_json_files(&dir).is_err());
    }

    #[test]
    fn only_json_documents_are_collected() {
        let dir = temp_dir("scan");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("1.json"), "{}").unwrap();
        fs::write(dir.join("2.JSON"), "{}").unwrap();
        fs::write(dir.join("counter"), "2").unwrap();

        let files = collect_json_files(&dir).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().is_some()));
        assert_eq!(read_counter(&dir).as_deref(), Some("2"));

        fs::remove_dir_all(&dir).unwrap();
    }
}

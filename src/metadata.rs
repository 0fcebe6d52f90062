use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// 画像が未設定のトークンに返すプレースホルダー
pub const DEFAULT_FALLBACK_IMAGE: &str = "https://placehold.co/600x600/1a1a2e/e8e8e8?text=NFT";

/// 配信前に必ず埋まっていなければならないフィールド
pub const REQUIRED_FIELDS: [&str; 3] = ["name", "description", "image"];

#[derive(Debug, Serialize, Deserialize)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

/// 保存値の状態ごとの配信結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// 保存されたドキュメントをそのまま返した
    Found,
    /// 必須フィールドを補完して返した
    Backfilled,
    /// 保存値がJSONとして読めずデフォルトに差し替えた
    Malformed,
    /// 保存値が存在せずデフォルトを合成した
    Missing,
}

/// 保存値から配信用ドキュメントを組み立てる
///
/// どの入力に対しても必須フィールドの揃ったドキュメントを返す。
/// 保存済みの余分なフィールドと attributes は手を付けずに通す。
pub fn resolve_document(
    stored: Option<&str>,
    token_id: &str,
    fallback_image: &str,
) -> (Value, ResolveOutcome) {
    let Some(raw) = stored else {
        return (default_document(token_id, fallback_image), ResolveOutcome::Missing);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(mut doc)) => {
            if missing_required_fields(&doc).is_empty() {
                (Value::Object(doc), ResolveOutcome::Found)
            } else {
                backfill_required_fields(&mut doc, token_id, fallback_image);
                (Value::Object(doc), ResolveOutcome::Backfilled)
            }
        }
        // オブジェクト以外のJSON(配列や数値)もスキーマを満たせない
        Ok(_) | Err(_) => (
            invalid_json_document(token_id, fallback_image),
            ResolveOutcome::Malformed,
        ),
    }
}

/// 必須フィールドのうち未設定のものを返す
pub fn missing_required_fields(doc: &Map<String, Value>) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .filter(|field| !is_field_set(doc, field))
        .copied()
        .collect()
}

pub fn is_compliant(doc: &Value) -> bool {
    match doc.as_object() {
        Some(map) => missing_required_fields(map).is_empty(),
        None => false,
    }
}

/// 未設定の必須フィールドだけをデフォルト値で埋める
pub fn backfill_required_fields(doc: &mut Map<String, Value>, token_id: &str, fallback_image: &str) {
    if !is_field_set(doc, "name") {
        doc.insert("name".to_string(), json!(format!("NFT #{token_id}")));
    }
    if !is_field_set(doc, "description") {
        doc.insert(
            "description".to_string(),
            json!(format!("This is NFT with token ID {token_id}")),
        );
    }
    if !is_field_set(doc, "image") {
        doc.insert("image".to_string(), json!(fallback_image));
    }
}

/// 空文字・0・false・null は未設定として扱う
fn is_field_set(doc: &Map<String, Value>, field: &str) -> bool {
    match doc.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Some(_) => true,
    }
}

/// 保存値が無いトークンに返す完全なデフォルトドキュメント
pub fn default_document(token_id: &str, fallback_image: &str) -> Value {
    let metadata = NftMetadata {
        name: format!("NFT #{token_id}"),
        description: format!("This is NFT with token ID {token_id}"),
        image: fallback_image.to_string(),
        attributes: Vec::new(),
    };
    serde_json::to_value(metadata).expect("NftMetadata は必ずJSONへ変換できる")
}

/// 保存値がJSONとして壊れていたトークンに返すドキュメント
pub fn invalid_json_document(token_id: &str, fallback_image: &str) -> Value {
    json!({
        "name": format!("NFT #{token_id}"),
        "description": format!("Invalid metadata format for token ID {token_id}"),
        "image": fallback_image,
        "attributes": [],
        "error": "Original metadata was not valid JSON",
    })
}

/// ストア障害時に200で返すエラー注記付きドキュメント
pub fn store_error_document(token_id: &str, fallback_image: &str, details: &str) -> Value {
    json!({
        "name": format!("Error NFT #{token_id}"),
        "description": format!("Error retrieving metadata for token ID {token_id}"),
        "image": fallback_image,
        "attributes": [],
        "error": "Failed to fetch metadata",
        "details": details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "https://img.example/default.png";

    #[test]
    fn compliant_document_is_served_unchanged() {
        let stored = r#"{"name":"Ape #7","description":"rare","image":"ipfs://x","attributes":[{"trait_type":"Fur","value":"Gold"}]}"#;
        let (doc, outcome) = resolve_document(Some(stored), "7", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Found);
        assert_eq!(doc["name"], "Ape #7");
        assert_eq!(doc["attributes"][0]["trait_type"], "Fur");
    }

    #[test]
    fn missing_fields_are_backfilled_without_touching_present_ones() {
        let stored = r#"{"name":"Keeper","attributes":[{"trait_type":"Eyes","value":"Laser"}],"external_url":"https://x"}"#;
        let (doc, outcome) = resolve_document(Some(stored), "9", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Backfilled);
        assert_eq!(doc["name"], "Keeper");
        assert_eq!(doc["description"], "This is NFT with token ID 9");
        assert_eq!(doc["image"], FALLBACK);
        assert_eq!(doc["external_url"], "https://x");
        assert_eq!(doc["attributes"][0]["value"], "Laser");
    }

    #[test]
    fn empty_object_gets_all_required_fields_backfilled() {
        let (doc, outcome) = resolve_document(Some("{}"), "4", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Backfilled);
        assert_eq!(doc["name"], "NFT #4");
        assert_eq!(doc["description"], "This is NFT with token ID 4");
        assert_eq!(doc["image"], FALLBACK);
        assert!(is_compliant(&doc));
    }

    #[test]
    fn falsy_values_count_as_missing() {
        let stored = r#"{"name":"","description":null,"image":0}"#;
        let (doc, outcome) = resolve_document(Some(stored), "3", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Backfilled);
        assert_eq!(doc["name"], "NFT #3");
        assert_eq!(doc["description"], "This is NFT with token ID 3");
        assert_eq!(doc["image"], FALLBACK);
    }

    #[test]
    fn absent_value_yields_full_default_document() {
        let (doc, outcome) = resolve_document(None, "12", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Missing);
        assert_eq!(doc["name"], "NFT #12");
        assert_eq!(doc["description"], "This is NFT with token ID 12");
        assert_eq!(doc["image"], FALLBACK);
        assert_eq!(doc["attributes"], json!([]));
        assert!(is_compliant(&doc));
    }

    #[test]
    fn unparseable_value_yields_error_annotated_default() {
        let (doc, outcome) = resolve_document(Some("{not json"), "5", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Malformed);
        assert_eq!(doc["name"], "NFT #5");
        assert_eq!(doc["description"], "Invalid metadata format for token ID 5");
        assert_eq!(doc["error"], "Original metadata was not valid JSON");
        assert!(is_compliant(&doc));
    }

    #[test]
    fn non_object_json_is_treated_as_malformed() {
        let (_, outcome) = resolve_document(Some("[1,2,3]"), "5", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Malformed);
        let (_, outcome) = resolve_document(Some("42"), "5", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Malformed);
    }

    #[test]
    fn store_error_document_is_compliant_and_annotated() {
        let doc = store_error_document("8", FALLBACK, "connection refused");
        assert_eq!(doc["name"], "Error NFT #8");
        assert_eq!(doc["description"], "Error retrieving metadata for token ID 8");
        assert_eq!(doc["error"], "Failed to fetch metadata");
        assert_eq!(doc["details"], "connection refused");
        assert!(is_compliant(&doc));
    }

    #[test]
    fn compliance_requires_all_three_fields_on_an_object() {
        assert!(is_compliant(&json!({
            "name": "x", "description": "y", "image": "z"
        })));
        assert!(!is_compliant(&json!({ "name": "x" })));
        assert!(!is_compliant(&json!("scalar")));
        assert!(!is_compliant(&json!([1, 2])));
    }

    #[test]
    fn numeric_and_boolean_fields_can_satisfy_the_schema() {
        let stored = r#"{"name":1,"description":true,"image":"x"}"#;
        let (_, outcome) = resolve_document(Some(stored), "1", FALLBACK);
        assert_eq!(outcome, ResolveOutcome::Found);
    }
}

/// トークンIDを保存キーで使う10進表記へ正規化する
///
/// `.json` サフィックスは1回だけ取り除く。`0x` 付き、または16進にしか
/// 読めない値(a〜fを含む)は10進へ変換する。それ以外はそのまま返す。
pub fn normalize_token_id(raw: &str) -> String {
    let id = strip_json_suffix(raw);
    if !is_hex_id(id) {
        return id.to_string();
    }
    let digits = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    match u128::from_str_radix(digits, 16) {
        Ok(value) => value.to_string(),
        // 変換できない値は取り違えを避けて元の表記のまま使う
        Err(_) => id.to_string(),
    }
}

fn strip_json_suffix(raw: &str) -> &str {
    raw.strip_suffix(".json").unwrap_or(raw)
}

/// 10進としても読める "42" のような値は16進扱いにしない
fn is_hex_id(id: &str) -> bool {
    if id.starts_with("0x") || id.starts_with("0X") {
        return true;
    }
    !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_hexdigit())
        && id.bytes().any(|b| b.is_ascii_alphabetic())
}

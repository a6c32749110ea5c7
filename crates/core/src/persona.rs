//! Persona system: shopkeeper personality and reference data folded into
//! the system prompt.
//!
//! Three files feed the prompt, all loaded once at startup:
//!
//! 1. **Persona**: `persona.txt`, free text describing how the owner talks (required)
//! 2. **Store info**: `store.json`, name / address / hours / seats (optional)
//! 3. **Menu**: `menu.json`, an array of dishes with category, price, description (optional)
//!
//! The prompt is assembled as persona, then the store-info block, then the
//! menu under its own heading. A configured override replaces all of it.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::PersonaError;

/// Category shown for menu items that have none.
pub const UNCATEGORIZED: &str = "未分類";
/// Description shown for menu items that have none.
pub const NO_DESCRIPTION: &str = "説明なし";
/// Heading placed above the rendered menu.
pub const MENU_HEADING: &str = "以下は店舗のメニューです：";

/// Where to load reference data from.
#[derive(Debug, Clone, Default)]
pub struct PersonaPaths {
    /// Persona text file
    pub persona: PathBuf,

    /// Menu JSON file
    pub menu: Option<PathBuf>,

    /// Store info JSON file
    pub store: Option<PathBuf>,

    /// Optional system prompt override (skips all file loading)
    pub system_prompt_override: Option<String>,
}

/// The assembled system prompt plus what went into it.
#[derive(Debug, Clone)]
pub struct Persona {
    /// System prompt sent as the first message of every context
    pub system_prompt: String,

    /// Which files were loaded (for diagnostics)
    pub loaded_files: Vec<String>,

    /// Number of menu items rendered
    pub menu_items: usize,
}

/// Store information as written in `store.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreInfo {
    #[serde(rename = "店名")]
    pub name: String,
    #[serde(rename = "住所")]
    pub address: String,
    #[serde(rename = "電話")]
    pub phone: String,
    #[serde(rename = "営業時間")]
    pub hours: BusinessHours,
    #[serde(rename = "定休日")]
    pub closed_on: String,
    #[serde(rename = "席数")]
    pub seats: Seats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BusinessHours {
    #[serde(rename = "平日")]
    pub weekday: String,
    #[serde(rename = "土日祝")]
    pub weekend: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Seats {
    #[serde(rename = "カウンター")]
    pub counter: u32,
    #[serde(rename = "テーブル")]
    pub table: u32,
}

impl StoreInfo {
    /// Render the store-info block.
    pub fn render(&self) -> String {
        format!(
            "店舗情報：\n\
             店名：{}\n\
             住所：{}\n\
             電話番号：{}\n\
             営業時間：平日 {}、土日祝 {}\n\
             定休日：{}\n\
             席数：全{}席（カウンター{}席、テーブル{}席）",
            self.name,
            self.address,
            self.phone,
            self.hours.weekday,
            self.hours.weekend,
            self.closed_on,
            u64::from(self.seats.counter) + u64::from(self.seats.table),
            self.seats.counter,
            self.seats.table,
        )
    }
}

/// One menu entry. Menu files mix Japanese and English keys, so items are
/// read field by field rather than through a fixed schema.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub category: Option<String>,
    pub name: String,
    pub price: Option<String>,
    pub description: Option<String>,
}

impl MenuItem {
    /// Build an item from one element of the menu array. Items without a
    /// name are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = first_text(value, &["品名", "name"])?;
        Some(Self {
            category: first_text(value, &["カテゴリ", "category"]),
            name,
            price: first_text(value, &["価格", "price"]),
            description: first_text(value, &["説明", "description"]),
        })
    }

    /// `【category】name（price円）: description`
    pub fn render(&self) -> String {
        let category = self.category.as_deref().unwrap_or(UNCATEGORIZED);
        let description = self.description.as_deref().unwrap_or(NO_DESCRIPTION);
        match &self.price {
            Some(price) => format!("【{category}】{}（{price}円）: {description}", self.name),
            None => format!("【{category}】{}: {description}", self.name),
        }
    }
}

/// First non-empty string or number found under any of `keys`.
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl Persona {
    /// Load reference data and assemble the system prompt.
    ///
    /// The persona file is required. Missing menu or store files are skipped
    /// with a warning; files that exist but fail to parse are errors.
    pub fn load(paths: &PersonaPaths) -> Result<Self, PersonaError> {
        if let Some(override_prompt) = &paths.system_prompt_override {
            debug!("Using system prompt override, skipping file loading");
            return Ok(Self {
                system_prompt: override_prompt.clone(),
                loaded_files: vec!["<override>".into()],
                menu_items: 0,
            });
        }

        let mut loaded_files = Vec::new();

        let persona_text = read_required(&paths.persona)?;
        loaded_files.push(paths.persona.display().to_string());

        let store = match &paths.store {
            Some(path) => match read_optional(path)? {
                Some(content) => {
                    let info: StoreInfo = parse_json(path, &content)?;
                    loaded_files.push(path.display().to_string());
                    Some(info)
                }
                None => None,
            },
            None => None,
        };

        let menu = match &paths.menu {
            Some(path) => match read_optional(path)? {
                Some(content) => {
                    let raw: Vec<Value> = parse_json(path, &content)?;
                    loaded_files.push(path.display().to_string());
                    raw.iter().filter_map(MenuItem::from_value).collect()
                }
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        let persona = Self::from_parts(&persona_text, store.as_ref(), &menu);
        debug!(
            files_loaded = loaded_files.len(),
            menu_items = persona.menu_items,
            prompt_len = persona.system_prompt.len(),
            "Persona loaded"
        );

        Ok(Self {
            loaded_files,
            ..persona
        })
    }

    /// Assemble the system prompt from already-loaded parts.
    pub fn from_parts(persona: &str, store: Option<&StoreInfo>, menu: &[MenuItem]) -> Self {
        let mut sections = vec![persona.trim().to_string()];

        if let Some(store) = store {
            sections.push(store.render());
        }

        if !menu.is_empty() {
            let lines: Vec<String> = menu.iter().map(MenuItem::render).collect();
            sections.push(format!("{MENU_HEADING}\n{}", lines.join("\n")));
        }

        Self {
            system_prompt: sections.join("\n\n"),
            loaded_files: Vec::new(),
            menu_items: menu.len(),
        }
    }

    /// Get a diagnostic summary of loaded reference data.
    pub fn diagnostic_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!(
            "System Prompt: {} chars\n",
            self.system_prompt.chars().count()
        ));
        summary.push_str(&format!("Menu Items: {}\n", self.menu_items));
        summary.push_str(&format!("Files Loaded: {}\n", self.loaded_files.len()));
        for f in &self.loaded_files {
            summary.push_str(&format!("  - {f}\n"));
        }
        summary
    }
}

fn read_required(path: &Path) -> Result<String, PersonaError> {
    std::fs::read_to_string(path).map_err(|e| PersonaError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, PersonaError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(file = %path.display(), "Reference data file not found, skipping");
            Ok(None)
        }
        Err(e) => Err(PersonaError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> Result<T, PersonaError> {
    serde_json::from_str(content).map_err(|e| PersonaError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const STORE_JSON: &str = r#"{
        "店名": "居酒屋ねこ",
        "住所": "東京都台東区1-2-3",
        "電話": "03-1234-5678",
        "営業時間": { "平日": "17:00-23:00", "土日祝": "16:00-22:00" },
        "定休日": "月曜日",
        "席数": { "カウンター": 8, "テーブル": 16 }
    }"#;

    const MENU_JSON: &str = r#"[
        { "カテゴリ": "焼き物", "品名": "焼き鳥盛り合わせ", "価格": 980, "説明": "5本盛り" },
        { "name": "Edamame", "price": "400" },
        { "カテゴリ": "飲み物" }
    ]"#;

    fn write_files(dir: &Path) -> PersonaPaths {
        fs::write(dir.join("persona.txt"), "あなたは気さくな店主です。\n").unwrap();
        fs::write(dir.join("store.json"), STORE_JSON).unwrap();
        fs::write(dir.join("menu.json"), MENU_JSON).unwrap();
        PersonaPaths {
            persona: dir.join("persona.txt"),
            menu: Some(dir.join("menu.json")),
            store: Some(dir.join("store.json")),
            system_prompt_override: None,
        }
    }

    #[test]
    fn store_info_renders_total_seats() {
        let info: StoreInfo = serde_json::from_str(STORE_JSON).unwrap();
        let block = info.render();
        assert!(block.starts_with("店舗情報："));
        assert!(block.contains("店名：居酒屋ねこ"));
        assert!(block.contains("営業時間：平日 17:00-23:00、土日祝 16:00-22:00"));
        assert!(block.contains("席数：全24席（カウンター8席、テーブル16席）"));
    }

    #[test]
    fn huge_seat_counts_do_not_overflow() {
        let info: StoreInfo = serde_json::from_str(
            r#"{ "席数": { "カウンター": 4294967295, "テーブル": 4294967295 } }"#,
        )
        .unwrap();
        assert!(info.render().contains("全8589934590席"));
    }

    #[test]
    fn menu_item_accepts_japanese_and_english_keys() {
        let items: Vec<Value> = serde_json::from_str(MENU_JSON).unwrap();
        let parsed: Vec<MenuItem> = items.iter().filter_map(MenuItem::from_value).collect();
        assert_eq!(parsed.len(), 2, "nameless item is skipped");

        assert_eq!(parsed[0].render(), "【焼き物】焼き鳥盛り合わせ（980円）: 5本盛り");
        assert_eq!(parsed[1].render(), "【未分類】Edamame（400円）: 説明なし");
    }

    #[test]
    fn menu_item_without_price_omits_yen() {
        let item = MenuItem {
            category: None,
            name: "おまかせ".into(),
            price: None,
            description: Some("時価".into()),
        };
        assert_eq!(item.render(), "【未分類】おまかせ: 時価");
    }

    #[test]
    fn load_assembles_sections_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_files(dir.path());

        let persona = Persona::load(&paths).unwrap();
        let prompt = &persona.system_prompt;

        let persona_pos = prompt.find("気さくな店主").unwrap();
        let store_pos = prompt.find("店舗情報：").unwrap();
        let menu_pos = prompt.find(MENU_HEADING).unwrap();
        assert!(persona_pos < store_pos && store_pos < menu_pos);
        assert_eq!(persona.loaded_files.len(), 3);
        assert_eq!(persona.menu_items, 2);
    }

    #[test]
    fn missing_persona_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PersonaPaths {
            persona: dir.path().join("absent.txt"),
            ..PersonaPaths::default()
        };
        assert!(matches!(Persona::load(&paths), Err(PersonaError::Read { .. })));
    }

    #[test]
    fn missing_menu_and_store_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("persona.txt"), "店主です。").unwrap();
        let paths = PersonaPaths {
            persona: dir.path().join("persona.txt"),
            menu: Some(dir.path().join("menu.json")),
            store: Some(dir.path().join("store.json")),
            system_prompt_override: None,
        };

        let persona = Persona::load(&paths).unwrap();
        assert_eq!(persona.system_prompt, "店主です。");
        assert_eq!(persona.loaded_files.len(), 1);
    }

    #[test]
    fn malformed_menu_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_files(dir.path());
        fs::write(dir.path().join("menu.json"), "{ not json").unwrap();
        paths.store = None;

        assert!(matches!(Persona::load(&paths), Err(PersonaError::Parse { .. })));
    }

    #[test]
    fn override_skips_files() {
        let paths = PersonaPaths {
            persona: PathBuf::from("/nonexistent/persona.txt"),
            system_prompt_override: Some("You are a test bot.".into()),
            ..PersonaPaths::default()
        };
        let persona = Persona::load(&paths).unwrap();
        assert_eq!(persona.system_prompt, "You are a test bot.");
        assert_eq!(persona.loaded_files, vec!["<override>".to_string()]);
    }

    #[test]
    fn diagnostic_summary_lists_files() {
        let dir = tempfile::tempdir().unwrap();
        let persona = Persona::load(&write_files(dir.path())).unwrap();
        let summary = persona.diagnostic_summary();
        assert!(summary.contains("Menu Items: 2"));
        assert!(summary.contains("persona.txt"));
    }
}

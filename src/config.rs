use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use slug::slugify;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::Tax;

pub const ENV_API_URL: &str = "JEWELRY_DESK_API_URL";
pub const ENV_API_TOKEN: &str = "JEWELRY_DESK_API_TOKEN";

const DEFAULT_SELLER_TEMPLATE: &str = include_str!("../seller.toml");

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    pub data_root: String,
    pub api_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typst_bin: Option<String>,
}

impl AppSettings {
    /// Environment variables win over the saved file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(token) = env::var(ENV_API_TOKEN) {
            if !token.trim().is_empty() {
                self.api_token = Some(token);
            }
        }
        self
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(expand_home_dir(&self.data_root))
    }
}

/// Company identity printed on contracts, plus the tax catalog used by the calculator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SellerConfig {
    pub name: String,
    pub address: String,
    pub tax_code: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bank_account: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub representative: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub payment_qr: Option<String>,
    #[serde(default)]
    pub taxes: Vec<Tax>,
}

impl SellerConfig {
    pub fn embedded_default() -> Result<Self> {
        Ok(toml::from_str(DEFAULT_SELLER_TEMPLATE)?)
    }
}

/// Layout of the data directory:
///
/// ```text
/// <root>/seller.toml
/// <root>/templates/*.tera, *.docx
/// <root>/output/<year>/<customer>/...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn output_root(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Creates `output/<year>/<customer-slug>` if needed.
    pub fn output_dir(&self, year: i32, customer_name: &str) -> Result<PathBuf> {
        let customer = match slugify(customer_name) {
            s if s.is_empty() => "khach-le".to_string(),
            s => s,
        };
        let dir = self.output_root().join(year.to_string()).join(customer);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Reads `seller.toml`, writing the embedded default on first use.
    pub fn load_seller(&self) -> Result<SellerConfig> {
        let path = self.root.join("seller.toml");
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Ok(toml::from_str(&content)?)
        } else {
            info!(path = %path.display(), "Initializing default seller configuration");
            fs::create_dir_all(&self.root)?;
            fs::write(&path, DEFAULT_SELLER_TEMPLATE)?;
            SellerConfig::embedded_default()
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("vn", "jewelry-desk", "app") {
        let config_dir = proj_dirs.config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir).ok();
        }
        return config_dir.join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// `None` when no settings have been saved yet or the file cannot be parsed.
pub fn load_settings_from(path: &Path) -> Option<AppSettings> {
    if !path.exists() {
        return None;
    }
    let content = fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(settings) => Some(settings),
        Err(e) => {
            debug!(error = %e, path = %path.display(), "Ignoring unreadable settings");
            None
        }
    }
}

pub fn load_settings() -> Option<AppSettings> {
    load_settings_from(&config_path())
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    let toml_str = toml::to_string_pretty(settings)?;
    fs::write(path, toml_str)?;
    Ok(())
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_seller_has_tax_catalog() {
        let seller = SellerConfig::embedded_default().unwrap();
        assert!(seller.taxes.iter().any(|t| t.id == "vat8"));
        assert!(seller.payment_qr.is_none());
    }

    #[test]
    fn settings_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        assert!(load_settings_from(&path).is_none());

        let settings = AppSettings {
            data_root: "~/Documents/JewelryDesk".into(),
            api_base_url: "http://localhost:3000/api".into(),
            api_token: None,
            typst_bin: None,
        };
        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path), Some(settings));
    }

    #[test]
    fn seller_file_is_created_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let seller = ws.load_seller().unwrap();
        assert!(dir.path().join("seller.toml").exists());
        assert_eq!(seller, ws.load_seller().unwrap());
    }

    #[test]
    fn output_dir_uses_customer_slug() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let out = ws.output_dir(2026, "Nguyễn Thị Hoa").unwrap();
        assert!(out.ends_with("output/2026/nguyen-thi-hoa"));
        assert!(ws.output_dir(2026, "").unwrap().ends_with("khach-le"));
    }
}

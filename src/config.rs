// sigscictl - CLI for the Signal Sciences dashboard API
// Copyright (C) 2025 sigscictl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::client::DEFAULT_BASE_URL;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub email: Option<String>,
    pub password: Option<String>,
    pub corp: Option<String>,
    pub site: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error(
        "email and password are required; set them with `sigscictl configure` \
         or the SIGSCI_EMAIL/SIGSCI_PASSWORD environment variables"
    )]
    MissingCredentials,
    #[error("corp and site are required; set them with `sigscictl configure` or --corp/--site")]
    MissingCorpSite,
}

/// Fully resolved settings for one invocation. Built once in `main` and
/// passed around immutably.
#[derive(Debug)]
pub struct EffectiveConfig {
    pub email: String,
    pub password: String,
    pub corp: String,
    pub site: String,
    pub base_url: String,
}

/// Command-line settings that take precedence over files and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub corp: Option<String>,
    pub site: Option<String>,
    pub base_url: Option<String>,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".sigscictl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("SIGSCICTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("sigscictl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

/// Build the effective configuration. Precedence, lowest to highest: user
/// file, local file, SIGSCI_* environment variables, command-line flags.
pub fn resolve(cwd: &Path, overrides: &Overrides) -> Result<EffectiveConfig> {
    let mut merged = load(cwd)?;

    apply_env(&mut merged);

    if let Some(corp) = &overrides.corp {
        merged.corp = Some(corp.clone());
    }
    if let Some(site) = &overrides.site {
        merged.site = Some(site.clone());
    }
    if let Some(base_url) = &overrides.base_url {
        merged.base_url = Some(base_url.clone());
    }

    let email = merged
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or(ConfigError::MissingCredentials)?;
    let password = merged
        .password
        .filter(|p| !p.is_empty())
        .ok_or(ConfigError::MissingCredentials)?;
    let corp = merged.corp.ok_or(ConfigError::MissingCorpSite)?;
    let site = merged.site.ok_or(ConfigError::MissingCorpSite)?;
    let base_url = merged
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    Ok(EffectiveConfig {
        email,
        password,
        corp,
        site,
        base_url,
    })
}

fn apply_env(config: &mut Config) {
    if let Ok(email) = env::var("SIGSCI_EMAIL") {
        config.email = Some(email);
    }
    if let Ok(password) = env::var("SIGSCI_PASSWORD") {
        config.password = Some(password);
    }
    if let Ok(corp) = env::var("SIGSCI_CORP") {
        config.corp = Some(corp);
    }
    if let Ok(site) = env::var("SIGSCI_SITE") {
        config.site = Some(site);
    }
    if let Ok(base_url) = env::var("SIGSCI_BASE_URL") {
        config.base_url = Some(base_url);
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    Config {
        email: local.email.or(user.email),
        password: local.password.or(user.password),
        corp: local.corp.or(user.corp),
        site: local.site.or(user.site),
        base_url: local.base_url.or(user.base_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::{env, fs};
    use tempfile::tempdir;

    static ENV_LOCK: OnceLock<std::sync::Mutex<()>> = OnceLock::new();

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| std::sync::Mutex::new(()))
            .lock()
            .unwrap()
    }

    fn clear_sigsci_env() {
        for key in [
            "SIGSCI_EMAIL",
            "SIGSCI_PASSWORD",
            "SIGSCI_CORP",
            "SIGSCI_SITE",
            "SIGSCI_BASE_URL",
        ] {
            env::remove_var(key);
        }
    }

    fn isolate(cwd: &Path) {
        env::set_var("SIGSCICTL_CONFIG_DIR", cwd.join("config"));
        env::set_var("XDG_CONFIG_HOME", cwd.join("xdg"));
        fs::create_dir_all(cwd.join("config")).unwrap();
        fs::create_dir_all(cwd.join("xdg")).unwrap();
        clear_sigsci_env();
    }

    #[test]
    fn local_file_wins_over_user_file() {
        let _guard = lock_env();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let user_cfg = Config {
            email: Some("user@example.test".into()),
            password: Some("user-pass".into()),
            corp: Some("user-corp".into()),
            site: Some("user-site".into()),
            base_url: None,
        };
        save(Scope::User, &user_cfg, cwd.path()).unwrap();

        let local_cfg = Config {
            email: None,
            password: None,
            corp: Some("local-corp".into()),
            site: None,
            base_url: Some("https://staging.test".into()),
        };
        save(Scope::Local, &local_cfg, cwd.path()).unwrap();

        let effective = resolve(cwd.path(), &Overrides::default()).unwrap();
        assert_eq!(effective.email, "user@example.test");
        assert_eq!(effective.corp, "local-corp");
        assert_eq!(effective.site, "user-site");
        assert_eq!(effective.base_url, "https://staging.test");
    }

    #[test]
    fn environment_wins_over_files_and_flags_win_over_environment() {
        let _guard = lock_env();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let user_cfg = Config {
            email: Some("file@example.test".into()),
            password: Some("file-pass".into()),
            corp: Some("file-corp".into()),
            site: Some("file-site".into()),
            base_url: None,
        };
        save(Scope::User, &user_cfg, cwd.path()).unwrap();

        env::set_var("SIGSCI_EMAIL", "env@example.test");
        env::set_var("SIGSCI_CORP", "env-corp");

        let overrides = Overrides {
            corp: Some("flag-corp".into()),
            ..Overrides::default()
        };
        let effective = resolve(cwd.path(), &overrides).unwrap();
        assert_eq!(effective.email, "env@example.test");
        assert_eq!(effective.password, "file-pass");
        assert_eq!(effective.corp, "flag-corp");

        clear_sigsci_env();
    }

    #[test]
    fn default_base_url_is_the_dashboard() {
        let _guard = lock_env();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        env::set_var("SIGSCI_EMAIL", "env@example.test");
        env::set_var("SIGSCI_PASSWORD", "secret");
        env::set_var("SIGSCI_CORP", "c");
        env::set_var("SIGSCI_SITE", "s");

        let effective = resolve(cwd.path(), &Overrides::default()).unwrap();
        assert_eq!(effective.base_url, DEFAULT_BASE_URL);

        clear_sigsci_env();
    }

    #[test]
    fn errors_when_credentials_are_missing() {
        let _guard = lock_env();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let err = resolve(cwd.path(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("email and password are required"));
    }

    #[test]
    fn errors_when_corp_or_site_is_missing() {
        let _guard = lock_env();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        env::set_var("SIGSCI_EMAIL", "env@example.test");
        env::set_var("SIGSCI_PASSWORD", "secret");

        let err = resolve(cwd.path(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("corp and site are required"));

        clear_sigsci_env();
    }
}

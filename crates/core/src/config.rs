use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::PathBuf,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::{
    assets::{get_config_dir, get_default_config, get_default_system_prompt},
    model::ModelConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File system error: {0}")]
    IO(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    YAMLError(#[from] serde_yaml::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Sampling settings passed through to the provider.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProfileConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: 1024,
        }
    }
}

impl ProfileConfig {
    /// Flatten into the string map the completion models consume.
    pub fn as_settings(&self) -> HashMap<String, String> {
        HashMap::from([
            ("temperature".to_string(), self.temperature.to_string()),
            ("top_p".to_string(), self.top_p.to_string()),
            ("max_tokens".to_string(), self.max_tokens.to_string()),
        ])
    }
}

/// Pacing of rendered output.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TypewriterConfig {
    pub enabled: bool,
    pub chars_per_sec: u32,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chars_per_sec: 80,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModeConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

#[derive(Debug)]
pub struct Config {
    pub models: HashMap<String, ModelConfig>,
    pub profiles: HashMap<String, ProfileConfig>,
    pub chat: ModeConfig,
    pub task: ModeConfig,
    /// Model keys tried, in order, when the active model fails.
    pub fallback: Vec<String>,
    pub system_prompt: String,
    pub typewriter: TypewriterConfig,
    pub theme: String,
}

fn default_theme() -> String {
    "light".to_string()
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StringOrObject<T> {
    String(String),
    Object(T),
}

#[derive(Deserialize, Debug)]
struct RawConfig {
    models: HashMap<String, ModelConfig>,
    #[serde(default)]
    profiles: HashMap<String, ProfileConfig>,
    chat: RawModeConfig,
    task: RawModeConfig,
    #[serde(default)]
    fallback: Option<Vec<String>>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    typewriter: Option<TypewriterConfig>,
    theme: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawModeConfig {
    model: StringOrObject<ModelConfig>,
    #[serde(default)]
    profile: Option<StringOrObject<ProfileConfig>>,
}

impl RawConfig {
    #[instrument(skip(self))]
    fn to_config(&self) -> Result<Config, ConfigError> {
        let mut models_with_names = HashMap::new();
        for (k, v) in &self.models {
            // Update model name if not set
            let model_name = if v.name.is_empty() {
                k.clone()
            } else {
                v.name.clone()
            };
            let model = ModelConfig {
                name: model_name,
                ..v.clone()
            };
            models_with_names.insert(k.clone(), model);
        }

        let resolve_model =
            |model_entry: &StringOrObject<ModelConfig>| -> Result<ModelConfig, ConfigError> {
                match model_entry {
                    StringOrObject::String(s) => models_with_names
                        .get(s)
                        .cloned()
                        .ok_or_else(|| ConfigError::Config(format!("Model '{s}' not found"))),
                    StringOrObject::Object(m) => Ok(m.clone()),
                }
            };

        let resolve_profile = |profile_entry: &Option<StringOrObject<ProfileConfig>>| -> Result<ProfileConfig, ConfigError> {
            match profile_entry {
                Some(StringOrObject::String(s)) => self.profiles
                    .get(s)
                    .cloned()
                    .ok_or_else(|| ConfigError::Config(format!("Profile '{s}' not found"))),
                Some(StringOrObject::Object(p)) => Ok(p.clone()),
                None => Ok(ProfileConfig::default()),
            }
        };

        let chat_model = resolve_model(&self.chat.model)?;
        let chat_profile = resolve_profile(&self.chat.profile)?;
        let task_model = resolve_model(&self.task.model)?;
        let task_profile = resolve_profile(&self.task.profile)?;

        let fallback = self.fallback.clone().unwrap_or_default();
        for key in &fallback {
            if !models_with_names.contains_key(key) {
                return Err(ConfigError::Config(format!(
                    "Fallback model '{key}' not found"
                )));
            }
        }

        Ok(Config {
            models: models_with_names,
            profiles: self.profiles.clone(),
            chat: ModeConfig {
                model: chat_model,
                profile: chat_profile,
            },
            task: ModeConfig {
                model: task_model,
                profile: task_profile,
            },
            fallback,
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or_else(get_default_system_prompt),
            typewriter: self.typewriter.clone().unwrap_or_default(),
            theme: self.theme.clone().unwrap_or_else(default_theme),
        })
    }
}

#[instrument(skip(config_path))]
pub fn create_or_get_config_file(
    config_path: Option<PathBuf>,
) -> Result<(bool, PathBuf), ConfigError> {
    let actual_path = config_path.unwrap_or_else(|| {
        let config_dir = get_config_dir();
        config_dir.join("ganaterm.yml")
    });

    let parent_dir = actual_path.parent().ok_or_else(|| {
        ConfigError::IO(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Config path has no parent directory",
        ))
    })?;

    if !parent_dir.exists() {
        fs::create_dir_all(parent_dir)?;
    }

    if actual_path.exists() {
        Ok((true, actual_path))
    } else {
        File::create(&actual_path)?.write_all(get_default_config().as_bytes())?;
        Ok((false, actual_path))
    }
}

#[instrument(skip(config_path))]
pub fn get_config(config_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let (_, config_file) = create_or_get_config_file(config_path)?;
    let content = fs::read_to_string(&config_file)?;
    let raw: RawConfig = serde_yaml::from_str(&content)?;
    raw.to_config()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        fs::{self, File},
        io::Write,
        path::PathBuf,
    };

    use tempfile::{NamedTempFile, env::temp_dir, tempdir};

    use super::*;
    use crate::model::ModelProvider;

    fn create_temp_config(content: &str) -> PathBuf {
        let temp_dir = temp_dir();
        let config_path = NamedTempFile::new().unwrap().path().to_owned();
        fs::create_dir_all(&temp_dir).unwrap();
        File::create(&config_path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        config_path
    }

    fn dummy_model_config(name: &str) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            provider: ModelProvider::Openai,
            settings: HashMap::from([(
                "api_key".to_string(),
                serde_yaml::Value::String("sk-dummy".into()),
            )]),
        }
    }

    // Dummy config content for tests
    const DUMMY_CONFIG_CONTENT: &str = r#"
models:
  gpt-4o:
    name: gpt-4o
    type: openai
    api_key: sk-dummy
  deepseek-chat:
    name: deepseek-chat
    type: deepseek
    api_key: sk-dummy
profiles:
  default:
    temperature: 0.7
    top_p: 1.0
    max_tokens: 1024
  concise:
    temperature: 0.4
    top_p: 0.5
    max_tokens: 512
chat:
  model: gpt-4o
  profile: default
task:
  model: deepseek-chat
  profile: concise
fallback:
  - gpt-4o
  - deepseek-chat
typewriter:
  enabled: true
  chars_per_sec: 120
theme: dark
"#;

    #[test]
    fn test_profile_config_default() {
        let default_profile = ProfileConfig::default();
        assert_eq!(default_profile.temperature, 0.7);
        assert_eq!(default_profile.top_p, 1.0);
        assert_eq!(default_profile.max_tokens, 1024);
    }

    #[test]
    fn test_profile_as_settings() {
        let settings = ProfileConfig::default().as_settings();
        assert_eq!(settings.get("temperature").unwrap(), "0.7");
        assert_eq!(settings.get("max_tokens").unwrap(), "1024");
    }

    #[test]
    fn test_raw_config_to_config_valid() {
        let mut models = HashMap::new();
        models.insert("gpt-4o".to_string(), dummy_model_config("gpt-4o"));
        models.insert(
            "deepseek-chat".to_string(),
            dummy_model_config("deepseek-chat"),
        );

        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), ProfileConfig::default());
        profiles.insert(
            "concise".to_string(),
            ProfileConfig {
                temperature: 0.4,
                ..Default::default()
            },
        );

        let raw_config = RawConfig {
            models: models.clone(),
            profiles: profiles.clone(),
            chat: RawModeConfig {
                model: StringOrObject::String("gpt-4o".to_string()),
                profile: Some(StringOrObject::String("default".to_string())),
            },
            task: RawModeConfig {
                model: StringOrObject::String("deepseek-chat".to_string()),
                profile: Some(StringOrObject::String("concise".to_string())),
            },
            fallback: Some(vec!["deepseek-chat".to_string()]),
            system_prompt: None,
            typewriter: None,
            theme: Some("dark".to_string()),
        };

        let config = raw_config.to_config().unwrap();

        assert_eq!(config.models.len(), 2);
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.chat.model.name, "gpt-4o");
        assert_eq!(config.chat.profile.temperature, 0.7);
        assert_eq!(config.task.model.name, "deepseek-chat");
        assert_eq!(config.task.profile.temperature, 0.4);
        assert_eq!(config.fallback, vec!["deepseek-chat".to_string()]);
        assert_eq!(config.theme, "dark");
        assert!(!config.typewriter.enabled);
        assert!(config.system_prompt.contains("```command"));
    }

    #[test]
    fn test_raw_config_to_config_missing_model_reference() {
        let mut models = HashMap::new();
        models.insert("gpt-4o".to_string(), dummy_model_config("gpt-4o"));

        let raw_config = RawConfig {
            models,
            profiles: HashMap::new(),
            chat: RawModeConfig {
                model: StringOrObject::String("non-existent-model".to_string()),
                profile: None,
            },
            task: RawModeConfig {
                model: StringOrObject::String("gpt-4o".to_string()),
                profile: None,
            },
            fallback: None,
            system_prompt: None,
            typewriter: None,
            theme: None,
        };

        let err = raw_config.to_config().unwrap_err();
        assert!(
            matches!(err, ConfigError::Config(msg) if msg.contains("Model 'non-existent-model' not found"))
        );
    }

    #[test]
    fn test_raw_config_to_config_unknown_fallback() {
        let mut models = HashMap::new();
        models.insert("gpt-4o".to_string(), dummy_model_config("gpt-4o"));

        let raw_config = RawConfig {
            models,
            profiles: HashMap::new(),
            chat: RawModeConfig {
                model: StringOrObject::String("gpt-4o".to_string()),
                profile: None,
            },
            task: RawModeConfig {
                model: StringOrObject::String("gpt-4o".to_string()),
                profile: None,
            },
            fallback: Some(vec!["missing".to_string()]),
            system_prompt: None,
            typewriter: None,
            theme: None,
        };

        let err = raw_config.to_config().unwrap_err();
        assert!(
            matches!(err, ConfigError::Config(msg) if msg.contains("Fallback model 'missing' not found"))
        );
    }

    #[test]
    fn test_raw_config_to_config_inline_model_and_profile() {
        let raw_config = RawConfig {
            models: HashMap::new(),   // No named models
            profiles: HashMap::new(), // No named profiles
            chat: RawModeConfig {
                model: StringOrObject::Object(dummy_model_config("inline-chat-model")),
                profile: Some(StringOrObject::Object(ProfileConfig {
                    temperature: 0.8,
                    ..Default::default()
                })),
            },
            task: RawModeConfig {
                model: StringOrObject::Object(dummy_model_config("inline-task-model")),
                profile: None, // Should use default profile
            },
            fallback: None,
            system_prompt: Some("You are terse.".to_string()),
            typewriter: None,
            theme: Some("light".to_string()),
        };

        let config = raw_config.to_config().unwrap();

        assert_eq!(config.chat.model.name, "inline-chat-model");
        assert_eq!(config.chat.profile.temperature, 0.8);
        assert_eq!(config.task.model.name, "inline-task-model");
        assert_eq!(config.task.profile.temperature, 0.7); // Default temperature
        assert_eq!(config.system_prompt, "You are terse.");
        assert_eq!(config.theme, "light");
    }

    #[test]
    fn test_create_or_get_config_file_when_exists() {
        let config_path = create_temp_config(DUMMY_CONFIG_CONTENT);

        let (exists, file_path) = create_or_get_config_file(Some(config_path.clone())).unwrap();

        assert!(exists);
        assert_eq!(file_path, config_path);
        assert!(file_path.exists());
    }

    #[test]
    fn test_create_or_get_config_file_when_not_exist() {
        let config_dir = tempdir().unwrap();
        let config_file = config_dir.path().join("ganaterm.yml");

        let (exists, file_path) = create_or_get_config_file(Some(config_file.clone())).unwrap();

        assert!(!exists);
        assert_eq!(file_path, config_file);
        assert!(file_path.exists());
    }

    #[test]
    fn test_get_config_return_config_for_valid_schema() {
        let config_file = create_temp_config(DUMMY_CONFIG_CONTENT);
        let config = get_config(Some(config_file)).unwrap();

        assert_eq!(config.models.len(), 2);
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.chat.model.name, "gpt-4o");
        assert_eq!(config.chat.profile.temperature, 0.7);
        assert_eq!(config.task.model.name, "deepseek-chat");
        assert_eq!(config.task.profile.temperature, 0.4);
        assert_eq!(config.fallback.len(), 2);
        assert!(config.typewriter.enabled);
        assert_eq!(config.typewriter.chars_per_sec, 120);
        assert_eq!(config.theme, "dark");

        let deepseek = config.models.get("deepseek-chat").unwrap();
        assert_eq!(deepseek.provider, ModelProvider::Deepseek);
    }

    #[test]
    fn test_get_config_throws_for_invalid_yaml() {
        let config_file = create_temp_config("invalid yaml content: - [");
        let err = get_config(Some(config_file)).unwrap_err();
        assert!(matches!(err, ConfigError::YAMLError(_)));
        assert!(format!("{err}").contains("YAML parsing error"));
    }

    #[test]
    fn test_get_config_throws_for_missing_referenced_model() {
        let invalid_config_content = r#"
models: {} # Empty models map
profiles: {} # Empty profiles map
chat:
  model: non-existent-model # References a model not in the map
task:
  model: non-existent-model
"#;
        let config_file = create_temp_config(invalid_config_content);
        let err = get_config(Some(config_file)).unwrap_err();
        assert!(
            matches!(err, ConfigError::Config(msg) if msg.contains("Model 'non-existent-model' not found"))
        );
    }

    #[test]
    fn test_get_config_throws_for_missing_referenced_profile() {
        let invalid_config_content = r#"
models:
  gpt-4o:
    name: gpt-4o
    type: openai
profiles: {} # Empty profiles map
chat:
  model: gpt-4o
  profile: non-existent-profile # References a profile not in the map
task:
  model: gpt-4o
"#;
        let config_file = create_temp_config(invalid_config_content);
        let err = get_config(Some(config_file)).unwrap_err();
        assert!(
            matches!(err, ConfigError::Config(msg) if msg.contains("Profile 'non-existent-profile' not found"))
        );
    }

    #[test]
    fn test_default_config_parses() {
        let raw: RawConfig = serde_yaml::from_str(&get_default_config()).unwrap();
        let config = raw.to_config().unwrap();
        assert!(config.models.len() >= 3);
        assert!(!config.fallback.is_empty());
    }
}

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::exception::Exception;
use crate::logger::SharedSink;
use crate::param::{CONFIG_FILE_NAME, DEFAULT_BLOCKING_THREADS};

/// 可识别的配置项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Port,
    DisableConsoleLogging,
    UseHttps,
    BaseUrl,
    MaxWorkerThreads,
    MaxCompletionPortThreads,
}

/// 配置项的默认值。`Computed` 在生成默认配置时才求值。
#[derive(Debug, Clone, Copy)]
pub enum ConfigDefault {
    Integer(i64),
    Boolean(bool),
    Text(&'static str),
    Null,
    Computed(fn() -> i64),
}

impl ConfigDefault {
    pub fn to_value(&self) -> Value {
        match *self {
            ConfigDefault::Integer(v) => Value::from(v),
            ConfigDefault::Boolean(v) => Value::from(v),
            ConfigDefault::Text(v) => Value::from(v),
            ConfigDefault::Null => Value::Null,
            ConfigDefault::Computed(f) => Value::from(f()),
        }
    }

    /// 文件中的值与默认值的 JSON 类型是否一致
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ConfigDefault::Integer(_) | ConfigDefault::Computed(_) => {
                value.is_i64() || value.is_u64()
            }
            ConfigDefault::Boolean(_) => value.is_boolean(),
            ConfigDefault::Text(_) => value.is_string() || value.is_null(),
            ConfigDefault::Null => true,
        }
    }
}

/// 配置项描述：标识、文件中的名称、默认值
#[derive(Debug, Clone, Copy)]
pub struct ConfigKeyDescriptor {
    pub key: ConfigKey,
    pub name: &'static str,
    pub default: ConfigDefault,
}

fn available_worker_threads() -> i64 {
    i64::try_from(num_cpus::get()).unwrap_or(1)
}

fn available_completion_port_threads() -> i64 {
    i64::try_from(DEFAULT_BLOCKING_THREADS).unwrap_or(1)
}

/// 配置项静态表。名称一旦发布就不能再改，否则旧配置文件中的值会被当成未知项丢弃。
pub static CONFIG_KEYS: [ConfigKeyDescriptor; 6] = [
    ConfigKeyDescriptor {
        key: ConfigKey::Port,
        name: "port",
        default: ConfigDefault::Integer(8080),
    },
    ConfigKeyDescriptor {
        key: ConfigKey::DisableConsoleLogging,
        name: "disable_unneeded_io_calls_like_console_logs",
        default: ConfigDefault::Boolean(false),
    },
    ConfigKeyDescriptor {
        key: ConfigKey::UseHttps,
        name: "use_https",
        default: ConfigDefault::Boolean(false),
    },
    ConfigKeyDescriptor {
        key: ConfigKey::BaseUrl,
        name: "base_url",
        default: ConfigDefault::Text("localhost"),
    },
    ConfigKeyDescriptor {
        key: ConfigKey::MaxWorkerThreads,
        name: "max_worker_threads",
        default: ConfigDefault::Computed(available_worker_threads),
    },
    ConfigKeyDescriptor {
        key: ConfigKey::MaxCompletionPortThreads,
        name: "max_completion_port_threads",
        default: ConfigDefault::Computed(available_completion_port_threads),
    },
];

lazy_static! {
    static ref VALID_KEY_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap();
}

/// 配置文件中的名称是否是合法的 JSON 键名
pub fn is_valid_key_name(name: &str) -> bool {
    VALID_KEY_NAME.is_match(name)
}

impl ConfigKey {
    pub fn descriptor(&self) -> &'static ConfigKeyDescriptor {
        match self {
            ConfigKey::Port => &CONFIG_KEYS[0],
            ConfigKey::DisableConsoleLogging => &CONFIG_KEYS[1],
            ConfigKey::UseHttps => &CONFIG_KEYS[2],
            ConfigKey::BaseUrl => &CONFIG_KEYS[3],
            ConfigKey::MaxWorkerThreads => &CONFIG_KEYS[4],
            ConfigKey::MaxCompletionPortThreads => &CONFIG_KEYS[5],
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CONFIG_KEYS.iter().find(|d| d.name == name).map(|d| d.key)
    }
}

/// 基于 JSON 文件的类型化配置存储
pub struct ConfigStore {
    values: RwLock<HashMap<ConfigKey, Value>>,
    path: PathBuf,
    sink: SharedSink,
}

impl ConfigStore {
    /// 打开 `dir` 下的配置文件。目录或文件不存在时写入默认配置。
    pub fn open(dir: impl AsRef<Path>, sink: SharedSink) -> Result<Self, Exception> {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILE_NAME);

        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| Exception::ConfigDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
            let store = Self::create_defaults(path, sink);
            store.save();
            return Ok(store);
        }

        if !path.exists() {
            let store = Self::create_defaults(path, sink);
            store.save();
            return Ok(store);
        }

        Self::load(path, sink)
    }

    /// 从 `path` 读取配置。文件内容不是合法 JSON 对象时退回默认配置。
    pub fn load(path: impl Into<PathBuf>, sink: SharedSink) -> Result<Self, Exception> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                sink.error(&format!("配置文件 {} 不是合法的 UTF-8，使用默认配置", path.display()));
                return Ok(Self::create_defaults(path, sink));
            }
            Err(source) => {
                sink.error(&format!("无法载入配置文件 {}: {}", path.display(), source));
                return Err(Exception::ConfigRead { path, source });
            }
        };

        let json = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                sink.error("配置文件的顶层不是 JSON 对象，使用默认配置");
                return Ok(Self::create_defaults(path, sink));
            }
            Err(e) => {
                sink.error(&format!("配置文件存在，但 JSON 格式不正确（{}），使用默认配置", e));
                return Ok(Self::create_defaults(path, sink));
            }
        };

        let mut values = HashMap::with_capacity(CONFIG_KEYS.len());
        for (name, value) in json {
            let Some(key) = ConfigKey::from_name(&name) else {
                if is_valid_key_name(&name) {
                    sink.warn(&format!("无法识别的配置项：{}", name));
                } else {
                    sink.warn(&format!("配置项名称不合法，已忽略：{:?}", name));
                }
                continue;
            };
            let descriptor = key.descriptor();
            if !descriptor.default.accepts(&value) {
                sink.warn(&format!("配置项 {} 的值 {} 类型不正确，使用默认值", name, value));
                continue;
            }
            values.insert(key, value);
        }

        for descriptor in CONFIG_KEYS.iter() {
            values
                .entry(descriptor.key)
                .or_insert_with(|| descriptor.default.to_value());
        }

        Ok(Self {
            values: RwLock::new(values),
            path,
            sink,
        })
    }

    /// 为每个配置项装入默认值
    pub fn create_defaults(path: impl Into<PathBuf>, sink: SharedSink) -> Self {
        debug_assert!(CONFIG_KEYS.iter().all(|d| is_valid_key_name(d.name)));
        let values = CONFIG_KEYS
            .iter()
            .map(|d| (d.key, d.default.to_value()))
            .collect();
        Self {
            values: RwLock::new(values),
            path: path.into(),
            sink,
        }
    }

    /// 以调用者指定的类型读取配置值
    pub fn get<T: DeserializeOwned>(&self, key: ConfigKey) -> Result<T, Exception> {
        serde_json::from_value(self.value(key)).map_err(|e| Exception::ConfigValueType {
            key: key.name(),
            reason: e.to_string(),
        })
    }

    /// 配置值的原始 JSON 形式
    pub fn value(&self, key: ConfigKey) -> Value {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(&key).cloned().unwrap_or(Value::Null)
    }

    pub fn set<T: Serialize>(&self, key: ConfigKey, value: T) -> Result<(), Exception> {
        let value = serde_json::to_value(value)?;
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key, value);
        Ok(())
    }

    /// 以缩进格式写回配置文件。失败只记录日志，不影响内存中的配置。
    pub fn save(&self) {
        let json: Map<String, Value> = {
            let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
            CONFIG_KEYS
                .iter()
                .map(|d| {
                    let value = values.get(&d.key).cloned().unwrap_or(Value::Null);
                    (d.name.to_string(), value)
                })
                .collect()
        };

        let content = match serde_json::to_string_pretty(&json) {
            Ok(c) => c,
            Err(e) => {
                self.sink.warn(&format!("无法序列化配置：{}", e));
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, content) {
            self.sink
                .warn(&format!("无法保存配置到 {}：{}", self.path.display(), e));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

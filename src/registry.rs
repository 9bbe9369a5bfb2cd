use std::collections::{BTreeMap, HashMap};

use crate::{handler::HttpHandler, hello::HelloHandler, static_handler::StaticHandler, ConfigError};

pub type HandlerFactory = fn(&HandlerOptions) -> Result<Box<dyn HttpHandler>, ConfigError>;

/// String options a handler instance is configured with.
#[derive(Clone, Debug, Default)]
pub struct HandlerOptions {
    options: BTreeMap<String, String>,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_string(), value.to_string());
    }

    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.options.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.options.get(key) {
            None => Ok(default),
            Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidOption {
                key: key.to_string(),
                value: value.clone(),
            }),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.options.get(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidOption {
                key: key.to_string(),
                value: value.clone(),
            }),
        }
    }
}

impl FromIterator<(String, String)> for HandlerOptions {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            options: iter.into_iter().collect(),
        }
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Handler modules by module name.
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtin_modules()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtin_modules() -> Self {
        let mut registry = Self::new();
        registry.register("hello", HelloHandler::from_options);
        registry.register("static", StaticHandler::from_options);
        registry
    }

    pub fn register(&mut self, module: &str, factory: HandlerFactory) {
        if self.factories.insert(module.to_string(), factory).is_some() {
            log::warn!("handler module {module} registered twice, keeping the latest");
        }
    }

    pub fn create(
        &self,
        module: &str,
        options: &HandlerOptions,
    ) -> Result<Box<dyn HttpHandler>, ConfigError> {
        let factory = self
            .factories
            .get(module)
            .ok_or_else(|| ConfigError::UnknownModule(module.to_string()))?;
        factory(options)
    }

    pub fn modules(&self) -> Vec<&str> {
        let mut modules = self.factories.keys().map(String::as_str).collect::<Vec<_>>();
        modules.sort_unstable();
        modules
    }
}

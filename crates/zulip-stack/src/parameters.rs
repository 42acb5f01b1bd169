//! deploy-time parameters ([Parameter]) and the values supplied for them ([ParameterValues])
//!
//! A [Parameter] is declared by the construct that consumes it. Its effective value is resolved
//! once, while the stack is built:
//! - the supplied value when there is one, used verbatim
//! - otherwise the default
//! - otherwise the parameter is missing
//!
//! The effective value must satisfy the declared constraints before anything is emitted.
use crate::value::Value;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// IPv4 CIDR block, e.g. `10.0.0.0/16`
pub const CIDR_PATTERN: &str = r"^((\d{1,3})\.){3}\d{1,3}/\d{1,2}$";

/// Allowed values of feature toggles
pub const TOGGLE_VALUES: [&str; 2] = ["true", "false"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Number,
}

impl ParameterType {
    fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "String",
            ParameterType::Number => "Number",
        }
    }
}

/// A named input of the template
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub kind: ParameterType,
    pub description: String,
    pub default: Option<String>,
    pub allowed_pattern: Option<String>,
    pub allowed_values: Vec<String>,
    pub no_echo: bool,
}

impl Parameter {
    pub fn string(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, ParameterType::String, description)
    }

    pub fn number(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, ParameterType::Number, description)
    }

    fn new(id: impl Into<String>, kind: ParameterType, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            default: None,
            allowed_pattern: None,
            allowed_values: vec![],
            no_echo: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_allowed_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_pattern = Some(pattern.into());
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// A `"true"`/`"false"` switch
    pub fn toggle(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::string(id, description)
            .with_default("false")
            .with_allowed_values(TOGGLE_VALUES)
    }

    /// Hide the value in the provisioning console
    pub fn with_no_echo(mut self) -> Self {
        self.no_echo = true;
        self
    }

    /// Only offer `value`, also as the default
    ///
    /// For parameters whose value decided which nodes were built.
    pub fn pin(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.default = Some(value.clone());
        self.allowed_values = vec![value];
    }

    /// Effective value of this parameter given an optional supplied value
    pub fn resolve(&self, supplied: Option<&str>) -> Result<String, ParameterError> {
        let value = supplied
            .or(self.default.as_deref())
            .ok_or_else(|| ParameterError::Missing(self.id.clone()))?;

        if self.kind == ParameterType::Number && value.parse::<f64>().is_err() {
            return Err(ParameterError::NotANumber {
                id: self.id.clone(),
                value: value.to_string(),
            });
        }

        if let Some(pattern) = &self.allowed_pattern {
            let re = regex::Regex::new(pattern).map_err(|source| ParameterError::InvalidPattern {
                id: self.id.clone(),
                source,
            })?;

            if !re.is_match(value) {
                return Err(ParameterError::PatternMismatch {
                    id: self.id.clone(),
                    value: value.to_string(),
                    pattern: pattern.clone(),
                });
            }
        }

        if !self.allowed_values.is_empty() && !self.allowed_values.iter().any(|v| v == value) {
            return Err(ParameterError::NotAllowed {
                id: self.id.clone(),
                value: value.to_string(),
                allowed: self.allowed_values.clone(),
            });
        }

        tracing::trace!(id = %self.id, supplied = supplied.is_some(), "parameter resolved");
        Ok(value.to_string())
    }
}

impl serde::ser::Serialize for Parameter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut ser = serializer.serialize_map(None)?;
        ser.serialize_entry("Type", self.kind.as_str())?;
        if let Some(default) = &self.default {
            ser.serialize_entry("Default", default)?;
        }
        ser.serialize_entry("Description", &self.description)?;
        if let Some(pattern) = &self.allowed_pattern {
            ser.serialize_entry("AllowedPattern", pattern)?;
        }
        if !self.allowed_values.is_empty() {
            ser.serialize_entry("AllowedValues", &self.allowed_values)?;
        }
        if self.no_echo {
            ser.serialize_entry("NoEcho", "true")?;
        }
        ser.end()
    }
}

/// A resolved parameter, handed out to the construct that declared it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRef {
    id: String,
    value: String,
}

impl ParameterRef {
    pub(crate) fn new(id: String, value: String) -> Self {
        Self { id, value }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The effective value at build time
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.value == "true"
    }

    /// `{"Ref": id}`
    pub fn reference(&self) -> Value {
        Value::reference(&self.id)
    }
}

/// Values supplied by the user, in the order they were given
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParameterValues {
    values: IndexMap<String, String>,
}

impl ParameterValues {
    /// Insert a value, later values replace earlier ones
    pub fn insert(&mut self, id: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(id.into(), value.into())
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse and insert a `KEY=VALUE` assignment
    ///
    /// The value may be empty (`AdminEmail=`) and may itself contain `=`.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<(), ParameterError> {
        let Some((id, value)) = assignment.split_once('=') else {
            return Err(ParameterError::InvalidAssignment(assignment.to_string()));
        };

        let id = id.trim();
        if id.is_empty() {
            return Err(ParameterError::InvalidAssignment(assignment.to_string()));
        }

        self.insert(id, value);
        Ok(())
    }
}

impl ParameterValues {
    /// Load values from a `.json`, `.yaml`/`.yml` or `.hcl` file
    ///
    /// The file must hold a single flat object/body. Numbers and booleans are accepted and
    /// turned into their string form.
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), ParameterError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading parameter file");

        let contents = std::fs::read_to_string(&file_path)?;
        let extension = file_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        let loaded: Vec<(String, Option<String>)> = match extension.as_deref() {
            Some("json") => serde_json::from_str::<IndexMap<String, serde_json::Value>>(&contents)?
                .into_iter()
                .map(|(id, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Bool(b) => Some(b.to_string()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    };
                    (id, value)
                })
                .collect(),
            Some("yaml" | "yml") => {
                serde_yaml::from_str::<IndexMap<String, serde_yaml::Value>>(&contents)?
                    .into_iter()
                    .map(|(id, value)| {
                        let value = match value {
                            serde_yaml::Value::String(s) => Some(s),
                            serde_yaml::Value::Bool(b) => Some(b.to_string()),
                            serde_yaml::Value::Number(n) => Some(n.to_string()),
                            _ => None,
                        };
                        (id, value)
                    })
                    .collect()
            }
            Some("hcl") => hcl::from_str::<IndexMap<String, hcl::Value>>(&contents)?
                .into_iter()
                .map(|(id, value)| {
                    let value = match value {
                        hcl::Value::String(s) => Some(s),
                        hcl::Value::Bool(b) => Some(b.to_string()),
                        hcl::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    };
                    (id, value)
                })
                .collect(),
            _ => return Err(ParameterError::UnsupportedFile(file_path)),
        };

        for (id, value) in loaded {
            let Some(value) = value else {
                return Err(ParameterError::NotAScalar {
                    id,
                    path: file_path,
                });
            };
            self.insert(id, value);
        }

        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterValues {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut values = ParameterValues::default();
        for (id, value) in iter {
            values.insert(id, value);
        }
        values
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParameterError {
    #[error("Parameter {0} has no default and no value was supplied")]
    Missing(String),
    #[error("Parameter {id}: {value:?} does not match pattern {pattern}")]
    PatternMismatch {
        id: String,
        value: String,
        pattern: String,
    },
    #[error("Parameter {id}: {value:?} is not one of {allowed:?}")]
    NotAllowed {
        id: String,
        value: String,
        allowed: Vec<String>,
    },
    #[error("Parameter {id}: {value:?} is not a number")]
    NotANumber { id: String, value: String },
    #[error("Parameter {id} declares an invalid pattern")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
    #[error("Parameter {id} requires {required} to be set")]
    Requires { id: String, required: String },
    #[error("Value supplied for unknown parameter {0}")]
    Unknown(String),
    #[error("Expected KEY=VALUE, got {0:?}")]
    InvalidAssignment(String),
    #[error("Parameter {id} in {} must be a string, number or boolean", .path.display())]
    NotAScalar { id: String, path: PathBuf },
    #[error("Unsupported parameter file {} (expected .json, .yaml, .yml or .hcl)", .0.display())]
    UnsupportedFile(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse json parameter file")]
    JsonParseFailed(#[from] serde_json::Error),
    #[error("Unable to parse yaml parameter file")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("Unable to parse hcl parameter file")]
    HclParseFailed(#[from] hcl::Error),
}

/// Utility macro to create [ParameterValues]
///
/// ```
/// # use zulip_stack::parameter_values;
/// let values = parameter_values! {
///   "EnableIncomingEmail" => "true",
///   "EmailIngressCidr" => "203.0.113.0/24",
/// };
/// assert_eq!(values.get("EnableIncomingEmail"), Some("true"));
/// ```
#[macro_export]
macro_rules! parameter_values {
    { $($id:expr => $value:expr),* $(,)? } => {{
        #[allow(unused_mut)]
        let mut values = $crate::parameters::ParameterValues::default();
        $(
            values.insert($id, $value);
        )*
        values
    }};
}

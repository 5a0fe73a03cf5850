use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidPath,
    ConfigInvalidValue,
    ConfigInvalidJson,

    SetupUnknownMacro,
    SetupUnknownTask,
    SetupDuplicateTask,
    SetupDuplicateMacro,
    SetupTemplate,

    ValidationInvalidArgument,

    SshConnectFailed,
    SshIdentityFileNotFound,

    RemoteCommandFailed,
    LocalCommandFailed,

    RunInterrupted,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidPath => "config.invalid_path",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",

            ErrorCode::SetupUnknownMacro => "setup.unknown_macro",
            ErrorCode::SetupUnknownTask => "setup.unknown_task",
            ErrorCode::SetupDuplicateTask => "setup.duplicate_task",
            ErrorCode::SetupDuplicateMacro => "setup.duplicate_macro",
            ErrorCode::SetupTemplate => "setup.template",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::SshConnectFailed => "ssh.connect_failed",
            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",
            ErrorCode::LocalCommandFailed => "local.command_failed",

            ErrorCode::RunInterrupted => "run.interrupted",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeysDetails {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownTaskDetails {
    #[serde(rename = "macro")]
    pub macro_name: String,
    pub task: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDetails {
    pub task: String,
    pub placeholder: String,
    pub template: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConnectFailedDetails {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub host: String,
    pub identity_file: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionDetails {
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    // ------------------------------------------------------------------
    // ConfigError
    // ------------------------------------------------------------------

    /// Every absent required key, reported in one pass.
    pub fn config_missing_keys(keys: Vec<String>) -> Self {
        let message = format!("Missing required configuration: {}", keys.join(", "));
        let hint = keys
            .iter()
            .map(|k| format!("{}=", k))
            .collect::<Vec<_>>()
            .join(" ");
        Self::new(
            ErrorCode::ConfigMissingKey,
            message,
            to_details(ConfigMissingKeysDetails { keys }),
        )
        .with_hint(format!("Add the missing values to your .env or environment: {}", hint))
    }

    pub fn config_invalid_path(key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(
            ErrorCode::ConfigInvalidPath,
            format!("Careful - your deployment path '{}' does not begin with /", value),
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value: Some(value),
                problem: "path must be absolute".to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            to_details(ConfigInvalidJsonDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    // ------------------------------------------------------------------
    // SetupError
    // ------------------------------------------------------------------

    pub fn setup_unknown_macro(name: impl Into<String>, known: Vec<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::SetupUnknownMacro,
            format!("Unknown macro '{}'", name),
            to_details(NotFoundDetails { id: name, known }),
        )
        .with_hint("Run 'rollout tasks' to see available macros")
    }

    pub fn setup_unknown_task(macro_name: impl Into<String>, task: impl Into<String>) -> Self {
        let macro_name = macro_name.into();
        let task = task.into();
        Self::new(
            ErrorCode::SetupUnknownTask,
            format!("Macro '{}' references unknown task '{}'", macro_name, task),
            to_details(UnknownTaskDetails { macro_name, task }),
        )
    }

    pub fn setup_duplicate_task(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::SetupDuplicateTask,
            format!("Task '{}' is already registered", name),
            to_details(NotFoundDetails {
                id: name,
                known: Vec::new(),
            }),
        )
    }

    pub fn setup_duplicate_macro(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::SetupDuplicateMacro,
            format!("Macro '{}' is already defined", name),
            to_details(NotFoundDetails {
                id: name,
                known: Vec::new(),
            }),
        )
    }

    pub fn template_unresolved(
        task: impl Into<String>,
        placeholder: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let task = task.into();
        let placeholder = placeholder.into();
        Self::new(
            ErrorCode::SetupTemplate,
            format!(
                "Task '{}' uses unresolved placeholder '{{{{{}}}}}'",
                task, placeholder
            ),
            to_details(TemplateDetails {
                task,
                placeholder,
                template: template.into(),
            }),
        )
    }

    pub fn validation_invalid_argument(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
            }),
        )
    }

    // ------------------------------------------------------------------
    // ConnectionError
    // ------------------------------------------------------------------

    pub fn ssh_connect_failed(
        host: impl Into<String>,
        user: impl Into<String>,
        port: u16,
        error: impl Into<String>,
    ) -> Self {
        let host = host.into();
        Self::new(
            ErrorCode::SshConnectFailed,
            format!("Could not connect to {}", host),
            to_details(SshConnectFailedDetails {
                host,
                user: user.into(),
                port,
                error: error.into(),
            }),
        )
        .with_hint("Check that the host is reachable and your SSH key is loaded in the agent")
        .with_retryable(true)
    }

    pub fn ssh_identity_file_not_found(
        host: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            to_details(SshIdentityFileNotFoundDetails {
                host: host.into(),
                identity_file: identity_file.into(),
            }),
        )
    }

    // ------------------------------------------------------------------
    // TaskExecutionError
    // ------------------------------------------------------------------

    pub fn task_execution_failed(details: TaskExecutionDetails) -> Self {
        let (code, message) = match &details.host {
            Some(host) => (
                ErrorCode::RemoteCommandFailed,
                format!(
                    "Task '{}' failed on {} with exit code {}",
                    details.task, host, details.exit_code
                ),
            ),
            None => (
                ErrorCode::LocalCommandFailed,
                format!(
                    "Task '{}' failed locally with exit code {}",
                    details.task, details.exit_code
                ),
            ),
        };
        Self::new(code, message, to_details(details))
            .with_hint("Fix the issue and re-run; the failed release directory is left for inspection")
    }

    pub fn run_interrupted() -> Self {
        Self::new(
            ErrorCode::RunInterrupted,
            "Deployment interrupted by operator",
            Value::Object(serde_json::Map::new()),
        )
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_lists_every_key() {
        let err = Error::config_missing_keys(vec![
            "DEPLOY_HOST".to_string(),
            "DEPLOY_USER".to_string(),
        ]);
        assert_eq!(err.code, ErrorCode::ConfigMissingKey);
        assert_eq!(err.details["keys"], serde_json::json!(["DEPLOY_HOST", "DEPLOY_USER"]));
        assert!(err.message.contains("DEPLOY_HOST, DEPLOY_USER"));
    }

    #[test]
    fn task_failure_code_depends_on_host() {
        let remote = Error::task_execution_failed(TaskExecutionDetails {
            task: "migrateDatabase".to_string(),
            host: Some("deploy@h".to_string()),
            exit_code: 1,
            output: String::new(),
        });
        assert_eq!(remote.code, ErrorCode::RemoteCommandFailed);

        let local = Error::task_execution_failed(TaskExecutionDetails {
            task: "startDeployment".to_string(),
            host: None,
            exit_code: 128,
            output: String::new(),
        });
        assert_eq!(local.code, ErrorCode::LocalCommandFailed);
        assert_eq!(local.details["exitCode"], 128);
    }

    #[test]
    fn template_message_names_placeholder() {
        let err = Error::template_unresolved("runYarn", "nodeVersion", "nvm use {{nodeVersion}}");
        assert_eq!(err.message, "Task 'runYarn' uses unresolved placeholder '{{nodeVersion}}'");
        assert_eq!(err.code, ErrorCode::SetupTemplate);
    }
}

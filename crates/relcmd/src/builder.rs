//! Incremental construction of relational commands.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use relcmd_core::{DbConnection, Error, ParameterError, ParameterErrorKind, Result};

use crate::command::{RelationalCommand, RelationalCommandTemplate};
use crate::parameter::RelationalParameter;

const PARAMETER_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn parameter_name_regex() -> std::result::Result<&'static Regex, Error> {
    static REGEX: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(PARAMETER_NAME_PATTERN))
        .as_ref()
        .map_err(|e| Error::Custom(format!("invalid parameter name pattern: {e}")))
}

/// Accumulates command text and declared parameters.
///
/// ```ignore
/// let mut builder = RelationalCommandBuilder::new();
/// builder
///     .append("SELECT * FROM users WHERE id = @p0")
///     .add_parameter(RelationalParameter::type_mapped("p0", "@p0", Some(TypeMapping::int()), Some(false)));
/// let command: RelationalCommand<MyDriver> = builder.build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelationalCommandBuilder {
    text: String,
    parameters: Vec<RelationalParameter>,
}

impl RelationalCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        self.text.push_str(text);
        self
    }

    pub fn append_line(&mut self, text: &str) -> &mut Self {
        self.text.push_str(text);
        self.text.push('\n');
        self
    }

    pub fn add_parameter(&mut self, parameter: RelationalParameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn command_text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[RelationalParameter] {
        &self.parameters
    }

    /// Check every invariant name is a unique identifier.
    pub fn validate(&self) -> Result<()> {
        let regex = parameter_name_regex()?;
        let mut seen = HashSet::with_capacity(self.parameters.len());
        for parameter in &self.parameters {
            let name = parameter.invariant_name();
            if !regex.is_match(name) {
                return Err(Error::Parameter(ParameterError {
                    kind: ParameterErrorKind::InvalidName,
                    parameter: name.to_string(),
                    message: format!("'{name}' is not a valid parameter name."),
                }));
            }
            if !seen.insert(name) {
                return Err(Error::Parameter(ParameterError {
                    kind: ParameterErrorKind::Duplicate,
                    parameter: name.to_string(),
                    message: format!("The parameter '{name}' is declared more than once."),
                }));
            }
        }
        Ok(())
    }

    pub fn build<D: DbConnection>(&self) -> Result<RelationalCommand<D>> {
        self.validate()?;
        Ok(RelationalCommand::new(
            self.text.as_str(),
            self.parameters.clone(),
        ))
    }

    /// Empty the builder for reuse.
    pub fn clear(&mut self) {
        self.text.clear();
        self.parameters.clear();
    }
}

impl RelationalCommandTemplate for RelationalCommandBuilder {
    fn shared_text(&self) -> Arc<str> {
        Arc::from(self.text.as_str())
    }

    fn shared_parameters(&self) -> Arc<[RelationalParameter]> {
        Arc::from(self.parameters.as_slice())
    }
}

//! Parameter binding.
//!
//! A [`RelationalParameter`] describes one declared parameter of a command and
//! knows how to write its value into native [`DbParameter`]s. Values are
//! looked up by invariant name in a [`ParameterValues`] map at execution time.

use std::collections::HashMap;

use relcmd_core::{
    DbCommand, DbParameter, Error, ParameterDirection, ParameterError, ParameterErrorKind, Result,
    TypeMapping, Value,
};

/// Parameter values keyed by invariant name.
pub type ParameterValues = HashMap<String, Value>;

/// A parameter declared by a relational command.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationalParameter {
    /// One native parameter typed by an optional store type mapping. Without
    /// a mapping the `DbType` is inferred from the value.
    TypeMapped {
        invariant_name: String,
        name: String,
        type_mapping: Option<TypeMapping>,
        nullable: Option<bool>,
        direction: ParameterDirection,
    },
    /// A group of parameters bound positionally from a `Value::Array`.
    Composite {
        invariant_name: String,
        parameters: Vec<RelationalParameter>,
    },
    /// A prebuilt native parameter; binding clones it and sets the value.
    Raw {
        invariant_name: String,
        template: DbParameter,
    },
}

impl RelationalParameter {
    /// Input parameter whose invariant and native names are the same.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        RelationalParameter::TypeMapped {
            invariant_name: name.clone(),
            name,
            type_mapping: None,
            nullable: None,
            direction: ParameterDirection::Input,
        }
    }

    pub fn type_mapped(
        invariant_name: impl Into<String>,
        name: impl Into<String>,
        type_mapping: Option<TypeMapping>,
        nullable: Option<bool>,
    ) -> Self {
        RelationalParameter::TypeMapped {
            invariant_name: invariant_name.into(),
            name: name.into(),
            type_mapping,
            nullable,
            direction: ParameterDirection::Input,
        }
    }

    pub fn composite(invariant_name: impl Into<String>, parameters: Vec<RelationalParameter>) -> Self {
        RelationalParameter::Composite {
            invariant_name: invariant_name.into(),
            parameters,
        }
    }

    pub fn raw(invariant_name: impl Into<String>, template: DbParameter) -> Self {
        RelationalParameter::Raw {
            invariant_name: invariant_name.into(),
            template,
        }
    }

    /// Set the direction of a type-mapped parameter. Other variants are
    /// returned unchanged.
    pub fn with_direction(self, direction: ParameterDirection) -> Self {
        match self {
            RelationalParameter::TypeMapped {
                invariant_name,
                name,
                type_mapping,
                nullable,
                ..
            } => RelationalParameter::TypeMapped {
                invariant_name,
                name,
                type_mapping,
                nullable,
                direction,
            },
            other => other,
        }
    }

    /// The name used to look the value up.
    pub fn invariant_name(&self) -> &str {
        match self {
            RelationalParameter::TypeMapped { invariant_name, .. }
            | RelationalParameter::Composite { invariant_name, .. }
            | RelationalParameter::Raw { invariant_name, .. } => invariant_name,
        }
    }

    /// Look up this parameter's value and add native parameters to `command`.
    pub fn bind<C: DbCommand>(&self, command: &mut C, values: &ParameterValues) -> Result<()> {
        let value = values
            .get(self.invariant_name())
            .ok_or_else(|| Error::missing_parameter(self.invariant_name()))?;
        self.bind_value(command, value)
    }

    /// Add native parameters for an already resolved value.
    pub fn bind_value<C: DbCommand>(&self, command: &mut C, value: &Value) -> Result<()> {
        match self {
            RelationalParameter::TypeMapped {
                name,
                type_mapping,
                nullable,
                direction,
                ..
            } => {
                let db_type = type_mapping
                    .as_ref()
                    .and_then(|m| m.db_type)
                    .or_else(|| value.db_type());
                command.add_parameter(DbParameter {
                    name: name.clone(),
                    value: value.clone(),
                    db_type,
                    direction: *direction,
                    is_nullable: nullable.unwrap_or_else(|| value.is_null()),
                    size: type_mapping.as_ref().and_then(|m| m.size),
                });
                Ok(())
            }
            RelationalParameter::Composite {
                invariant_name,
                parameters,
            } => {
                let Some(items) = value.as_array() else {
                    return Err(mismatch(
                        invariant_name,
                        format!(
                            "Composite parameter '{invariant_name}' expects an array of {} values.",
                            parameters.len()
                        ),
                    ));
                };
                if items.len() != parameters.len() {
                    return Err(mismatch(
                        invariant_name,
                        format!(
                            "Composite parameter '{invariant_name}' expects {} values but {} were supplied.",
                            parameters.len(),
                            items.len()
                        ),
                    ));
                }
                for (parameter, item) in parameters.iter().zip(items) {
                    parameter.bind_value(command, item)?;
                }
                Ok(())
            }
            RelationalParameter::Raw { template, .. } => {
                let mut parameter = template.clone();
                parameter.value = value.clone();
                command.add_parameter(parameter);
                Ok(())
            }
        }
    }
}

fn mismatch(parameter: &str, message: String) -> Error {
    Error::Parameter(ParameterError {
        kind: ParameterErrorKind::Mismatch,
        parameter: parameter.to_string(),
        message,
    })
}

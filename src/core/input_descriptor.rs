use crate::utils::NonEmptyVec;

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// Input Descriptors are objects used to describe the information a relying party requires of a
/// holder.
///
/// All Input Descriptors MUST be satisfied, unless every field of their constraints is marked
/// optional.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default)]
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
}

impl InputDescriptor {
    /// Create a new instance of the input descriptor with the given id and constraints.
    pub fn new(id: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            id: id.into(),
            constraints,
            ..Default::default()
        }
    }

    /// Return the id of the input descriptor.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Return the constraints of the input descriptor.
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Set the name of the input descriptor.
    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    /// Return the name of the input descriptor.
    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the purpose of the input descriptor.
    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    /// Return the purpose of the input descriptor.
    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Whether a submission must include a credential for this descriptor.
    ///
    /// A descriptor is optional only when it declares fields and all of them are optional.
    pub fn is_required(&self) -> bool {
        self.constraints.fields.is_empty() || self.constraints.is_required()
    }

    /// Evaluate the input descriptor against a single credential.
    ///
    /// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-evaluation](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-evaluation)
    pub fn matches(&self, credential: &Json) -> Result<bool, ConstraintError> {
        for field in self.constraints.fields.iter() {
            if !field.matches(credential)? && field.is_required() {
                tracing::trace!(descriptor = self.id, "credential rejected by field constraint");
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Constraints are objects used to describe the constraints that a holder must satisfy to fulfill
/// an Input Descriptor.
///
/// A constraint object MAY be empty, or it may include a `fields` property.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
}

impl Constraints {
    /// Returns an empty Constraints object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new field constraint to the constraints list.
    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the fields of the constraints object.
    pub fn fields(&self) -> &Vec<ConstraintsField> {
        self.fields.as_ref()
    }

    /// Returns if the constraints fields contain non-optional
    /// fields that must be satisfied.
    pub fn is_required(&self) -> bool {
        self.fields.iter().any(|field| field.is_required())
    }
}

/// ConstraintsField objects describe a single claim an input descriptor asks for.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    path: NonEmptyVec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
}

impl ConstraintsField {
    /// Create a new instance of the constraints field with the given path.
    pub fn new(path: impl Into<String>) -> ConstraintsField {
        ConstraintsField {
            path: NonEmptyVec::new(path.into()),
            ..Default::default()
        }
    }

    /// Add a new path to the constraints field.
    pub fn add_path(mut self, path: impl Into<String>) -> Self {
        self.path.push(path.into());
        self
    }

    /// Return the paths of the constraints field.
    pub fn path(&self) -> &NonEmptyVec<String> {
        &self.path
    }

    /// Return the id of the constraints field.
    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    /// Return the purpose of the constraints field.
    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Return the name of the constraints field.
    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the filter of the constraints field.
    ///
    /// If present its value MUST be a JSON Schema descriptor used to filter against
    /// the values returned from evaluation of the JSONPath string expressions in the path array.
    pub fn set_filter(mut self, filter: Json) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Return the raw filter of the constraints field.
    pub fn filter(&self) -> Option<&Json> {
        self.filter.as_ref()
    }

    /// Set the optional value of the constraints field.
    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    /// Return the optional value of the constraints field.
    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Inverse alias for `!is_optional()`.
    pub fn is_required(&self) -> bool {
        !self.is_optional()
    }

    /// Whether any of the field's paths resolves to a value accepted by its filter.
    ///
    /// Paths are tried in order; a path with no match is skipped, and the first path that
    /// does match decides the outcome.
    pub fn matches(&self, credential: &Json) -> Result<bool, ConstraintError> {
        let validator = self
            .filter
            .as_ref()
            .map(|filter| {
                JSONSchema::compile(filter)
                    .map_err(|e| ConstraintError::InvalidFilter(e.to_string()))
            })
            .transpose()?;

        for path in self.path.iter() {
            let json_path =
                JsonPath::parse(path).map_err(|e| ConstraintError::InvalidPath {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

            let nodes = json_path.query(credential).all();
            if nodes.is_empty() {
                continue;
            }

            return Ok(match validator.as_ref() {
                Some(validator) => nodes.into_iter().any(|node| validator.is_valid(node)),
                None => true,
            });
        }

        Ok(false)
    }
}

/// A constraint that cannot be evaluated.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("invalid JSONPath `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid filter schema: {0}")]
    InvalidFilter(String),
}
